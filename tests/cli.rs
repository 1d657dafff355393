// tests/cli.rs

//! End-to-end exercise of the compiled binary: db-init, install, rollback.

use std::process::Command;

fn txn() -> Command {
    Command::new(env!("CARGO_BIN_EXE_txn"))
}

fn run(cmd: &mut Command) {
    let status = cmd.status().expect("failed to spawn txn");
    assert!(status.success(), "txn exited with {status}");
}

#[test]
fn install_then_rollback_round_trips_the_destination() {
    let db = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();

    let src = work.path().join("new.txt");
    std::fs::write(&src, "hello from the release\n").unwrap();
    let dst = work.path().join("dst.txt");
    std::fs::write(&dst, "the previous release\n").unwrap();

    run(txn().env("TXN_INSTALL_DB", db.path()).arg("db-init"));

    run(txn()
        .env("TXN_INSTALL_DB", db.path())
        .env("TXN_INSTALL_MODULE", "demo")
        .arg("install")
        .arg(&src)
        .arg(&dst));

    assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello from the release\n");

    let journal_bytes = std::fs::read(db.path().join("txn.index")).unwrap();
    assert!(String::from_utf8_lossy(&journal_bytes).contains("patch"));

    run(txn()
        .env("TXN_INSTALL_DB", db.path())
        .arg("rollback")
        .arg("demo"));

    assert_eq!(std::fs::read_to_string(&dst).unwrap(), "the previous release\n");

    let journal_bytes = std::fs::read(db.path().join("txn.index")).unwrap();
    assert!(String::from_utf8_lossy(&journal_bytes).contains("unpatch"));
}

#[test]
fn db_init_produces_empty_sentinel_journal() {
    let db = tempfile::tempdir().unwrap();
    run(txn().env("TXN_INSTALL_DB", db.path()).arg("db-init"));
    let bytes = std::fs::read(db.path().join("txn.index")).unwrap();
    assert_eq!(bytes, b"000000\n");
}

#[test]
fn list_modules_reports_first_seen_order() {
    let db = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    run(txn().env("TXN_INSTALL_DB", db.path()).arg("db-init"));

    for (module, name) in [("beta", "one.txt"), ("alpha", "two.txt")] {
        let src = work.path().join(format!("src-{name}"));
        std::fs::write(&src, "content\n").unwrap();
        let dst = work.path().join(name);
        run(txn()
            .env("TXN_INSTALL_DB", db.path())
            .env("TXN_INSTALL_MODULE", module)
            .arg("install")
            .arg(&src)
            .arg(&dst));
    }

    let output = txn()
        .env("TXN_INSTALL_DB", db.path())
        .arg("list-modules")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["beta", "alpha"]);
}
