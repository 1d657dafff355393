// src/main.rs

use clap::Parser;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use txn_install::cli::{self, Cli, Command};
use txn_install::error::{Error, Result};
use txn_install::journal::Journal;
use txn_install::{external, modules, recorder, rollback, sidecar, Context};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let mut argv: Vec<String> = std::env::args().collect();
    if let Some(sub) = argv.first().and_then(|a0| cli::subcommand_from_argv0(a0)) {
        argv.insert(1, sub.to_string());
    }
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return Ok(());
        }
        Err(e) => return Err(Error::Usage(e.to_string())),
    };

    if cli.features {
        for feature in cli::FEATURES {
            println!("{feature}");
        }
        return Ok(());
    }

    let ctx = Context::from_env();

    match cli.command {
        None => Err(Error::Usage("no subcommand given; see --help".to_string())),
        Some(Command::DbInit) => {
            Journal::open_or_create(&ctx.db_dir, false)?;
            info!(db = %ctx.db_dir.display(), "initialized database");
            Ok(())
        }
        Some(Command::Install { copy, group, mode, owner, sources, dest }) => {
            do_install(&ctx, &sources, &dest, InstallFlags { copy, group, mode, owner })
        }
        Some(Command::InstallExact { sources, dest }) => do_install_exact(&ctx, &sources, &dest),
        Some(Command::Remove { file }) => {
            let mut journal = Journal::open_or_create(&ctx.db_dir, true)?;
            recorder::remove::record(&mut journal, &ctx.db_dir, &ctx.module, &file)
        }
        Some(Command::Rollback { module }) => {
            let mut journal = Journal::open_or_create(&ctx.db_dir, true)?;
            rollback::rollback(&mut journal, &ctx.db_dir, &module)
        }
        Some(Command::ListModules) => {
            let mut journal = Journal::open(&ctx.db_dir)?;
            for name in modules::list(&mut journal)? {
                println!("{name}");
            }
            Ok(())
        }
        Some(Command::Completions { shell }) => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "txn", &mut std::io::stdout());
            Ok(())
        }
    }
}

struct InstallFlags {
    copy: bool,
    group: Option<String>,
    mode: Option<String>,
    owner: Option<String>,
}

fn do_install(ctx: &Context, sources: &[PathBuf], dest: &PathBuf, flags: InstallFlags) -> Result<()> {
    let mut journal = Journal::open_or_create(&ctx.db_dir, true)?;
    for src in sources {
        let (resolved_dest, outcome) = recorder::install::record(&mut journal, &ctx.db_dir, &ctx.module, src, dest)?;
        let (offset, serial) = match outcome {
            recorder::install::Outcome::Identical => continue,
            recorder::install::Outcome::Recorded { offset, serial } => (offset, serial),
        };

        let mut argv: Vec<OsString> = Vec::new();
        if flags.copy {
            argv.push("-c".into());
        }
        if let Some(group) = &flags.group {
            argv.push("-g".into());
            argv.push(group.into());
        }
        if let Some(mode) = &flags.mode {
            argv.push("-m".into());
            argv.push(mode.into());
        }
        if let Some(owner) = &flags.owner {
            argv.push("-o".into());
            argv.push(owner.into());
        }
        argv.push("--".into());
        argv.push(src.clone().into());
        argv.push(resolved_dest.clone().into());

        if let Err(e) = run_install(&argv) {
            journal.truncate_to(offset, serial)?;
            return Err(e);
        }
    }
    Ok(())
}

fn do_install_exact(ctx: &Context, sources: &[PathBuf], dest: &PathBuf) -> Result<()> {
    let mut journal = Journal::open_or_create(&ctx.db_dir, true)?;
    for src in sources {
        let status = sidecar::status_of(src)?;
        let (resolved_dest, outcome) = recorder::install::record(&mut journal, &ctx.db_dir, &ctx.module, src, dest)?;
        let (offset, serial) = match outcome {
            recorder::install::Outcome::Identical => continue,
            recorder::install::Outcome::Recorded { offset, serial } => (offset, serial),
        };

        let argv: Vec<OsString> = vec![
            "-o".into(),
            status.uid.to_string().into(),
            "-g".into(),
            status.gid.to_string().into(),
            "-m".into(),
            format!("{:o}", status.mode).into(),
            "--".into(),
            src.clone().into(),
            resolved_dest.clone().into(),
        ];

        if let Err(e) = run_install(&argv) {
            journal.truncate_to(offset, serial)?;
            return Err(e);
        }
    }
    Ok(())
}

fn run_install(argv: &[OsString]) -> Result<()> {
    let refs: Vec<&OsStr> = argv.iter().map(|s| s.as_os_str()).collect();
    external::run_install(&refs)
}
