// src/external.rs

//! Thin wrappers around the external utilities this tool delegates to:
//! `cmp`, `file`, `diff`, `patch` and `install`. None of the classification,
//! diffing, patching or copying logic lives here, only subprocess plumbing.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

fn status_of(command: &mut Command) -> Result<std::process::ExitStatus> {
    let program = command.get_program().to_string_lossy().into_owned();
    command
        .status()
        .map_err(|e| Error::ChildFailed { command: program, reason: e.to_string() })
}

/// `cmp -s -- src dst`: exit 0 means identical, 1 means they differ, anything
/// else is a failure of the comparison itself.
pub fn files_identical(src: &Path, dst: &Path) -> Result<bool> {
    let status = status_of(
        Command::new("cmp")
            .arg("-s")
            .arg("--")
            .arg(src)
            .arg(dst),
    )?;
    match status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(Error::ChildFailed {
            command: "cmp".to_string(),
            reason: format!("exited with unexpected status {status}"),
        }),
    }
}

/// Runs `file -- path` and reports whether the description contains the
/// whitespace-bordered token `text`.
pub fn is_text_file(path: &Path) -> Result<bool> {
    let output = Command::new("file")
        .arg("--")
        .arg(path)
        .output()
        .map_err(|e| Error::ChildFailed { command: "file".to_string(), reason: e.to_string() })?;
    if !output.status.success() {
        return Err(Error::ChildFailed {
            command: "file".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    let line = String::from_utf8_lossy(&output.stdout);
    let line = line.lines().next().unwrap_or_default();
    let prefix = format!("{}: ", path.display());
    let description = line.strip_prefix(&prefix).ok_or_else(|| Error::ChildFailed {
        command: "file".to_string(),
        reason: format!("could not parse output line: {line}"),
    })?;
    Ok(description
        .split_whitespace()
        .any(|token| token == "text"))
}

/// `diff -u -- dst src`, with stdout captured into `sidecar`. Exit status 0
/// (identical, unreachable here since callers already ruled that out) or 1
/// (files differ) are both success; anything else is a failure.
pub fn diff_into(dst: &Path, src: &Path, sidecar: &File) -> Result<()> {
    let stdout = sidecar
        .try_clone()
        .map_err(|e| Error::io(format!("duplicating handle for '{}'", dst.display()), e))?;
    debug!(dst = %dst.display(), src = %src.display(), "running diff -u");
    let status = status_of(
        Command::new("diff")
            .arg("-u")
            .arg("--")
            .arg(dst)
            .arg(src)
            .stdout(Stdio::from(stdout)),
    )?;
    match status.code() {
        Some(0) | Some(1) => Ok(()),
        _ => Err(Error::ChildFailed {
            command: "diff".to_string(),
            reason: format!("exited with unexpected status {status}"),
        }),
    }
}

/// Runs `install` with the given argv tail (everything after the program
/// name), once per source file.
pub fn run_install(args: &[&std::ffi::OsStr]) -> Result<()> {
    debug!(?args, "running install");
    let status = status_of(Command::new("install").args(args))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::ChildFailed {
            command: "install".to_string(),
            reason: format!("exited with status {status}"),
        })
    }
}

/// Reverses a unified diff: `patch -R -f -s -r - -o out -- filename`,
/// reading `sidecar` on stdin.
pub fn patch_reverse(sidecar: &Path, out: &Path, filename: &Path) -> Result<()> {
    let stdin = File::open(sidecar)
        .map_err(|e| Error::io(format!("opening sidecar '{}'", sidecar.display()), e))?;
    let status = status_of(
        Command::new("patch")
            .args(["-R", "-f", "-s", "-r", "-", "-o"])
            .arg(out)
            .arg("--")
            .arg(filename)
            .stdin(Stdio::from(stdin)),
    )?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::ChildFailed {
            command: "patch".to_string(),
            reason: format!("exited with status {status}"),
        })
    }
}
