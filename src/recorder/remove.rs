// src/recorder/remove.rs

//! Remove Recorder: backs a victim file up into a sidecar, unlinks it, and
//! appends the journal record.

use crate::error::{Error, Result};
use crate::journal::{Action, Journal};
use crate::sidecar;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

/// Backs `path` up, removes it, and records a `remove` journal entry.
pub fn record(journal: &mut Journal, db_dir: &Path, module: &str, path: &Path) -> Result<()> {
    if path.as_os_str().len() < 2 {
        return Err(Error::Usage(
            "the file to remove should have a path at least two characters long".to_string(),
        ));
    }
    let meta = fs::symlink_metadata(path).map_err(|e| Error::io(format!("examining '{}'", path.display()), e))?;
    if !meta.is_file() {
        return Err(Error::Usage(format!("not a regular file: '{}'", path.display())));
    }

    let serial = journal.read_last()?;
    let sidecar_path = sidecar::path_for(db_dir, serial);
    let mut sidecar_file = sidecar::create(&sidecar_path)?;

    if let Err(e) = back_up(&mut sidecar_file, path) {
        let _ = sidecar::unlink(&sidecar_path);
        return Err(e);
    }
    drop(sidecar_file);

    if let Err(e) = fs::remove_file(path).map_err(|e| Error::io(format!("removing '{}'", path.display()), e)) {
        let _ = sidecar::unlink(&sidecar_path);
        return Err(e);
    }

    if let Err(e) = journal.append(module, Action::Remove, &path.to_string_lossy()) {
        let _ = sidecar::unlink(&sidecar_path);
        return Err(e);
    }

    info!(path = %path.display(), %serial, "recorded remove");
    Ok(())
}

fn back_up(sidecar_file: &mut File, path: &Path) -> Result<()> {
    let status = sidecar::status_of(path)?;
    let source = File::open(path).map_err(|e| Error::io(format!("opening '{}'", path.display()), e))?;
    sidecar::write_backup(sidecar_file, status, source, path)
}
