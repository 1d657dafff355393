// src/rollback.rs

//! Rollback Engine: undoes every active record belonging to a module, most
//! recent first, and marks each as undone in place.

use crate::error::{Error, Result};
use crate::external;
use crate::journal::{Action, Entry, Journal, Record};
use crate::sidecar;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Undoes every active record for `module`, in reverse order, and rewrites
/// each one's action to its `un*` form as it goes.
pub fn rollback(journal: &mut Journal, db_dir: &Path, module: &str) -> Result<()> {
    let entries = scan(journal, module)?;
    for record in entries.into_iter().rev() {
        match undo(db_dir, &record) {
            Ok(()) => {}
            Err(Error::Recoverable(reason)) => {
                warn!(filename = %record.filename, %reason, "skipping rollback entry");
            }
            Err(e) => return Err(e),
        }
        journal.rewrite_action(record.offset, record.module.len(), record.action.undone())?;
    }
    Ok(())
}

fn scan(journal: &mut Journal, module: &str) -> Result<Vec<Record>> {
    journal.rewind()?;
    let mut out = Vec::new();
    loop {
        match journal.read_next()? {
            Entry::Sentinel(_) => break,
            Entry::Record(record) => {
                if record.module == module && record.action.is_active() {
                    out.push(record);
                }
            }
        }
    }
    Ok(out)
}

fn undo(db_dir: &Path, record: &Record) -> Result<()> {
    match record.action {
        Action::Create => undo_create(record),
        Action::Patch => undo_patch(db_dir, record),
        Action::Remove => undo_remove(db_dir, record),
        _ => unreachable!("scan only keeps active records"),
    }
}

fn undo_create(record: &Record) -> Result<()> {
    match fs::remove_file(&record.filename) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(filename = %record.filename, "file already gone, nothing to undo");
            Ok(())
        }
        Err(e) => Err(Error::io(format!("removing '{}'", record.filename), e)),
    }
}

fn undo_patch(db_dir: &Path, record: &Record) -> Result<()> {
    let sidecar_path = sidecar::path_for(db_dir, record.serial);
    if !sidecar_path.is_file() {
        return Err(Error::Recoverable(format!(
            "missing sidecar for patch record at '{}'",
            sidecar_path.display()
        )));
    }

    let filename = Path::new(&record.filename);
    let status = sidecar::status_of(filename)?;

    let tmp_path = sibling_temp(filename)?;
    external::patch_reverse(&sidecar_path, &tmp_path, filename)?;
    restore_status(&tmp_path, status)?;
    fs::rename(&tmp_path, filename).map_err(|e| Error::io(format!("restoring '{}'", filename.display()), e))?;
    sidecar::unlink(&sidecar_path)?;
    Ok(())
}

fn undo_remove(db_dir: &Path, record: &Record) -> Result<()> {
    let sidecar_path = sidecar::path_for(db_dir, record.serial);
    if !sidecar_path.is_file() {
        return Err(Error::Recoverable(format!(
            "missing sidecar for remove record at '{}'",
            sidecar_path.display()
        )));
    }

    let filename = Path::new(&record.filename);
    if filename.exists() {
        return Err(Error::Recoverable(format!(
            "'{}' already exists, refusing to overwrite",
            filename.display()
        )));
    }

    let sidecar_file = File::open(&sidecar_path)
        .map_err(|e| Error::io(format!("opening sidecar '{}'", sidecar_path.display()), e))?;
    let (status, mut reader) = sidecar::read_backup_header(sidecar_file, filename)?;

    let tmp_path = sibling_temp(filename)?;
    {
        let mut tmp = File::create(&tmp_path).map_err(|e| Error::io(format!("creating '{}'", tmp_path.display()), e))?;
        std::io::copy(&mut reader, &mut tmp)
            .map_err(|e| Error::io(format!("restoring content for '{}'", filename.display()), e))?;
    }

    external::run_install(&[
        std::ffi::OsStr::new("-o"),
        std::ffi::OsStr::new(&status.uid.to_string()),
        std::ffi::OsStr::new("-g"),
        std::ffi::OsStr::new(&status.gid.to_string()),
        std::ffi::OsStr::new("-m"),
        std::ffi::OsStr::new(&format!("{:o}", status.mode)),
        std::ffi::OsStr::new("--"),
        tmp_path.as_os_str(),
        filename.as_os_str(),
    ])?;

    let _ = fs::remove_file(&tmp_path);
    sidecar::unlink(&sidecar_path)?;
    Ok(())
}

fn sibling_temp(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path.file_name().ok_or_else(|| Error::Usage(format!("'{}' has no file name", path.display())))?;
    let mut candidate;
    let mut n = 0u32;
    loop {
        candidate = parent.join(format!(".{}.rollback.{n}", name.to_string_lossy()));
        if !candidate.exists() {
            break;
        }
        n += 1;
    }
    Ok(candidate)
}

#[cfg(unix)]
fn restore_status(path: &Path, status: sidecar::FileStatus) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(status.mode);
    fs::set_permissions(path, perms).map_err(|e| Error::io(format!("restoring mode on '{}'", path.display()), e))?;
    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| Error::Usage(format!("'{}' contains an interior NUL byte", path.display())))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), status.uid, status.gid) };
    if rc != 0 {
        return Err(Error::io(
            format!("restoring ownership on '{}'", path.display()),
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn restore_status(_path: &Path, _status: sidecar::FileStatus) -> Result<()> {
    Ok(())
}
