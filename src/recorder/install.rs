// src/recorder/install.rs

//! Install Recorder: classifies a source/destination pair, captures the
//! sidecar it needs (if any), and appends the journal record. Invoking the
//! `install` utility to actually place the file is left to the caller so it
//! can run once per source file across a whole `install SRC... DEST` batch.

use crate::error::{Error, Result};
use crate::external;
use crate::journal::{Action, Journal};
use crate::sidecar;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What `record` decided to do about a single source/destination pair.
pub enum Outcome {
    /// `src` and `dst` are byte-identical; nothing was recorded and the
    /// caller must not invoke `install` either.
    Identical,
    /// A record was appended at `serial`, starting at `offset`; the caller
    /// should now invoke `install` and, on failure, call
    /// `journal.truncate_to(offset, serial)` to undo this entry.
    Recorded { offset: u64, serial: u64 },
}

/// Resolves the effective destination: if `dst` is an existing directory,
/// the source's basename is appended.
pub fn resolve_destination(src: &Path, dst: &Path) -> Result<PathBuf> {
    let resolved = if dst.is_dir() {
        let name = src.file_name().ok_or_else(|| {
            Error::Usage(format!("source path '{}' has no file name", src.display()))
        })?;
        dst.join(name)
    } else {
        dst.to_path_buf()
    };
    if resolved.as_os_str().len() < 2 {
        return Err(Error::Usage(
            "the destination filename should be at least two characters long".to_string(),
        ));
    }
    Ok(resolved)
}

/// Classifies `src` vs. the resolved destination and appends the
/// appropriate record (or none, if the files are identical).
pub fn record(journal: &mut Journal, db_dir: &Path, module: &str, src: &Path, dst: &Path) -> Result<(PathBuf, Outcome)> {
    let dst = resolve_destination(src, dst)?;

    let src_meta = fs::metadata(src).map_err(|e| Error::io(format!("examining source '{}'", src.display()), e))?;
    if !src_meta.is_file() {
        return Err(Error::Usage(format!("not a regular source file: '{}'", src.display())));
    }

    if !dst.exists() {
        let (offset, serial) = append_create(journal, module, &dst)?;
        info!(dst = %dst.display(), "recorded create");
        return Ok((dst, Outcome::Recorded { offset, serial }));
    }

    if external::files_identical(src, &dst)? {
        debug!(dst = %dst.display(), "source and destination are identical, skipping");
        return Ok((dst, Outcome::Identical));
    }

    if !external::is_text_file(&dst)? {
        let (offset, serial) = append_create(journal, module, &dst)?;
        info!(dst = %dst.display(), "recorded create (binary overwrite)");
        return Ok((dst, Outcome::Recorded { offset, serial }));
    }

    let serial = journal.read_last()?;
    let sidecar_path = sidecar::path_for(db_dir, serial);
    let sidecar_file = sidecar::create(&sidecar_path)?;
    external::diff_into(&dst, src, &sidecar_file)?;
    let offset = journal.append(module, Action::Patch, &dst.to_string_lossy())?;
    info!(dst = %dst.display(), %serial, "recorded patch");
    Ok((dst, Outcome::Recorded { offset, serial }))
}

fn append_create(journal: &mut Journal, module: &str, dst: &Path) -> Result<(u64, u64)> {
    let serial = journal.read_last()?;
    let offset = journal.append(module, Action::Create, &dst.to_string_lossy())?;
    Ok((offset, serial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_destination_appends_basename_for_directories() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("thing.txt");
        fs::write(&src, "hi").unwrap();
        let resolved = resolve_destination(&src, dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("thing.txt"));
    }

    #[test]
    fn resolve_destination_rejects_too_short_paths() {
        let err = resolve_destination(Path::new("/a"), Path::new("/")).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
