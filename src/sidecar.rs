// src/sidecar.rs

//! Per-record sidecar files: `txn.NNNNNN` under the database directory,
//! holding a unified diff (`patch` records) or a status header plus raw
//! content (`remove` records).

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Owner/group/mode captured for a `remove` sidecar, and restored on
/// rollback via the `install` utility.
#[derive(Debug, Clone, Copy)]
pub struct FileStatus {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// Creates `txn.<serial>` exclusively and locks it, for the Install or
/// Remove Recorder to populate.
pub fn create(path: &Path) -> Result<File> {
    let file = open_exclusive(path)?;
    file.try_lock_exclusive()
        .map_err(|_| Error::Locked(path.to_path_buf()))?;
    Ok(file)
}

#[cfg(unix)]
fn open_exclusive(path: &Path) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::io(format!("creating sidecar '{}'", path.display()), e))
}

#[cfg(not(unix))]
fn open_exclusive(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| Error::io(format!("creating sidecar '{}'", path.display()), e))
}

/// Removes a sidecar that has been fully consumed (patch applied, or
/// backup restored).
pub fn unlink(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(format!("removing sidecar '{}'", path.display()), e)),
    }
}

/// Writes the `remove` sidecar header followed by the victim's content.
pub fn write_backup(file: &mut File, status: FileStatus, mut source: impl Read, path_for_errors: &Path) -> Result<()> {
    write_header(file, status, path_for_errors)?;
    std::io::copy(&mut source, file)
        .map_err(|e| Error::io(format!("backing up '{}'", path_for_errors.display()), e))?;
    Ok(())
}

fn write_header(file: &mut File, status: FileStatus, path_for_errors: &Path) -> Result<()> {
    writeln!(file, "{} {} {:o}", status.uid, status.gid, status.mode)
        .map_err(|e| Error::io(format!("writing backup header for '{}'", path_for_errors.display()), e))
}

/// Reads the `remove` sidecar header, leaving the reader positioned at the
/// start of the backed-up content.
pub fn read_backup_header(file: File, path_for_errors: &Path) -> Result<(FileStatus, impl BufRead)> {
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| Error::io(format!("reading backup header for '{}'", path_for_errors.display()), e))?;
    let mut parts = line.trim_end().split_whitespace();
    let parse_error = || Error::Corrupt {
        path: path_for_errors.to_path_buf(),
        reason: "malformed sidecar header".to_string(),
    };
    let uid: u32 = parts.next().ok_or_else(parse_error)?.parse().map_err(|_| parse_error())?;
    let gid: u32 = parts.next().ok_or_else(parse_error)?.parse().map_err(|_| parse_error())?;
    let mode = u32::from_str_radix(parts.next().ok_or_else(parse_error)?, 8).map_err(|_| parse_error())?;
    Ok((FileStatus { uid, gid, mode }, reader))
}

/// Path to the sidecar for a given serial under `db_dir`.
pub fn path_for(db_dir: &Path, serial: u64) -> PathBuf {
    crate::paths::sidecar_path(db_dir, serial)
}

#[cfg(unix)]
pub fn status_of(path: &Path) -> Result<FileStatus> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::symlink_metadata(path)
        .map_err(|e| Error::io(format!("examining '{}'", path.display()), e))?;
    Ok(FileStatus {
        uid: meta.uid(),
        gid: meta.gid(),
        mode: meta.mode() & 0o7777,
    })
}

#[cfg(not(unix))]
pub fn status_of(_path: &Path) -> Result<FileStatus> {
    Ok(FileStatus { uid: 0, gid: 0, mode: 0o644 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backup_round_trips_status_and_content() {
        let dir = TempDir::new().unwrap();
        let sidecar_path = dir.path().join("txn.000000");
        let mut sidecar = create(&sidecar_path).unwrap();
        let status = FileStatus { uid: 1000, gid: 100, mode: 0o644 };
        write_backup(&mut sidecar, status, "hi\n".as_bytes(), Path::new("/etc/victim")).unwrap();
        drop(sidecar);

        let file = File::open(&sidecar_path).unwrap();
        let (read_status, mut reader) = read_backup_header(file, Path::new("/etc/victim")).unwrap();
        assert_eq!(read_status.uid, 1000);
        assert_eq!(read_status.gid, 100);
        assert_eq!(read_status.mode, 0o644);
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hi\n");
    }

    #[test]
    fn create_fails_if_sidecar_already_exists() {
        let dir = TempDir::new().unwrap();
        let sidecar_path = dir.path().join("txn.000000");
        let _first = create(&sidecar_path).unwrap();
        let err = create(&sidecar_path).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
