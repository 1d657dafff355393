// src/journal.rs

//! Append-only transaction journal: the on-disk index format, its trailing
//! sentinel invariant, and the record codec.
//!
//! Wire format: a sequence of record lines followed by a sentinel line.
//!
//! ```text
//! NNNNNN SP module SP action(8) SP filename LF
//! NNNNNN LF
//! ```
//!
//! `NNNNNN` is a zero-padded six-digit serial; the action field is always
//! written left-padded with spaces to a fixed width of eight bytes (the
//! width of the longest `un*` name) so that rollback can rewrite it in place
//! without shifting the rest of the line.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const SERIAL_WIDTH: usize = 6;
pub const ACTION_WIDTH: usize = 8;
pub const SENTINEL_LEN: u64 = (SERIAL_WIDTH + 1) as u64;
pub const EMPTY_JOURNAL: &[u8] = b"000000\n";

/// One of the six canonical journal actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Patch,
    Remove,
    Uncreate,
    Unpatch,
    Unremove,
}

impl Action {
    pub fn canonical(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Patch => "patch",
            Action::Remove => "remove",
            Action::Uncreate => "uncreate",
            Action::Unpatch => "unpatch",
            Action::Unremove => "unremove",
        }
    }

    /// The `un*` counterpart recorded by the Rollback Engine.
    pub fn undone(self) -> Action {
        match self {
            Action::Create => Action::Uncreate,
            Action::Patch => Action::Unpatch,
            Action::Remove => Action::Unremove,
            already => already,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Action::Create | Action::Patch | Action::Remove)
    }

    fn parse(name: &str) -> Option<Action> {
        match name {
            "create" => Some(Action::Create),
            "patch" => Some(Action::Patch),
            "remove" => Some(Action::Remove),
            "uncreate" => Some(Action::Uncreate),
            "unpatch" => Some(Action::Unpatch),
            "unremove" => Some(Action::Unremove),
            _ => None,
        }
    }
}

/// A single decoded journal record, plus the byte offset at which its line
/// begins (needed by the Rollback Engine to rewrite the action in place).
#[derive(Debug, Clone)]
pub struct Record {
    pub serial: u64,
    pub offset: u64,
    pub module: String,
    pub action: Action,
    pub filename: String,
}

/// The result of reading one entry from the current cursor position.
#[derive(Debug)]
pub enum Entry {
    Record(Record),
    /// The trailing sentinel, holding the next serial to be assigned.
    Sentinel(u64),
}

/// An open, exclusively-locked journal file.
pub struct Journal {
    path: PathBuf,
    file: File,
    /// Serial a freshly-rewound scan expects its next parsed record to
    /// carry; bumped after each record, reset to 0 by `rewind`. Targeted
    /// reads that land directly on the sentinel (`read_last`, the append
    /// peek) never touch this, since it is only consulted in the record
    /// branch of `read_next`.
    expected: u64,
}

impl Journal {
    /// Open an existing journal. Used by `list-modules`, which never creates
    /// the database on the reader's behalf.
    pub fn open(db_dir: &Path) -> Result<Self> {
        let path = crate::paths::journal_path(db_dir);
        if !path.is_file() {
            return Err(Error::Missing(path));
        }
        Self::open_locked(path)
    }

    /// Open the journal, creating the database directory and an empty
    /// journal if `may_exist` allows it (or if nothing exists yet).
    pub fn open_or_create(db_dir: &Path, may_exist: bool) -> Result<Self> {
        if !db_dir.is_dir() {
            create_dir(db_dir)?;
        }
        let path = crate::paths::journal_path(db_dir);
        if path.is_file() {
            if !may_exist {
                return Err(Error::AlreadyExists { path });
            }
            return Self::open_locked(path);
        }

        let mut file = create_exclusive(&path)?;
        file.write_all(EMPTY_JOURNAL)
            .map_err(|e| Error::io(format!("writing initial journal '{}'", path.display()), e))?;
        file.flush()
            .map_err(|e| Error::io(format!("flushing initial journal '{}'", path.display()), e))?;
        lock(&file, &path)?;
        Ok(Self { path, file, expected: 0 })
    }

    fn open_locked(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(format!("opening journal '{}'", path.display()), e))?;
        lock(&file, &path)?;
        Ok(Self { path, file, expected: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stream_position(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|e| Error::io(format!("seeking in '{}'", self.path.display()), e))
    }

    /// Seek to the start of the journal and reset the monotonicity
    /// expectation for a fresh sequential scan.
    pub fn rewind(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io(format!("rewinding '{}'", self.path.display()), e))?;
        self.expected = 0;
        Ok(())
    }

    /// Read one entry (record or sentinel) at the current cursor position,
    /// advancing the cursor past it.
    pub fn read_next(&mut self) -> Result<Entry> {
        let offset = self.stream_position()?;
        let serial = self.read_serial()?;

        match self.read_byte()? {
            None => Err(self.corrupt("incomplete line index at EOF")),
            Some(b'\n') => Ok(Entry::Sentinel(serial)),
            Some(b' ') => {
                if serial != self.expected {
                    return Err(self.corrupt(format!(
                        "out-of-order serial: expected {expected:0w$} but found {serial:0w$}",
                        expected = self.expected,
                        w = SERIAL_WIDTH,
                    )));
                }
                self.expected += 1;

                let module = self.read_token(b' ', "module name")?;
                validate_token(&module).map_err(|reason| self.corrupt(reason))?;

                let action_field = self.read_fixed(ACTION_WIDTH)?;
                let action_name = action_field.trim_end();
                let action = Action::parse(action_name)
                    .ok_or_else(|| self.corrupt(format!("invalid action name '{action_name}'")))?;
                match self.read_byte()? {
                    Some(b' ') => {}
                    _ => return Err(self.corrupt("expected a space after the action field")),
                }

                let filename = self.read_line()?;
                Ok(Entry::Record(Record {
                    serial,
                    offset,
                    module,
                    action,
                    filename,
                }))
            }
            Some(_) => Err(self.corrupt("expected a space before the module name")),
        }
    }

    /// Seek to the trailing sentinel and return the next serial to assign,
    /// leaving the cursor positioned at the start of the sentinel so a
    /// subsequent `append` overwrites it.
    pub fn read_last(&mut self) -> Result<u64> {
        let end = self
            .file
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io(format!("seeking in '{}'", self.path.display()), e))?;
        if end < SENTINEL_LEN {
            return Err(self.corrupt("journal is shorter than a bare sentinel"));
        }
        let sentinel_at = end - SENTINEL_LEN;
        self.file
            .seek(SeekFrom::Start(sentinel_at))
            .map_err(|e| Error::io(format!("seeking in '{}'", self.path.display()), e))?;
        match self.read_next()? {
            Entry::Sentinel(idx) => {
                self.file
                    .seek(SeekFrom::Start(sentinel_at))
                    .map_err(|e| Error::io(format!("seeking in '{}'", self.path.display()), e))?;
                Ok(idx)
            }
            Entry::Record(_) => Err(self.corrupt("the last line should be the sentinel")),
        }
    }

    /// Append a record at the current cursor position (which must be the
    /// start of the existing sentinel), followed by the new sentinel.
    /// Returns the offset at which the record line begins.
    pub fn append(&mut self, module: &str, action: Action, filename: &str) -> Result<u64> {
        let serial = self.read_next_serial_at_cursor()?;
        let offset = self.stream_position()?;
        write!(
            self.file,
            "{serial:0w$} {module} {action:<aw$} {filename}\n{next:0w$}\n",
            w = SERIAL_WIDTH,
            aw = ACTION_WIDTH,
            action = action.canonical(),
            next = serial + 1,
        )
        .map_err(|e| Error::io(format!("writing to '{}'", self.path.display()), e))?;
        self.file
            .flush()
            .map_err(|e| Error::io(format!("flushing '{}'", self.path.display()), e))?;
        Ok(offset)
    }

    /// Peek the serial the sentinel at the current cursor holds, without
    /// moving the cursor.
    fn read_next_serial_at_cursor(&mut self) -> Result<u64> {
        let here = self.stream_position()?;
        let serial = match self.read_next()? {
            Entry::Sentinel(idx) => idx,
            Entry::Record(_) => return Err(self.corrupt("expected the sentinel at append position")),
        };
        self.file
            .seek(SeekFrom::Start(here))
            .map_err(|e| Error::io(format!("seeking in '{}'", self.path.display()), e))?;
        Ok(serial)
    }

    /// Undo a partially-recorded append by rewriting the sentinel at
    /// `offset` back to `idx` and truncating the file to just past it.
    pub fn truncate_to(&mut self, offset: u64, idx: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io(format!("seeking in '{}'", self.path.display()), e))?;
        write!(self.file, "{idx:0w$}\n", w = SERIAL_WIDTH)
            .map_err(|e| Error::io(format!("writing to '{}'", self.path.display()), e))?;
        self.file
            .flush()
            .map_err(|e| Error::io(format!("flushing '{}'", self.path.display()), e))?;
        self.file
            .set_len(offset + SENTINEL_LEN)
            .map_err(|e| Error::io(format!("truncating '{}'", self.path.display()), e))?;
        Ok(())
    }

    /// Rewrite the action field of the record starting at `offset` to its
    /// `un*` form, in place. `module_len` is the byte length of the
    /// record's module name.
    pub fn rewrite_action(&mut self, offset: u64, module_len: usize, new_action: Action) -> Result<()> {
        let pos = offset + (SERIAL_WIDTH as u64) + 1 + module_len as u64 + 1;
        self.file
            .seek(SeekFrom::Start(pos))
            .map_err(|e| Error::io(format!("seeking in '{}'", self.path.display()), e))?;
        write!(self.file, "{:<aw$}", new_action.canonical(), aw = ACTION_WIDTH)
            .map_err(|e| Error::io(format!("writing to '{}'", self.path.display()), e))?;
        self.file
            .flush()
            .map_err(|e| Error::io(format!("flushing '{}'", self.path.display()), e))?;
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::Corrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.file.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) => Err(Error::io(format!("reading '{}'", self.path.display()), e)),
        }
    }

    fn read_serial(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for _ in 0..SERIAL_WIDTH {
            match self.read_byte()? {
                Some(b) if b.is_ascii_digit() => value = value * 10 + u64::from(b - b'0'),
                Some(_) => return Err(self.corrupt("bad character in the line index")),
                None => return Err(self.corrupt("incomplete line index at EOF")),
            }
        }
        Ok(value)
    }

    fn read_token(&mut self, terminator: u8, what: &str) -> Result<String> {
        let mut out = Vec::new();
        loop {
            match self.read_byte()? {
                Some(b) if b == terminator => break,
                Some(b) => out.push(b),
                None => return Err(self.corrupt(format!("no {what} before EOF"))),
            }
        }
        String::from_utf8(out).map_err(|_| self.corrupt(format!("{what} is not valid UTF-8")))
    }

    fn read_fixed(&mut self, width: usize) -> Result<String> {
        let mut out = Vec::with_capacity(width);
        for _ in 0..width {
            match self.read_byte()? {
                Some(b) => out.push(b),
                None => return Err(self.corrupt("incomplete action field at EOF")),
            }
        }
        String::from_utf8(out).map_err(|_| self.corrupt("action field is not valid UTF-8"))
    }

    fn read_line(&mut self) -> Result<String> {
        let mut out = Vec::new();
        loop {
            match self.read_byte()? {
                Some(b'\n') => break,
                Some(b) => out.push(b),
                None => return Err(self.corrupt("no filename before EOF")),
            }
        }
        while out.last() == Some(&b'\r') {
            out.pop();
        }
        String::from_utf8(out).map_err(|_| self.corrupt("filename is not valid UTF-8"))
    }
}

fn validate_token(s: &str) -> std::result::Result<(), String> {
    if s.is_empty() {
        return Err("empty module name".to_string());
    }
    if s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        Ok(())
    } else {
        Err(format!("invalid character in module name '{s}'"))
    }
}

#[cfg(unix)]
fn create_dir(db_dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(db_dir)
        .map_err(|e| Error::io(format!("creating database directory '{}'", db_dir.display()), e))
}

#[cfg(not(unix))]
fn create_dir(db_dir: &Path) -> Result<()> {
    fs::create_dir_all(db_dir)
        .map_err(|e| Error::io(format!("creating database directory '{}'", db_dir.display()), e))
}

#[cfg(unix)]
fn create_exclusive(path: &Path) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)
        .map_err(|e| Error::io(format!("creating journal '{}'", path.display()), e))
}

#[cfg(not(unix))]
fn create_exclusive(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| Error::io(format!("creating journal '{}'", path.display()), e))
}

fn lock(file: &File, path: &Path) -> Result<()> {
    file.try_lock_exclusive()
        .map_err(|_| Error::Locked(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_or_create_writes_empty_sentinel() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let _journal = Journal::open_or_create(&db, false).unwrap();
        let bytes = fs::read(crate::paths::journal_path(&db)).unwrap();
        assert_eq!(bytes, EMPTY_JOURNAL);
    }

    #[test]
    fn open_or_create_rejects_existing_when_may_exist_false() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        {
            let _journal = Journal::open_or_create(&db, false).unwrap();
        }
        let err = Journal::open_or_create(&db, false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let mut journal = Journal::open_or_create(&db, false).unwrap();
        journal.read_last().unwrap();
        let offset = journal.append("alpha", Action::Create, "/etc/dst.txt").unwrap();
        assert_eq!(offset, 0);

        journal.rewind().unwrap();
        match journal.read_next().unwrap() {
            Entry::Record(rec) => {
                assert_eq!(rec.serial, 0);
                assert_eq!(rec.module, "alpha");
                assert_eq!(rec.action, Action::Create);
                assert_eq!(rec.filename, "/etc/dst.txt");
            }
            other => panic!("expected a record, got {other:?}"),
        }
        match journal.read_next().unwrap() {
            Entry::Sentinel(idx) => assert_eq!(idx, 1),
            other => panic!("expected the sentinel, got {other:?}"),
        }
    }

    #[test]
    fn rewrite_action_marks_record_undone() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let mut journal = Journal::open_or_create(&db, false).unwrap();
        journal.read_last().unwrap();
        let offset = journal.append("alpha", Action::Create, "/etc/dst.txt").unwrap();

        journal
            .rewrite_action(offset, "alpha".len(), Action::Uncreate)
            .unwrap();

        journal.rewind().unwrap();
        match journal.read_next().unwrap() {
            Entry::Record(rec) => assert_eq!(rec.action, Action::Uncreate),
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn truncate_to_removes_a_partial_append() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let mut journal = Journal::open_or_create(&db, false).unwrap();
        let rollback_pos = journal.read_last().unwrap();
        let offset = journal.append("alpha", Action::Create, "/etc/dst.txt").unwrap();
        assert_eq!(offset, 0);

        journal.truncate_to(offset, rollback_pos).unwrap();
        let bytes = fs::read(crate::paths::journal_path(&db)).unwrap();
        assert_eq!(bytes, EMPTY_JOURNAL);
    }

    #[test]
    fn rejects_invalid_action_name() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let path = crate::paths::journal_path(&db);
        fs::create_dir_all(&db).unwrap();
        fs::write(&path, b"000000 alpha bogus   /etc/f\n000001\n").unwrap();
        let mut journal = Journal::open(&db).unwrap();
        let err = journal.read_next().unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn rejects_out_of_order_serial() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let path = crate::paths::journal_path(&db);
        fs::create_dir_all(&db).unwrap();
        // Second record repeats serial 000000 instead of advancing to 000001.
        fs::write(
            &path,
            b"000000 alpha create   /etc/a\n000000 alpha create   /etc/b\n000002\n",
        )
        .unwrap();
        let mut journal = Journal::open(&db).unwrap();
        journal.read_next().unwrap();
        let err = journal.read_next().unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn rewind_resets_the_monotonicity_expectation() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let mut journal = Journal::open_or_create(&db, false).unwrap();
        journal.read_last().unwrap();
        journal.append("alpha", Action::Create, "/etc/a").unwrap();
        journal.append("alpha", Action::Create, "/etc/b").unwrap();

        journal.rewind().unwrap();
        journal.read_next().unwrap();
        journal.read_next().unwrap();

        journal.rewind().unwrap();
        journal.read_next().unwrap();
        journal.read_next().unwrap();
    }
}
