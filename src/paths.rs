// src/paths.rs

//! Resolves the database directory and journal path from the environment.

use std::path::{Path, PathBuf};

pub const DB_ENV: &str = "TXN_INSTALL_DB";
pub const MODULE_ENV: &str = "TXN_INSTALL_MODULE";
pub const DEFAULT_DB_DIR: &str = "/var/lib/txn";
pub const DEFAULT_MODULE: &str = "unknown";
pub const JOURNAL_FILE_NAME: &str = "txn.index";

/// Process-wide settings resolved once in `main` and threaded through every
/// recorder/rollback call instead of living in global statics.
#[derive(Debug, Clone)]
pub struct Context {
    pub db_dir: PathBuf,
    pub module: String,
}

impl Context {
    pub fn from_env() -> Self {
        let db_dir = std::env::var_os(DB_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_DIR));
        let module = std::env::var(MODULE_ENV).unwrap_or_else(|_| DEFAULT_MODULE.to_string());
        Self { db_dir, module }
    }

    pub fn journal_path(&self) -> PathBuf {
        journal_path(&self.db_dir)
    }

    pub fn sidecar_path(&self, serial: u64) -> PathBuf {
        sidecar_path(&self.db_dir, serial)
    }
}

pub fn journal_path(db_dir: &Path) -> PathBuf {
    db_dir.join(JOURNAL_FILE_NAME)
}

pub fn sidecar_path(db_dir: &Path, serial: u64) -> PathBuf {
    db_dir.join(format!("txn.{serial:06}"))
}
