// src/cli.rs

//! Command-line surface: a `clap` derive `Parser`/`Subcommand`, plus the
//! static `argv[0]`-suffix dispatch table used before clap parsing runs.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "txn", version, about = "Transactional file installer with an append-only rollback journal")]
pub struct Cli {
    /// Print the build-time feature set and exit.
    #[arg(long, global = true)]
    pub features: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database directory and an empty journal.
    DbInit,

    /// Record and install one or more files.
    Install {
        /// Copy rather than move the source (passed through to `install`).
        #[arg(short = 'c')]
        copy: bool,
        #[arg(short = 'g', value_name = "GROUP")]
        group: Option<String>,
        #[arg(short = 'm', value_name = "MODE")]
        mode: Option<String>,
        #[arg(short = 'o', value_name = "OWNER")]
        owner: Option<String>,
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        dest: PathBuf,
    },

    /// As `install`, but owner/group/mode are copied verbatim from each source.
    InstallExact {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        dest: PathBuf,
    },

    /// Back up and delete a file.
    Remove { file: PathBuf },

    /// Reverse a module's active records.
    Rollback { module: String },

    /// Print distinct active modules, one per line.
    ListModules,

    /// Emit a shell-completion script.
    Completions { shell: Shell },
}

/// The argv[0]-suffix dispatch table: `txn-install`, `txn-remove`, etc. are
/// equivalent to `txn install`, `txn remove`, checked before clap parsing
/// sees the rest of argv.
pub fn subcommand_from_argv0(argv0: &str) -> Option<&'static str> {
    let base = argv0.rsplit(['/', '\\']).next().unwrap_or(argv0);
    match base.strip_prefix("txn-") {
        Some("db-init") => Some("db-init"),
        Some("install") => Some("install"),
        Some("install-exact") => Some("install-exact"),
        Some("remove") => Some("remove"),
        Some("rollback") => Some("rollback"),
        Some("list-modules") => Some("list-modules"),
        _ => None,
    }
}

pub const FEATURES: &[&str] = &[if cfg!(unix) { "unix-ownership" } else { "generic-ownership" }];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_argv0_suffixes() {
        assert_eq!(subcommand_from_argv0("/usr/bin/txn-install"), Some("install"));
        assert_eq!(subcommand_from_argv0("txn-rollback"), Some("rollback"));
        assert_eq!(subcommand_from_argv0("txn"), None);
        assert_eq!(subcommand_from_argv0("something-else"), None);
    }
}
