// src/modules.rs

//! Module Lister: distinct module names with at least one active record.

use crate::error::Result;
use crate::journal::{Entry, Journal};

/// Streams the journal and returns distinct module names from active
/// records, in first-seen order.
pub fn list(journal: &mut Journal) -> Result<Vec<String>> {
    journal.rewind()?;
    let mut seen = Vec::new();
    loop {
        match journal.read_next()? {
            Entry::Sentinel(_) => break,
            Entry::Record(record) => {
                if record.action.is_active() && !seen.contains(&record.module) {
                    seen.push(record.module);
                }
            }
        }
    }
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Action;
    use tempfile::TempDir;

    #[test]
    fn lists_distinct_active_modules_in_order() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let mut journal = Journal::open_or_create(&db, false).unwrap();

        journal.read_last().unwrap();
        journal.append("beta", Action::Create, "/etc/a").unwrap();
        journal.append("alpha", Action::Create, "/etc/b").unwrap();
        journal.append("beta", Action::Patch, "/etc/c").unwrap();

        let names = list(&mut journal).unwrap();
        assert_eq!(names, vec!["beta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn excludes_modules_whose_only_records_are_undone() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let mut journal = Journal::open_or_create(&db, false).unwrap();

        journal.read_last().unwrap();
        let offset = journal.append("alpha", Action::Create, "/etc/a").unwrap();
        journal.rewrite_action(offset, "alpha".len(), Action::Uncreate).unwrap();

        let names = list(&mut journal).unwrap();
        assert!(names.is_empty());
    }
}
