//! Per-machine journal of boot observations

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::error::{HarnessError, HarnessResult};

const JOURNAL_FILE: &str = "journal.txt";

/// File-backed journal attached to a machine
///
/// Entries are appended until `destroy` is called; later records are
/// ignored so teardown can release the journal without racing writers.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl Journal {
    /// Create `journal.txt` under `dir`, truncating an earlier one
    pub fn create(dir: &Path) -> HarnessResult<Self> {
        let path = dir.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| {
                HarnessError::internal(format!("Failed to create journal {}: {e}", path.display()))
            })?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped entry
    pub fn record(&self, label: &str, text: &str) -> HarnessResult<()> {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };

        let mut entry = format!("-- {} {} --\n{}", Utc::now().to_rfc3339(), label, text);
        if !entry.ends_with('\n') {
            entry.push('\n');
        }

        file.write_all(entry.as_bytes()).map_err(|e| {
            HarnessError::internal(format!("Failed to write journal {}: {e}", self.path.display()))
        })
    }

    /// Read everything recorded so far
    pub fn read(&self) -> HarnessResult<Vec<u8>> {
        fs::read(&self.path).map_err(|e| {
            HarnessError::internal(format!("Failed to read journal {}: {e}", self.path.display()))
        })
    }

    /// Flush and close the journal; idempotent
    pub fn destroy(&self) -> HarnessResult<()> {
        let file = self
            .file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match file {
            Some(file) => file.sync_all().map_err(|e| {
                HarnessError::internal(format!("Failed to flush journal {}: {e}", self.path.display()))
            }),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    use super::*;

    #[test]
    fn records_until_destroyed() {
        let dir = TempDir::new().expect("temp dir");
        let journal = Journal::create(dir.path()).expect("create journal");

        journal.record("boot", "boot_id=abc").expect("record");
        journal.destroy().expect("destroy");
        journal.record("boot", "boot_id=def").expect("record after destroy");
        journal.destroy().expect("second destroy");

        assert!(journal.is_closed());
        dir.child("journal.txt")
            .assert(predicate::str::contains("boot_id=abc"))
            .assert(predicate::str::contains("boot_id=def").not());

        let contents = String::from_utf8(journal.read().expect("read")).expect("utf8");
        assert!(contents.starts_with("-- "));
        assert!(contents.contains(" boot --\nboot_id=abc\n"));
    }
}
