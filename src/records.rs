//! JSON-backed index of which scans and diffs exist for each scanned root.
//!
//! Kept deliberately separate from [`crate::persistence`]: this module only
//! tracks *which* `.tree`/`.diff` files exist and their sequence numbers; the
//! files themselves are read and written by the persistence layer.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::path_util::hash_path_for_filename;

/// Keep at most this many full scans per root on disk; everything older than
/// the most recent is expressed as a diff instead, except the very first scan,
/// which stays so that `diff <path>` always has something to compare against.
const KEEP_FULL_SCANS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub is_comprehensive: bool,
    pub time_completed: SystemTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanRecords {
    pub records: Vec<Record>,
    pub curr_scan_num: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffRecords {
    pub records: Vec<Record>,
    pub curr_diff_num: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllRecords {
    pub scans: BTreeMap<String, ScanRecords>,
    pub diffs: BTreeMap<String, DiffRecords>,
}

pub struct RecordsHandle {
    pub records: AllRecords,
    path: PathBuf,
}

impl RecordsHandle {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let handle = RecordsHandle {
                records: AllRecords::default(),
                path,
            };
            handle.flush()?;
            return Ok(handle);
        }

        let text = std::fs::read_to_string(&path).with_context(|| format!("reading records {}", path.display()))?;
        let records: AllRecords =
            serde_json::from_str(&text).with_context(|| format!("parsing records {}", path.display()))?;
        Ok(RecordsHandle { records, path })
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, text).with_context(|| format!("writing records {}", self.path.display()))?;
        Ok(())
    }

    /// Records a newly-written full scan for `root`, returning its filename and
    /// the root path (if any) that should now be retired down to a diff-only
    /// representation.
    pub fn add_full_scan_record(&mut self, root: &str, is_comprehensive: bool) -> anyhow::Result<String> {
        let entry = self.records.scans.entry(root.to_string()).or_default();
        entry.curr_scan_num += 1;
        let n = entry.curr_scan_num;
        entry.records.push(Record {
            is_comprehensive,
            time_completed: SystemTime::now(),
        });
        self.flush()?;
        Ok(scan_filename(root, n))
    }

    pub fn add_diff_scan_record(&mut self, root: &str, is_comprehensive: bool) -> anyhow::Result<String> {
        let entry = self.records.diffs.entry(root.to_string()).or_default();
        entry.curr_diff_num += 1;
        let n = entry.curr_diff_num;
        entry.records.push(Record {
            is_comprehensive,
            time_completed: SystemTime::now(),
        });
        self.flush()?;
        Ok(diff_filename(root, n))
    }

    /// Best-effort rollback of the most recent scan record for `root`, used
    /// when the corresponding tree file failed to write after the record was
    /// provisionally added. Only reverts if it completed within the last
    /// `grace` window, to avoid clobbering a legitimate older record during a
    /// crash-recovery pass.
    pub fn revert_full_scan_record(&mut self, root: &str, grace: Duration) -> anyhow::Result<()> {
        if let Some(entry) = self.records.scans.get_mut(root) {
            if let Some(last) = entry.records.last() {
                if SystemTime::now().duration_since(last.time_completed).unwrap_or_default() < grace {
                    entry.records.pop();
                    entry.curr_scan_num = entry.curr_scan_num.saturating_sub(1);
                    self.flush()?;
                }
            }
        }
        Ok(())
    }

    pub fn revert_diff_scan_record(&mut self, root: &str, grace: Duration) -> anyhow::Result<()> {
        if let Some(entry) = self.records.diffs.get_mut(root) {
            if let Some(last) = entry.records.last() {
                if SystemTime::now().duration_since(last.time_completed).unwrap_or_default() < grace {
                    entry.records.pop();
                    entry.curr_diff_num = entry.curr_diff_num.saturating_sub(1);
                    self.flush()?;
                }
            }
        }
        Ok(())
    }

    pub fn scan_count(&self, root: &str) -> u64 {
        self.records.scans.get(root).map(|e| e.curr_scan_num).unwrap_or(0)
    }

    pub fn get_scan_filename(&self, root: &str, n: u64) -> String {
        scan_filename(root, n)
    }

    pub fn get_last_scan_filename(&self, root: &str) -> Option<String> {
        let n = self.records.scans.get(root)?.curr_scan_num;
        if n == 0 {
            None
        } else {
            Some(scan_filename(root, n))
        }
    }

    pub fn get_first_scan_filename(&self, root: &str) -> Option<String> {
        let entry = self.records.scans.get(root)?;
        if entry.records.is_empty() {
            None
        } else {
            Some(scan_filename(root, 1))
        }
    }

    /// Whether more than `KEEP_FULL_SCANS` full scans now exist for `root`,
    /// meaning the oldest one beyond the first can be dropped in favor of the
    /// diffs that already cover it.
    pub fn should_retire_oldest(&self, root: &str) -> bool {
        self.records.scans.get(root).map(|e| e.records.len() > KEEP_FULL_SCANS).unwrap_or(false)
    }
}

fn scan_filename(root: &str, n: u64) -> String {
    format!("{}_{}.tree", hash_path_for_filename(root), n)
}

fn diff_filename(root: &str, n: u64) -> String {
    format!("{}_{}.diff", hash_path_for_filename(root), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_full_scan_gets_sequence_number_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RecordsHandle::load(dir.path().join("records.json")).unwrap();
        let name = handle.add_full_scan_record("/tmp/t", false).unwrap();
        assert!(name.ends_with("_1.tree"));
    }

    #[test]
    fn revert_within_grace_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RecordsHandle::load(dir.path().join("records.json")).unwrap();
        handle.add_full_scan_record("/tmp/t", false).unwrap();
        handle.revert_full_scan_record("/tmp/t", Duration::from_secs(10)).unwrap();
        assert_eq!(handle.scan_count("/tmp/t"), 0);
    }

    #[test]
    fn get_last_scan_filename_tracks_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RecordsHandle::load(dir.path().join("records.json")).unwrap();
        handle.add_full_scan_record("/tmp/t", false).unwrap();
        handle.add_full_scan_record("/tmp/t", false).unwrap();
        assert_eq!(handle.get_last_scan_filename("/tmp/t").unwrap(), handle.get_scan_filename("/tmp/t", 2));
    }

    #[test]
    fn should_retire_oldest_stays_false_until_a_third_scan_exists() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RecordsHandle::load(dir.path().join("records.json")).unwrap();
        assert!(!handle.should_retire_oldest("/tmp/t"));

        handle.add_full_scan_record("/tmp/t", false).unwrap();
        assert!(!handle.should_retire_oldest("/tmp/t"));

        handle.add_full_scan_record("/tmp/t", false).unwrap();
        assert!(!handle.should_retire_oldest("/tmp/t"));

        handle.add_full_scan_record("/tmp/t", false).unwrap();
        assert!(handle.should_retire_oldest("/tmp/t"));
    }

    #[test]
    fn first_scan_filename_is_exempt_from_retirement_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RecordsHandle::load(dir.path().join("records.json")).unwrap();
        handle.add_full_scan_record("/tmp/t", false).unwrap();
        handle.add_full_scan_record("/tmp/t", false).unwrap();
        handle.add_full_scan_record("/tmp/t", false).unwrap();

        // Bookends are the first and current-latest scan; the retirement
        // target (the previous "latest") is neither.
        let first = handle.get_first_scan_filename("/tmp/t").unwrap();
        let last = handle.get_last_scan_filename("/tmp/t").unwrap();
        let retirement_target = handle.get_scan_filename("/tmp/t", 2);
        assert_ne!(first, retirement_target);
        assert_ne!(last, retirement_target);
    }
}
