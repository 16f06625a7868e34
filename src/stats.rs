//! Observer plugged into the walker: tracks the largest files seen and groups
//! files by content hash to surface duplicates.

use std::collections::HashMap;
use std::sync::Mutex;

const LARGEST_FILES_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct BasicFile {
    pub path: String,
    pub size: i64,
}

#[derive(Default)]
struct StatsState {
    largest_files: Vec<BasicFile>,
    duplicates: HashMap<Vec<u8>, Vec<BasicFile>>,
}

/// Thread-safe collector fed from worker threads during a parallel walk.
pub struct StatsSink {
    state: Mutex<StatsState>,
}

impl StatsSink {
    pub fn new() -> Self {
        StatsSink {
            state: Mutex::new(StatsState::default()),
        }
    }

    /// Record a file's size, keeping `largest_files` sorted descending and
    /// capped at `LARGEST_FILES_LIMIT`.
    pub fn on_file_seen(&self, path: &str, size: i64) {
        let mut state = self.state.lock().unwrap();
        let file = BasicFile {
            path: path.to_string(),
            size,
        };

        let idx = state.largest_files.partition_point(|f| f.size >= size);
        if idx < LARGEST_FILES_LIMIT {
            state.largest_files.insert(idx, file);
            if state.largest_files.len() > LARGEST_FILES_LIMIT {
                state.largest_files.truncate(LARGEST_FILES_LIMIT);
            }
        }
    }

    /// Record a comprehensive hash for a file, grouping it with any prior file
    /// sharing the same digest.
    pub fn on_hash(&self, hash_bytes: &[u8], size: i64, path: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .duplicates
            .entry(hash_bytes.to_vec())
            .or_default()
            .push(BasicFile {
                path: path.to_string(),
                size,
            });
    }

    pub fn largest_files(&self, limit: usize) -> Vec<BasicFile> {
        let state = self.state.lock().unwrap();
        state.largest_files.iter().take(limit).cloned().collect()
    }

    /// Groups with more than one member, sorted by `count * size` descending.
    pub fn largest_duplicates(&self, limit: usize) -> Vec<Vec<BasicFile>> {
        let state = self.state.lock().unwrap();
        let mut groups: Vec<Vec<BasicFile>> = state
            .duplicates
            .values()
            .filter(|g| g.len() > 1)
            .cloned()
            .collect();

        groups.sort_by_key(|g| std::cmp::Reverse(g.len() as i64 * g[0].size));
        groups.truncate(limit);
        groups
    }
}

impl Default for StatsSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_files_stay_sorted_descending() {
        let sink = StatsSink::new();
        sink.on_file_seen("a", 10);
        sink.on_file_seen("b", 30);
        sink.on_file_seen("c", 20);
        let top = sink.largest_files(10);
        let sizes: Vec<_> = top.iter().map(|f| f.size).collect();
        assert_eq!(sizes, vec![30, 20, 10]);
    }

    #[test]
    fn largest_files_respects_limit() {
        let sink = StatsSink::new();
        for i in 0..(LARGEST_FILES_LIMIT + 10) {
            sink.on_file_seen(&format!("f{i}"), i as i64);
        }
        assert_eq!(sink.largest_files(LARGEST_FILES_LIMIT + 10).len(), LARGEST_FILES_LIMIT);
    }

    #[test]
    fn duplicate_groups_need_at_least_two_members() {
        let sink = StatsSink::new();
        sink.on_hash(b"hash-a", 5, "only-one");
        assert!(sink.largest_duplicates(10).is_empty());

        sink.on_hash(b"hash-b", 8, "first");
        sink.on_hash(b"hash-b", 8, "second");
        let dups = sink.largest_duplicates(10);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].len(), 2);
    }

    #[test]
    fn duplicate_groups_sorted_by_total_size() {
        let sink = StatsSink::new();
        sink.on_hash(b"small", 2, "s1");
        sink.on_hash(b"small", 2, "s2");
        sink.on_hash(b"big", 100, "b1");
        sink.on_hash(b"big", 100, "b2");
        sink.on_hash(b"big", 100, "b3");
        let dups = sink.largest_duplicates(10);
        assert_eq!(dups[0][0].size, 100);
    }
}
