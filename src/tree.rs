//! In-memory representation of a directory scan.
//!
//! A [`FileTree`] mirrors one directory. Only the root (depth 0) owns a [`HashArena`];
//! every [`HashLocation`] anywhere in the tree indexes into that root's arena.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use crate::hash::{HashArena, HashLocation};

/// A regular file discovered during a walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub hash: HashLocation,
    pub size: i64,
    pub err: String,
    pub last_modified: SystemTime,
}

impl File {
    pub fn new(name: String, size: i64, last_modified: SystemTime) -> Self {
        File {
            name,
            hash: HashLocation::none(),
            size,
            err: String::new(),
            last_modified,
        }
    }
}

/// A directory and everything beneath it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTree {
    pub comprehensive: bool,
    pub base_path: String,
    pub files: Vec<File>,
    pub sub_trees: Vec<FileTree>,
    pub err_strings: Vec<String>,
    pub depth: i64,

    pub last_visited: SystemTime,
    pub time_taken: Duration,

    pub last_modified_direct: SystemTime,
    pub size_direct: i64,
    pub num_files_direct: i64,

    pub last_modified_below: SystemTime,
    pub size_below: i64,
    pub num_files_below: i64,

    /// Only ever populated at depth 0. Every `HashLocation` in the tree indexes here.
    pub all_hash: HashArena,
}

/// Library sentinel for "no timestamp recorded", distinct from any real file mtime
/// in practice (far enough in the past that no filesystem will produce it). Using
/// `UNIX_EPOCH` matches the original system's zero-value timestamp convention.
pub const ZERO_TIME: SystemTime = SystemTime::UNIX_EPOCH;

impl FileTree {
    pub fn empty(base_path: String, depth: i64, comprehensive: bool) -> Self {
        FileTree {
            comprehensive,
            base_path,
            files: Vec::new(),
            sub_trees: Vec::new(),
            err_strings: Vec::new(),
            depth,
            last_visited: ZERO_TIME,
            time_taken: Duration::ZERO,
            last_modified_direct: ZERO_TIME,
            size_direct: 0,
            num_files_direct: 0,
            last_modified_below: ZERO_TIME,
            size_below: 0,
            num_files_below: 0,
            all_hash: HashArena::new(),
        }
    }

    /// Recompute `*_direct` aggregates from `files`, and `*_below` aggregates by
    /// folding in `sub_trees`. Must be called bottom-up (children before parents);
    /// the applier relies on this after every structural mutation.
    pub fn recompute_aggregates(&mut self) {
        self.num_files_direct = self.files.len() as i64;
        self.size_direct = self.files.iter().map(|f| f.size).sum();
        self.last_modified_direct = self.files.iter().map(|f| f.last_modified).max().unwrap_or(ZERO_TIME);

        let mut num_files_below = self.num_files_direct;
        let mut size_below = self.size_direct;
        let mut last_modified_below = self.last_modified_direct;

        for sub in &self.sub_trees {
            num_files_below += sub.num_files_below;
            size_below += sub.size_below;
            last_modified_below = last_modified_below.max(sub.last_modified_below);
        }

        self.num_files_below = num_files_below;
        self.size_below = size_below;
        self.last_modified_below = last_modified_below;
    }

    /// Insert `file` keeping `files` sorted by name. Returns the insertion index.
    pub fn insert_file_sorted(&mut self, file: File) -> usize {
        let idx = self.files.partition_point(|f| f.name.as_str() < file.name.as_str());
        self.files.insert(idx, file);
        idx
    }

    /// Insert `sub` keeping `sub_trees` sorted by `base_path`. Returns the insertion index.
    pub fn insert_subtree_sorted(&mut self, sub: FileTree) -> usize {
        let idx = self
            .sub_trees
            .partition_point(|t| t.base_path.as_str() < sub.base_path.as_str());
        self.sub_trees.insert(idx, sub);
        idx
    }

    /// Merge `other`'s error strings into `self`'s in stable, deduplicated order.
    pub fn merge_err_strings(&mut self, other: &[String]) {
        for e in other {
            if !self.err_strings.contains(e) {
                self.err_strings.push(e.clone());
            }
        }
    }

    #[cfg(test)]
    pub fn assert_sorted(&self) {
        assert!(self.files.windows(2).all(|w| w[0].name < w[1].name), "files not sorted in {}", self.base_path);
        assert!(
            self.sub_trees.windows(2).all(|w| w[0].base_path < w[1].base_path),
            "sub_trees not sorted in {}",
            self.base_path
        );
        for sub in &self.sub_trees {
            sub.assert_sorted();
        }
    }
}
