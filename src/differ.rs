//! Compares two scans of the same root and produces a [`ScanDiff`] keyed by path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::hash::{hashes_equal, HashArena, HashLocation};
use crate::tree::{File, FileTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    Unchanged,
    Modified,
    Renamed,
    Removed,
    Added,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub kind: DiffKind,
    pub newer_name: String,
    pub newer_err: String,
    pub hash_diff: HashLocation,
    pub size_diff: i64,
    pub last_modified_diff: SignedDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDiff {
    pub kind: DiffKind,
    pub comprehensive: bool,
    pub original_path: String,
    pub newer_path: String,
    pub depth_diff: i64,
    pub err_strings_diff: Vec<String>,
    pub last_visited_diff: SignedDuration,
    pub time_taken_diff: SignedDuration,
    pub last_modified_diff_direct: SignedDuration,
    pub size_diff_direct: i64,
    pub num_files_diff_direct: i64,
}

/// A signed delta between two `SystemTime`s or `Duration`s, stored as
/// milliseconds since `SystemTime`/`Duration` themselves have no subtraction
/// that can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDuration(pub i64);

impl SignedDuration {
    pub fn zero() -> Self {
        SignedDuration(0)
    }

    pub fn between(older: SystemTime, newer: SystemTime) -> Self {
        match newer.duration_since(older) {
            Ok(d) => SignedDuration(d.as_millis() as i64),
            Err(e) => SignedDuration(-(e.duration().as_millis() as i64)),
        }
    }

    pub fn from_durations(older: Duration, newer: Duration) -> Self {
        SignedDuration(newer.as_millis() as i64 - older.as_millis() as i64)
    }

    pub fn apply_to(&self, base: SystemTime) -> SystemTime {
        if self.0 >= 0 {
            base + Duration::from_millis(self.0 as u64)
        } else {
            base - Duration::from_millis((-self.0) as u64)
        }
    }

    pub fn apply_to_duration(&self, base: Duration) -> Duration {
        let millis = base.as_millis() as i64 + self.0;
        Duration::from_millis(millis.max(0) as u64)
    }

    pub fn add(&self, other: &SignedDuration) -> SignedDuration {
        SignedDuration(self.0 + other.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanDiff {
    pub all_hash: HashArena,
    pub trees: BTreeMap<String, TreeDiff>,
    pub files: BTreeMap<String, FileDiff>,
}

/// Compare `old` against `new`, both rooted at the same logical path, and
/// produce the diff that `apply(old, diff)` would fold back into `new`.
pub fn diff(old: &FileTree, new: &FileTree) -> ScanDiff {
    let mut out = ScanDiff::default();
    diff_tree_pair(old, &old.all_hash, new, &new.all_hash, &mut out);
    out
}

fn diff_tree_pair(a: &FileTree, arena_a: &HashArena, b: &FileTree, arena_b: &HashArena, out: &mut ScanDiff) {
    let file_diffs = diff_files(&a.files, arena_a, &b.files, arena_b, out);

    let size_diff_direct = b.size_direct - a.size_direct;
    let num_files_diff_direct = b.num_files_direct - a.num_files_direct;
    let last_modified_diff_direct = SignedDuration::between(a.last_modified_direct, b.last_modified_direct);

    let kind = if a.base_path == b.base_path {
        if size_diff_direct == 0 && num_files_diff_direct == 0 && last_modified_diff_direct.0 == 0 && file_diffs.is_empty()
        {
            DiffKind::Unchanged
        } else {
            DiffKind::Modified
        }
    } else {
        DiffKind::Renamed
    };

    if kind != DiffKind::Unchanged || !file_diffs.is_empty() {
        out.trees.insert(
            a.base_path.clone(),
            TreeDiff {
                kind,
                comprehensive: b.comprehensive,
                original_path: a.base_path.clone(),
                newer_path: b.base_path.clone(),
                depth_diff: b.depth - a.depth,
                err_strings_diff: err_strings_diff(&a.err_strings, &b.err_strings),
                last_visited_diff: SignedDuration::between(a.last_visited, b.last_visited),
                time_taken_diff: SignedDuration::from_durations(a.time_taken, b.time_taken),
                last_modified_diff_direct,
                size_diff_direct,
                num_files_diff_direct,
            },
        );
    }

    diff_trees(&a.sub_trees, arena_a, &b.sub_trees, arena_b, out);
}

/// Matches `a.files` against `b.files`, writing entries for every non-unchanged
/// pairing (and for unmatched files on either side) into `out.files`, keyed by
/// the older name for removed/modified/renamed and the newer name for added.
/// Returns the file-level diffs produced at this directory, for the caller's
/// own classification decision.
fn diff_files(a: &[File], arena_a: &HashArena, b: &[File], arena_b: &HashArena, out: &mut ScanDiff) -> Vec<FileDiff> {
    let mut matched_b = vec![false; b.len()];
    let mut produced = Vec::new();

    'outer: for fa in a {
        for (j, fb) in b.iter().enumerate() {
            if matched_b[j] {
                continue;
            }
            let hash_eq = hashes_equal(&fa.hash, arena_a, &fb.hash, arena_b);
            let name_eq = fa.name == fb.name;

            if name_eq {
                // Shallow pairs carry no hash at all, so `hash_eq` is trivially true
                // for them; fall back to size/mtime to detect an in-place edit.
                let shallow_pair = !fa.hash.is_present() && !fb.hash.is_present();
                let metadata_changed = shallow_pair && (fa.size != fb.size || fa.last_modified != fb.last_modified);

                matched_b[j] = true;
                if hash_eq && !metadata_changed {
                    continue 'outer;
                }
                let hash_diff = arena_b.copy_into(&fb.hash, &mut out.all_hash);
                let fd = FileDiff {
                    kind: DiffKind::Modified,
                    newer_name: fb.name.clone(),
                    newer_err: fb.err.clone(),
                    hash_diff,
                    size_diff: fb.size - fa.size,
                    last_modified_diff: SignedDuration::between(fa.last_modified, fb.last_modified),
                };
                out.files.insert(fa.name.clone(), fd.clone());
                produced.push(fd);
                continue 'outer;
            }
            if hash_eq && fa.hash.is_present() {
                matched_b[j] = true;
                let fd = FileDiff {
                    kind: DiffKind::Renamed,
                    newer_name: fb.name.clone(),
                    newer_err: fb.err.clone(),
                    hash_diff: HashLocation::none(),
                    size_diff: fb.size - fa.size,
                    last_modified_diff: SignedDuration::between(fa.last_modified, fb.last_modified),
                };
                out.files.insert(fa.name.clone(), fd.clone());
                produced.push(fd);
                continue 'outer;
            }
        }

        // No match in b at all: removed.
        let fd = FileDiff {
            kind: DiffKind::Removed,
            newer_name: String::new(),
            newer_err: String::new(),
            hash_diff: HashLocation::none(),
            size_diff: -fa.size,
            last_modified_diff: SignedDuration::between(fa.last_modified, crate::tree::ZERO_TIME),
        };
        out.files.insert(fa.name.clone(), fd.clone());
        produced.push(fd);
    }

    for (j, fb) in b.iter().enumerate() {
        if matched_b[j] {
            continue;
        }
        let hash_diff = arena_b.copy_into(&fb.hash, &mut out.all_hash);
        let fd = FileDiff {
            kind: DiffKind::Added,
            newer_name: fb.name.clone(),
            newer_err: fb.err.clone(),
            hash_diff,
            size_diff: fb.size,
            last_modified_diff: SignedDuration::between(crate::tree::ZERO_TIME, fb.last_modified),
        };
        out.files.insert(fb.name.clone(), fd.clone());
        produced.push(fd);
    }

    produced
}

/// Matches `a`'s subtrees against `b`'s using the `(base_path, size_direct,
/// last_modified_direct)` tuple, recursing into every matched pair regardless
/// of its classification (a change can live arbitrarily deep even when this
/// level's tuple looks unchanged), and emitting removed/added subtrees in full
/// for anything left unmatched.
fn diff_trees(a: &[FileTree], arena_a: &HashArena, b: &[FileTree], arena_b: &HashArena, out: &mut ScanDiff) {
    let mut matched_b = vec![false; b.len()];

    'outer: for ta in a {
        for (j, tb) in b.iter().enumerate() {
            if matched_b[j] {
                continue;
            }
            let name_eq = ta.base_path == tb.base_path;
            let size_eq = ta.size_direct == tb.size_direct;
            // Some platforms bump a directory's mtime merely because a child was
            // added or removed, which would otherwise masquerade as "modified"
            // on every scan. Treat a direct-size change as the modification
            // signal instead of relying on mtime for that case.
            let mod_eq = ta.last_modified_direct == tb.last_modified_direct;

            // A same-path pair is always this directory's match, whatever its
            // size/mtime tuple says — size/mtime only decide Unchanged vs.
            // Modified once paired (see `diff_tree_pair`), they must never cause
            // a same-path pair to be skipped as unmatched. A different-path pair
            // is only a rename candidate when both size and mtime still agree.
            let candidate = match (name_eq, size_eq, mod_eq) {
                (true, _, _) => true,
                (false, true, true) => true,
                _ => false,
            };
            if !candidate {
                continue;
            }

            matched_b[j] = true;
            diff_tree_pair(ta, arena_a, tb, arena_b, out);
            continue 'outer;
        }

        emit_removed_subtree(ta, arena_a, out);
    }

    for (j, tb) in b.iter().enumerate() {
        if !matched_b[j] {
            emit_added_subtree(tb, arena_b, out);
        }
    }
}

fn emit_removed_subtree(t: &FileTree, arena: &HashArena, out: &mut ScanDiff) {
    out.trees.insert(
        t.base_path.clone(),
        TreeDiff {
            kind: DiffKind::Removed,
            comprehensive: t.comprehensive,
            original_path: t.base_path.clone(),
            newer_path: String::new(),
            depth_diff: -t.depth,
            err_strings_diff: Vec::new(),
            last_visited_diff: SignedDuration::zero(),
            time_taken_diff: SignedDuration::zero(),
            last_modified_diff_direct: SignedDuration::between(t.last_modified_direct, crate::tree::ZERO_TIME),
            size_diff_direct: -t.size_direct,
            num_files_diff_direct: -t.num_files_direct,
        },
    );
    for f in &t.files {
        out.files.insert(
            f.name.clone(),
            FileDiff {
                kind: DiffKind::Removed,
                newer_name: String::new(),
                newer_err: String::new(),
                hash_diff: HashLocation::none(),
                size_diff: -f.size,
                last_modified_diff: SignedDuration::between(f.last_modified, crate::tree::ZERO_TIME),
            },
        );
    }
    for sub in &t.sub_trees {
        emit_removed_subtree(sub, arena, out);
    }
}

fn emit_added_subtree(t: &FileTree, arena: &HashArena, out: &mut ScanDiff) {
    out.trees.insert(
        t.base_path.clone(),
        TreeDiff {
            kind: DiffKind::Added,
            comprehensive: t.comprehensive,
            original_path: String::new(),
            newer_path: t.base_path.clone(),
            depth_diff: t.depth,
            err_strings_diff: t.err_strings.clone(),
            last_visited_diff: SignedDuration::zero(),
            time_taken_diff: SignedDuration::zero(),
            last_modified_diff_direct: SignedDuration::between(crate::tree::ZERO_TIME, t.last_modified_direct),
            size_diff_direct: t.size_direct,
            num_files_diff_direct: t.num_files_direct,
        },
    );
    for f in &t.files {
        let hash_diff = arena.copy_into(&f.hash, &mut out.all_hash);
        out.files.insert(
            f.name.clone(),
            FileDiff {
                kind: DiffKind::Added,
                newer_name: f.name.clone(),
                newer_err: f.err.clone(),
                hash_diff,
                size_diff: f.size,
                last_modified_diff: SignedDuration::between(crate::tree::ZERO_TIME, f.last_modified),
            },
        );
    }
    for sub in &t.sub_trees {
        emit_added_subtree(sub, arena, out);
    }
}

/// Multiset difference: entries in `b` not present (by count) in `a`.
fn err_strings_diff(a: &[String], b: &[String]) -> Vec<String> {
    let mut remaining = a.to_vec();
    let mut result = Vec::new();
    for s in b {
        if let Some(pos) = remaining.iter().position(|x| x == s) {
            remaining.remove(pos);
        } else {
            result.push(s.clone());
        }
    }
    result
}
