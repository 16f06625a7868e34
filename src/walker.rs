//! Parallel filesystem walker.
//!
//! Three algorithms share one output contract (see [`FileTree`] invariants in
//! [`crate::tree`]): a single-threaded recursive reference implementation, a
//! parallel variant that hashes files across a worker pool once the directory
//! skeleton has been discovered, and a parallel variant that dispatches whole
//! directories as jobs. All three must agree modulo `last_visited`/`time_taken`.
//!
//! The worker-pool plumbing (`crossbeam` channels, `std::thread::scope`, idle
//! tracking) follows the same shape as this crate's job system, generalized
//! down to the two job kinds a walk actually needs: hash one file, or read one
//! directory.

use anyhow::Context;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};

use crate::hash::{HashArena, HashLocation, HashType};
use crate::path_util;
use crate::stats::StatsSink;
use crate::tree::{File, FileTree, ZERO_TIME};
use crate::util::SlashFix;
use crate::anyhow_loc;

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub comprehensive: bool,
    pub num_workers: usize,
    pub ignore: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            comprehensive: false,
            num_workers: num_cpus::get().max(1),
            ignore: Vec::new(),
        }
    }
}

fn is_ignored(name: &str, ignore: &[String]) -> bool {
    ignore.iter().any(|i| i == name)
}

fn read_sorted_dir(path: &Path) -> anyhow::Result<(Vec<fs::DirEntry>, Vec<fs::DirEntry>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("reading directory {}", path.display()))? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            dirs.push(entry);
        } else if file_type.is_file() {
            files.push(entry);
        }
    }
    dirs.sort_by_key(|e| e.file_name());
    files.sort_by_key(|e| e.file_name());
    Ok((dirs, files))
}

fn hash_file_sha256(path: &Path) -> anyhow::Result<[u8; 32]> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}

// ----------------------------------------------------------------------------
// Recursive, single-threaded reference implementation
// ----------------------------------------------------------------------------

pub fn walk_recursive(root: &Path, opts: &WalkOptions, stats: Option<&StatsSink>) -> FileTree {
    let mut arena = HashArena::new();
    let mut tree = walk_recursive_inner(root, 0, opts, stats, &mut arena);
    tree.all_hash = arena;
    tree
}

fn walk_recursive_inner(
    path: &Path,
    depth: i64,
    opts: &WalkOptions,
    stats: Option<&StatsSink>,
    arena: &mut HashArena,
) -> FileTree {
    let start = Instant::now();
    let base_path = path.to_string_lossy().to_string().slash_fix();
    let mut tree = FileTree::empty(base_path.clone(), depth, opts.comprehensive);

    match read_sorted_dir(path) {
        Ok((dirs, files)) => {
            for entry in dirs {
                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name, &opts.ignore) {
                    continue;
                }
                let sub = walk_recursive_inner(&entry.path(), depth + 1, opts, stats, arena);
                tree.err_strings.extend(sub.err_strings.clone());
                tree.sub_trees.push(sub);
            }

            for entry in files {
                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name, &opts.ignore) {
                    continue;
                }
                let full_path = path_util::join(&base_path, &name);
                let file = stat_and_maybe_hash(&entry.path(), full_path, opts, stats, arena, &mut tree.err_strings);
                tree.files.push(file);
            }
        }
        Err(e) => {
            tree.err_strings.push(e.to_string());
        }
    }

    tree.recompute_aggregates();
    tree.time_taken = start.elapsed();
    tree.last_visited = SystemTime::now();
    tree
}

fn stat_and_maybe_hash(
    disk_path: &Path,
    full_path: String,
    opts: &WalkOptions,
    stats: Option<&StatsSink>,
    arena: &mut HashArena,
    err_strings: &mut Vec<String>,
) -> File {
    let meta = match fs::metadata(disk_path) {
        Ok(m) => m,
        Err(e) => {
            err_strings.push(format!("stat {full_path}: {e}"));
            return File::new(full_path, 0, ZERO_TIME);
        }
    };

    let size = meta.len() as i64;
    let last_modified = meta.modified().unwrap_or(ZERO_TIME);
    let mut file = File::new(full_path.clone(), size, last_modified);

    if let Some(s) = stats {
        s.on_file_seen(&full_path, size);
    }

    if opts.comprehensive && size > 0 {
        match hash_file_sha256(disk_path) {
            Ok(digest) => {
                file.hash = arena.append(HashType::Sha256, &digest);
                if let Some(s) = stats {
                    s.on_hash(&digest, size, &full_path);
                }
            }
            Err(e) => {
                err_strings.push(format!("hash {full_path}: {e}"));
            }
        }
    }

    file
}

// ----------------------------------------------------------------------------
// Parallel, per-file job dispatch
// ----------------------------------------------------------------------------

/// Discover the directory skeleton single-threaded (cheap: `readdir` + `stat`),
/// reserving a contiguous arena block per directory for its files, then hash
/// every discovered file across a worker pool. This puts the parallelism where
/// the cost actually is for comprehensive scans: content hashing, not `stat`.
pub fn walk_parallel_per_file(root: &Path, opts: &WalkOptions, stats: Option<&StatsSink>) -> anyhow::Result<FileTree> {
    let arena = Mutex::new(HashArena::new());
    let mut pending_files: Vec<PendingFile> = Vec::new();

    let mut tree = discover_skeleton(root, 0, opts, &arena, &mut pending_files)?;

    let failures = if opts.comprehensive {
        hash_pending_files(&pending_files, opts, stats, &arena)?
    } else {
        Vec::new()
    };

    tree.all_hash = arena.into_inner().unwrap();
    if !failures.is_empty() {
        let failures: std::collections::HashMap<String, String> = failures.into_iter().collect();
        reset_failed_hashes(&mut tree, &failures);
    }
    recompute_all_aggregates(&mut tree);
    Ok(tree)
}

struct PendingFile {
    disk_path: std::path::PathBuf,
    full_path: String,
    hash_offset: i64,
    size: i64,
}

/// A file stat'd but not yet hashed; hashing is deferred until after this
/// directory's subdirectories have claimed their own arena space, so that
/// `all_hash`'s byte layout matches `walk_recursive`'s dirs-before-files
/// discovery order exactly (see [`discover_skeleton`]).
struct StattedFile {
    disk_path: std::path::PathBuf,
    full_path: String,
    size: i64,
    last_modified: SystemTime,
    hashable: bool,
}

fn discover_skeleton(
    path: &Path,
    depth: i64,
    opts: &WalkOptions,
    arena: &Mutex<HashArena>,
    pending: &mut Vec<PendingFile>,
) -> anyhow::Result<FileTree> {
    let start = Instant::now();
    let base_path = path.to_string_lossy().to_string().slash_fix();
    let mut tree = FileTree::empty(base_path.clone(), depth, opts.comprehensive);

    match read_sorted_dir(path) {
        Ok((dirs, files)) => {
            let mut statted: Vec<StattedFile> = Vec::new();
            for entry in &files {
                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name, &opts.ignore) {
                    continue;
                }
                let disk_path = entry.path();
                let full_path = path_util::join(&base_path, &name);

                match fs::metadata(&disk_path) {
                    Ok(meta) => {
                        let size = meta.len() as i64;
                        statted.push(StattedFile {
                            disk_path,
                            full_path,
                            size,
                            last_modified: meta.modified().unwrap_or(ZERO_TIME),
                            hashable: opts.comprehensive && size > 0,
                        });
                    }
                    Err(e) => {
                        tree.err_strings.push(format!("stat {full_path}: {e}"));
                        statted.push(StattedFile {
                            disk_path,
                            full_path,
                            size: 0,
                            last_modified: ZERO_TIME,
                            hashable: false,
                        });
                    }
                }
            }

            // Recurse into subdirectories before reserving this directory's own
            // file block: `walk_recursive` appends a directory's descendants'
            // hashes before its own files' hashes, so matching that order here
            // keeps `all_hash`'s byte layout identical across both algorithms.
            for entry in dirs {
                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name, &opts.ignore) {
                    continue;
                }
                let sub = discover_skeleton(&entry.path(), depth + 1, opts, arena, pending)?;
                tree.err_strings.extend(sub.err_strings.clone());
                tree.sub_trees.push(sub);
            }

            // Reserve a block sized to exactly the files that will be hashed —
            // not `files.len()` — so skipped, ignored, zero-size, and stat-failed
            // entries never leave a zeroed gap in the arena.
            let hashable_count = statted.iter().filter(|s| s.hashable).count();
            let reserved_offset = if hashable_count > 0 {
                Some(arena.lock().unwrap().reserve(hashable_count * 32))
            } else {
                None
            };

            let mut next_slot = 0i64;
            for s in statted {
                let mut file = File::new(s.full_path.clone(), s.size, s.last_modified);
                if s.hashable {
                    let offset = reserved_offset.expect("hashable_count > 0 implies a reservation") + next_slot * 32;
                    next_slot += 1;
                    file.hash = HashLocation {
                        kind: HashType::Sha256,
                        offset,
                        length: 32,
                    };
                    pending.push(PendingFile {
                        disk_path: s.disk_path,
                        full_path: s.full_path,
                        hash_offset: offset,
                        size: s.size,
                    });
                }
                tree.files.push(file);
            }
        }
        Err(e) => tree.err_strings.push(e.to_string()),
    }

    tree.time_taken = start.elapsed();
    tree.last_visited = SystemTime::now();
    Ok(tree)
}

fn hash_pending_files(
    pending: &[PendingFile],
    opts: &WalkOptions,
    stats: Option<&StatsSink>,
    arena: &Mutex<HashArena>,
) -> anyhow::Result<Vec<(String, String)>> {
    let (job_tx, job_rx) = crossbeam::channel::unbounded::<&PendingFile>();
    for p in pending {
        job_tx.send(p)?;
    }
    drop(job_tx);

    let num_workers = opts.num_workers.min(pending.len().max(1)).max(1);
    let failures: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..num_workers {
            let job_rx = job_rx.clone();
            let failures = &failures;
            scope.spawn(move || {
                while let Ok(p) = job_rx.recv() {
                    match hash_file_sha256(&p.disk_path) {
                        Ok(digest) => {
                            arena.lock().unwrap().write_at(p.hash_offset, &digest);
                            if let Some(s) = stats {
                                s.on_hash(&digest, p.size, &p.full_path);
                            }
                        }
                        Err(e) => {
                            failures
                                .lock()
                                .unwrap()
                                .push((p.full_path.clone(), format!("hash {}: {e}", p.full_path)));
                        }
                    }
                }
            });
        }
    });

    // Hashing failures degrade to `hash.offset = -1` per spec rather than aborting
    // the whole walk; the caller resets the affected `File`'s hash and records the
    // message in its owning directory's `err_strings` via `reset_failed_hashes`.
    let failures = failures.into_inner().unwrap();
    for (_, msg) in &failures {
        tracing::warn!("{msg}");
    }

    Ok(failures)
}

/// Clear `hash` back to [`HashLocation::none`] for every file whose full path
/// is in `failures`, record the failure message in the owning directory's
/// `err_strings`, and propagate it up through every ancestor, matching
/// `walk_recursive`'s in-line failure handling where a child's `err_strings`
/// is merged into its parent's as soon as the child returns.
fn reset_failed_hashes(tree: &mut FileTree, failures: &std::collections::HashMap<String, String>) -> Vec<String> {
    let mut below_errs = Vec::new();
    for sub in &mut tree.sub_trees {
        below_errs.extend(reset_failed_hashes(sub, failures));
    }

    for f in &mut tree.files {
        if let Some(msg) = failures.get(&f.name) {
            f.hash = HashLocation::none();
            below_errs.push(msg.clone());
        }
    }

    for msg in &below_errs {
        if !tree.err_strings.contains(msg) {
            tree.err_strings.push(msg.clone());
        }
    }

    below_errs
}

fn recompute_all_aggregates(tree: &mut FileTree) {
    for sub in &mut tree.sub_trees {
        recompute_all_aggregates(sub);
    }
    tree.recompute_aggregates();
}

// ----------------------------------------------------------------------------
// Parallel, per-directory job dispatch
// ----------------------------------------------------------------------------

/// Each worker independently reads a directory (stat + hash its files inline)
/// and pushes any subdirectories back onto the shared queue. Completed nodes
/// accumulate in a concurrent map keyed by path; a directory finalizes (gets
/// its `sub_trees` attached, in sorted order) once every child it spawned has
/// finalized, cascading up to the root. Well suited to shallow scans, where
/// `readdir`+`stat` dominates and per-file hashing is not the bottleneck.
pub fn walk_parallel_per_directory(
    root: &Path,
    opts: &WalkOptions,
    stats: Option<&StatsSink>,
) -> anyhow::Result<FileTree> {
    let root_base = root.to_string_lossy().to_string().slash_fix();
    let arena = Arc::new(Mutex::new(HashArena::new()));
    let nodes: Arc<DashMap<String, NodeState>> = Arc::new(DashMap::new());
    let (job_tx, job_rx) = crossbeam::channel::unbounded::<DirJob>();
    let outstanding = Arc::new(AtomicUsize::new(1));

    job_tx.send(DirJob {
        path: root.to_path_buf(),
        base_path: root_base.clone(),
        depth: 0,
        parent: None,
    })?;

    let num_workers = opts.num_workers.max(1);
    std::thread::scope(|scope| {
        for _ in 0..num_workers {
            let job_rx = job_rx.clone();
            let job_tx = job_tx.clone();
            let nodes = nodes.clone();
            let outstanding = outstanding.clone();
            let arena = arena.clone();

            scope.spawn(move || {
                while let Ok(job) = job_rx.recv_timeout(std::time::Duration::from_millis(100)) {
                    process_dir_job(job, opts, stats, &arena, &nodes, &job_tx, &outstanding);
                    if outstanding.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                }
            });
        }
    });

    drop(job_tx);

    let mut entry = nodes
        .remove(&root_base)
        .ok_or_else(|| anyhow_loc!("walker never finalized the root directory"))?;
    entry.1.tree.all_hash = Arc::try_unwrap(arena)
        .map_err(|_| anyhow_loc!("hash arena still shared after walk completed"))?
        .into_inner()
        .unwrap();
    Ok(entry.1.tree)
}

struct DirJob {
    path: std::path::PathBuf,
    base_path: String,
    depth: i64,
    parent: Option<ParentRef>,
}

#[derive(Clone)]
struct ParentRef {
    base_path: String,
    /// Number of direct subdirectories the parent is waiting on.
    expected_children: Arc<AtomicUsize>,
}

struct NodeState {
    tree: FileTree,
    children: Vec<FileTree>,
    expected_children: Arc<AtomicUsize>,
    received_children: AtomicUsize,
    parent: Option<ParentRef>,
}

#[allow(clippy::too_many_arguments)]
fn process_dir_job(
    job: DirJob,
    opts: &WalkOptions,
    stats: Option<&StatsSink>,
    arena: &Arc<Mutex<HashArena>>,
    nodes: &Arc<DashMap<String, NodeState>>,
    job_tx: &crossbeam::channel::Sender<DirJob>,
    outstanding: &Arc<AtomicUsize>,
) {
    let start = Instant::now();
    let mut tree = FileTree::empty(job.base_path.clone(), job.depth, opts.comprehensive);
    let mut child_dirs: Vec<(std::path::PathBuf, String)> = Vec::new();

    match read_sorted_dir(&job.path) {
        Ok((dirs, files)) => {
            for entry in files {
                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name, &opts.ignore) {
                    continue;
                }
                let full_path = path_util::join(&job.base_path, &name);
                let mut err_strings = Vec::new();
                let file = stat_and_maybe_hash(
                    &entry.path(),
                    full_path,
                    opts,
                    stats,
                    &mut arena.lock().unwrap(),
                    &mut err_strings,
                );
                tree.err_strings.extend(err_strings);
                tree.files.push(file);
            }

            for entry in dirs {
                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name, &opts.ignore) {
                    continue;
                }
                let full_path = path_util::join(&job.base_path, &name);
                child_dirs.push((entry.path(), full_path));
            }
        }
        Err(e) => tree.err_strings.push(e.to_string()),
    }

    tree.recompute_aggregates();
    tree.time_taken = start.elapsed();
    tree.last_visited = SystemTime::now();

    let expected_children = Arc::new(AtomicUsize::new(child_dirs.len()));
    nodes.insert(
        job.base_path.clone(),
        NodeState {
            tree,
            children: Vec::new(),
            expected_children: expected_children.clone(),
            received_children: AtomicUsize::new(0),
            parent: job.parent.clone(),
        },
    );

    if child_dirs.is_empty() {
        finalize(&job.base_path, nodes);
    } else {
        outstanding.fetch_add(child_dirs.len(), Ordering::SeqCst);
        for (disk_path, base_path) in child_dirs {
            let _ = job_tx.send(DirJob {
                path: disk_path,
                base_path,
                depth: job.depth + 1,
                parent: Some(ParentRef {
                    base_path: job.base_path.clone(),
                    expected_children: expected_children.clone(),
                }),
            });
        }
    }

    outstanding.fetch_sub(1, Ordering::SeqCst);
}

/// `base_path`'s node has just received all of its children (or had none to
/// begin with). Assemble it, hand the finished tree to its parent, and if that
/// was the parent's last outstanding child, recurse upward. The root has no
/// parent and simply stops here.
fn finalize(base_path: &str, nodes: &Arc<DashMap<String, NodeState>>) {
    let (finished_child, parent) = {
        let mut node = nodes.get_mut(base_path).expect("finalized node must exist");
        node.children.sort_by(|a, b| a.base_path.cmp(&b.base_path));
        node.tree.sub_trees = std::mem::take(&mut node.children);
        node.tree.recompute_aggregates();
        (node.tree.clone(), node.parent.clone())
    };

    let Some(parent) = parent else { return };

    let became_ready = {
        let mut parent_node = nodes
            .get_mut(&parent.base_path)
            .expect("parent node must exist before children finalize");
        parent_node.tree.merge_err_strings(&finished_child.err_strings);
        parent_node.children.push(finished_child);
        let received = parent_node.received_children.fetch_add(1, Ordering::SeqCst) + 1;
        received == parent.expected_children.load(Ordering::SeqCst)
    };

    if became_ready {
        finalize(&parent.base_path, nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Builds a small fixture with nested directories, a handful of files of
    /// varying sizes (including an empty one), so every walker's file/subtree
    /// sort order and arena layout gets exercised the same way.
    fn build_fixture(root: &Path) {
        fs::write(root.join("root_a.txt"), b"hello").unwrap();
        fs::write(root.join("root_b.txt"), b"worldworld").unwrap();
        fs::create_dir(root.join("sub1")).unwrap();
        fs::write(root.join("sub1").join("x.txt"), b"abc").unwrap();
        fs::write(root.join("sub1").join("y.txt"), b"").unwrap();
        fs::create_dir(root.join("sub2")).unwrap();
        fs::create_dir(root.join("sub2").join("nested")).unwrap();
        fs::write(root.join("sub2").join("nested").join("z.txt"), b"deep content").unwrap();
    }

    /// Zero out the wall-clock fields the determinism contract excludes
    /// (`last_visited`, `time_taken`) so structural equality can be checked
    /// with `==` across independent walks/algorithms.
    fn normalize_times(tree: &mut FileTree) {
        tree.last_visited = ZERO_TIME;
        tree.time_taken = std::time::Duration::ZERO;
        for sub in &mut tree.sub_trees {
            normalize_times(sub);
        }
    }

    #[test]
    fn recursive_walk_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        build_fixture(dir.path());
        let opts = WalkOptions {
            comprehensive: true,
            ..WalkOptions::default()
        };

        let mut a = walk_recursive(dir.path(), &opts, None);
        let mut b = walk_recursive(dir.path(), &opts, None);
        normalize_times(&mut a);
        normalize_times(&mut b);

        assert_eq!(a, b);
    }

    #[test]
    fn all_three_algorithms_agree_shallow() {
        let dir = tempfile::tempdir().unwrap();
        build_fixture(dir.path());
        let opts = WalkOptions::default();

        let mut recursive = walk_recursive(dir.path(), &opts, None);
        let mut per_file = walk_parallel_per_file(dir.path(), &opts, None).unwrap();
        let mut per_dir = walk_parallel_per_directory(dir.path(), &opts, None).unwrap();
        normalize_times(&mut recursive);
        normalize_times(&mut per_file);
        normalize_times(&mut per_dir);

        assert_eq!(recursive, per_file);
        assert_eq!(recursive, per_dir);
    }

    #[test]
    fn all_three_algorithms_agree_comprehensive() {
        let dir = tempfile::tempdir().unwrap();
        build_fixture(dir.path());
        let opts = WalkOptions {
            comprehensive: true,
            ..WalkOptions::default()
        };

        let mut recursive = walk_recursive(dir.path(), &opts, None);
        let mut per_file = walk_parallel_per_file(dir.path(), &opts, None).unwrap();
        let mut per_dir = walk_parallel_per_directory(dir.path(), &opts, None).unwrap();
        normalize_times(&mut recursive);
        normalize_times(&mut per_file);
        normalize_times(&mut per_dir);

        // Byte-identical hash arenas, not just equal trees, per §8's
        // determinism property for comprehensive scans.
        assert_eq!(recursive.all_hash, per_file.all_hash);
        assert_eq!(recursive.all_hash, per_dir.all_hash);
        assert_eq!(recursive, per_file);
        assert_eq!(recursive, per_dir);
    }

    #[test]
    fn reset_failed_hashes_propagates_error_to_every_ancestor() {
        // Three levels deep: root -> mid -> leaf, with the failing file at `leaf`.
        let mut leaf = FileTree::empty("/tmp/t/mid/leaf".into(), 2, true);
        leaf.files.push(File::new("/tmp/t/mid/leaf/bad".into(), 4, ZERO_TIME));
        leaf.recompute_aggregates();

        let mut mid = FileTree::empty("/tmp/t/mid".into(), 1, true);
        mid.sub_trees.push(leaf);
        mid.recompute_aggregates();

        let mut root = FileTree::empty("/tmp/t".into(), 0, true);
        root.sub_trees.push(mid);
        root.recompute_aggregates();

        let mut failures = std::collections::HashMap::new();
        failures.insert("/tmp/t/mid/leaf/bad".to_string(), "hash /tmp/t/mid/leaf/bad: permission denied".to_string());

        reset_failed_hashes(&mut root, &failures);

        assert!(!root.err_strings.is_empty(), "root must see the failure from two levels down");
        assert!(!root.sub_trees[0].err_strings.is_empty(), "mid must see the failure from one level down");
        assert!(!root.sub_trees[0].sub_trees[0].err_strings.is_empty(), "leaf must record its own failure");
        assert_eq!(root.sub_trees[0].sub_trees[0].files[0].hash, HashLocation::none());
    }

    #[cfg(unix)]
    #[test]
    fn discover_skeleton_merges_nested_read_errors_into_every_ancestor() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mid").join("leaf")).unwrap();
        fs::write(dir.path().join("mid").join("leaf").join("f.txt"), b"x").unwrap();

        let leaf = dir.path().join("mid").join("leaf");
        let mut perms = fs::metadata(&leaf).unwrap().permissions();
        perms.set_mode(0o000);
        fs::set_permissions(&leaf, perms.clone()).unwrap();

        // A root-equivalent test runner bypasses DAC permission checks, so the
        // chmod above wouldn't actually make `leaf` unreadable; skip rather
        // than assert on a precondition that didn't hold.
        if fs::read_dir(&leaf).is_ok() {
            perms.set_mode(0o755);
            fs::set_permissions(&leaf, perms).unwrap();
            return;
        }

        let opts = WalkOptions::default();
        let arena = Mutex::new(HashArena::new());
        let mut pending = Vec::new();
        let tree = discover_skeleton(dir.path(), 0, &opts, &arena, &mut pending).unwrap();

        perms.set_mode(0o755);
        fs::set_permissions(&leaf, perms).unwrap();

        assert!(!tree.err_strings.is_empty(), "root must see the unreadable leaf's error");
        let mid = &tree.sub_trees[0];
        assert!(!mid.err_strings.is_empty(), "mid must see its child leaf's error too");
    }
}
