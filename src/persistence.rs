//! Reads and writes [`FileTree`]s and [`ScanDiff`]s to disk as self-describing
//! JSON documents, matching the original system's choice of a schema-evolvable
//! text encoding over a positional binary one (see its own comment weighing
//! `encoding/gob` against `encoding/json`, which settled on JSON for exactly
//! this crate's reasons: ease of inspection and forward compatibility matter
//! more here than a few bytes per record).

use anyhow::Context;
use std::path::Path;

use crate::differ::ScanDiff;
use crate::tree::FileTree;

pub fn write_tree(path: impl AsRef<Path>, tree: &FileTree) -> anyhow::Result<()> {
    let path = path.as_ref();
    let text = serde_json::to_string(tree).with_context(|| format!("serializing tree for {}", path.display()))?;
    std::fs::write(path, text).with_context(|| format!("writing tree {}", path.display()))?;
    Ok(())
}

pub fn read_tree(path: impl AsRef<Path>) -> anyhow::Result<FileTree> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading tree {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing tree {}", path.display()))
}

pub fn write_diff(path: impl AsRef<Path>, diff: &ScanDiff) -> anyhow::Result<()> {
    let path = path.as_ref();
    let text = serde_json::to_string(diff).with_context(|| format!("serializing diff for {}", path.display()))?;
    std::fs::write(path, text).with_context(|| format!("writing diff {}", path.display()))?;
    Ok(())
}

pub fn read_diff(path: impl AsRef<Path>) -> anyhow::Result<ScanDiff> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading diff {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing diff {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::diff;
    use crate::tree::{File, ZERO_TIME};

    #[test]
    fn tree_round_trips_through_json() {
        let mut t = FileTree::empty("/tmp/t".into(), 0, true);
        t.files.push(File::new("/tmp/t/a".into(), 4, ZERO_TIME));
        t.recompute_aggregates();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tree");
        write_tree(&path, &t).unwrap();
        let back = read_tree(&path).unwrap();

        assert_eq!(back.base_path, t.base_path);
        assert_eq!(back.files.len(), t.files.len());
        assert_eq!(back.size_direct, t.size_direct);
    }

    #[test]
    fn diff_round_trips_through_json() {
        let old = FileTree::empty("/tmp/t".into(), 0, false);
        let mut new = old.clone();
        new.files.push(File::new("/tmp/t/a".into(), 4, ZERO_TIME));
        new.recompute_aggregates();
        let d = diff(&old, &new);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.diff");
        write_diff(&path, &d).unwrap();
        let back = read_diff(&path).unwrap();
        assert_eq!(back.files.len(), d.files.len());
    }
}
