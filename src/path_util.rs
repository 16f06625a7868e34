//! Path helpers shared by the walker, records index, and persistence layer.

use crate::util::SlashFix;
use xxhash_rust::xxh3::xxh3_128;

/// Join a base directory and an entry name into an absolute-style path string,
/// always using `/` regardless of platform (matches the walker's `File::name`
/// and `FileTree::base_path` convention of storing forward-slash paths).
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        return name.to_string().slash_fix();
    }
    let base = base.to_string().slash_fix();
    if base.ends_with('/') {
        format!("{base}{name}").slash_fix()
    } else {
        format!("{base}/{name}").slash_fix()
    }
}

/// Basename of a `/`-joined path. Returns the whole string if there is no `/`.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent directory of a `/`-joined path, or "" if there is none.
pub fn dir_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Fast, non-cryptographic, filesystem-safe identifier for a path, used to name
/// persisted scan/diff files. Collisions are not a correctness concern here: the
/// records index is keyed on the literal path string, this hash only picks a
/// stable filename for it.
pub fn hash_path_for_filename(path: &str) -> String {
    format!("{:032x}", xxh3_128(path.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_trailing_slash() {
        assert_eq!(join("/tmp/t", "a"), "/tmp/t/a");
        assert_eq!(join("/tmp/t/", "a"), "/tmp/t/a");
        assert_eq!(join("", "a"), "a");
    }

    #[test]
    fn base_and_dir_name() {
        assert_eq!(base_name("/tmp/t/a"), "a");
        assert_eq!(dir_name("/tmp/t/a"), "/tmp/t");
        assert_eq!(dir_name("a"), "");
    }

    #[test]
    fn hash_path_is_stable_and_hex() {
        let h1 = hash_path_for_filename("/tmp/t");
        let h2 = hash_path_for_filename("/tmp/t");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 32);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
