//! Hash arena: a contiguous byte store for file content digests.
//!
//! Every [`FileTree`](crate::tree::FileTree) root (and every [`ScanDiff`](crate::differ::ScanDiff))
//! owns exactly one [`HashArena`]. Individual files never own their hash bytes directly;
//! they hold a [`HashLocation`] that indexes into the arena. This keeps serialized trees
//! compact and lets a parallel walker reserve a contiguous block of the arena for a
//! directory's children before any file has actually been hashed, so worker threads can
//! write their digests into disjoint slots without taking a lock per file.

use serde::{Deserialize, Serialize};

/// SHA-256 produces 32-byte digests.
pub const SHA256_LEN: i64 = 32;

/// The `offset` sentinel meaning "no hash was recorded for this entry".
pub const NO_HASH_OFFSET: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashType {
    None,
    Sha256,
}

/// A handle into a [`HashArena`]. `offset == -1` means "no hash"; in that case
/// `kind` and `length` are meaningless and should not be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLocation {
    pub kind: HashType,
    pub offset: i64,
    pub length: i64,
}

impl HashLocation {
    pub const fn none() -> Self {
        HashLocation {
            kind: HashType::None,
            offset: NO_HASH_OFFSET,
            length: 0,
        }
    }

    pub fn is_present(&self) -> bool {
        self.offset >= 0
    }
}

impl Default for HashLocation {
    fn default() -> Self {
        Self::none()
    }
}

/// Append-only byte buffer shared by every node of a tree (or diff).
///
/// `reserve` is the only operation that needs exclusive access to the arena's length;
/// the bytes within a reserved block are written without further synchronization because
/// reservations never overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HashArena {
    bytes: Vec<u8>,
}

impl HashArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Grow the arena by `len` zero bytes and return the offset of the new block.
    pub fn reserve(&mut self, len: usize) -> i64 {
        let offset = self.bytes.len();
        self.bytes.resize(offset + len, 0);
        offset as i64
    }

    /// Append `data` as a brand new block and return a location for it.
    pub fn append(&mut self, kind: HashType, data: &[u8]) -> HashLocation {
        let offset = self.bytes.len() as i64;
        self.bytes.extend_from_slice(data);
        HashLocation {
            kind,
            offset,
            length: data.len() as i64,
        }
    }

    /// Write `data` into a block previously returned by [`reserve`](Self::reserve).
    pub fn write_at(&mut self, offset: i64, data: &[u8]) {
        let start = offset as usize;
        let end = start + data.len();
        self.bytes[start..end].copy_from_slice(data);
    }

    pub fn slice(&self, loc: &HashLocation) -> Option<&[u8]> {
        if !loc.is_present() {
            return None;
        }
        let start = loc.offset as usize;
        let end = start + loc.length as usize;
        self.bytes.get(start..end)
    }

    /// Copy the bytes referenced by `loc` (in `self`) into `dest`, returning a fresh
    /// location valid in `dest`. Used by the applier to move hashes between arenas.
    pub fn copy_into(&self, loc: &HashLocation, dest: &mut HashArena) -> HashLocation {
        if !loc.is_present() {
            return HashLocation::none();
        }
        match self.slice(loc) {
            Some(bytes) => dest.append(loc.kind, bytes),
            None => HashLocation::none(),
        }
    }
}

/// True iff `a` (indexing `arena_a`) and `b` (indexing `arena_b`) refer to equal hashes.
/// Two absent hashes are equal; an absent hash is never equal to a present one.
pub fn hashes_equal(a: &HashLocation, arena_a: &HashArena, b: &HashLocation, arena_b: &HashArena) -> bool {
    match (a.is_present(), b.is_present()) {
        (false, false) => true,
        (true, true) => a.kind == b.kind && arena_a.slice(a) == arena_b.slice(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_write_round_trips() {
        let mut arena = HashArena::new();
        let off = arena.reserve(4);
        arena.write_at(off, &[1, 2, 3, 4]);
        let loc = HashLocation {
            kind: HashType::Sha256,
            offset: off,
            length: 4,
        };
        assert_eq!(arena.slice(&loc), Some(&[1, 2, 3, 4][..]));
    }

    #[test]
    fn absent_hashes_are_equal() {
        let a = HashArena::new();
        let b = HashArena::new();
        assert!(hashes_equal(&HashLocation::none(), &a, &HashLocation::none(), &b));
    }

    #[test]
    fn absent_vs_present_are_not_equal() {
        let a = HashArena::new();
        let mut b = HashArena::new();
        let loc = b.append(HashType::Sha256, &[0u8; 32]);
        assert!(!hashes_equal(&HashLocation::none(), &a, &loc, &b));
    }

    #[test]
    fn copy_into_produces_independent_location() {
        let mut src = HashArena::new();
        let loc = src.append(HashType::Sha256, b"abcd");
        let mut dest = HashArena::new();
        dest.append(HashType::Sha256, b"padding");
        let moved = src.copy_into(&loc, &mut dest);
        assert_eq!(dest.slice(&moved), Some(&b"abcd"[..]));
    }
}
