//! Embedded ordered key/value store, concretely backed by `redb`.
//!
//! The conceptual store this engine wants is bolt-style: one `root`
//! container holding one nested container per member, each nested container
//! holding that member's `block.inode` and `block.<n>` entries. `redb`'s
//! tables don't nest, so this module provides the same shape on top of two
//! flat tables:
//!
//! - `MEMBERS`: one zero-byte entry per member path. This *is* `root`'s
//!   child listing — ascending iteration over this table is exactly
//!   [`crate::archive::Archive::find`]'s contract.
//! - `BLOCKS`: every block entry for every member, keyed by
//!   `<path>\0<block key>`. A member's nested container is the contiguous
//!   range `[path\0, path\0\u{ff}]` of this table.
//!
//! Everything above this module only ever talks in terms of "member
//! container" operations; the composite-key scheme is an implementation
//! detail private to this file.

use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

use crate::error::{Result, StorageError};

const MEMBERS: TableDefinition<&str, ()> = TableDefinition::new("members");
const BLOCKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks");

/// Separator between a member path and its block key inside a composite
/// `BLOCKS` key. `0x00` cannot appear in a path produced by [`crate::path`],
/// so this never collides with a real path byte.
const SEP: u8 = 0x00;

fn composite_key(member: &str, block_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(member.len() + 1 + block_key.len());
    key.extend_from_slice(member.as_bytes());
    key.push(SEP);
    key.extend_from_slice(block_key.as_bytes());
    key
}

/// Exclusive upper bound of the composite-key range for `member`: the
/// member's separator byte bumped to the next possible value, so the range
/// `[lower, upper)` covers exactly that member's blocks and nothing with it
/// as a strict path prefix (e.g. `/foo` vs. `/foobar`).
fn composite_range(member: &str) -> (Vec<u8>, Vec<u8>) {
    let mut lower = member.as_bytes().to_vec();
    lower.push(SEP);
    let mut upper = member.as_bytes().to_vec();
    upper.push(SEP + 1);
    (lower, upper)
}

/// A handle to the archive's backing store. Cheap to clone; all instances
/// share the same underlying `redb::Database`.
pub struct Store {
    db: Database,
}

impl Store {
    /// Create a brand new archive database at `path`, with `cache_size`
    /// bytes reserved for `redb`'s page cache. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>, cache_size: u64) -> Result<Store> {
        let db = Database::builder()
            .set_cache_size(cache_size as usize)
            .create(path)
            .map_err(StorageError::from)?;
        let store = Store { db };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Open an existing archive database at `path`. Fails if it does not exist.
    pub fn open(path: impl AsRef<Path>, cache_size: u64) -> Result<Store> {
        let db = Database::builder()
            .set_cache_size(cache_size as usize)
            .open(path)
            .map_err(StorageError::from)?;
        Ok(Store { db })
    }

    /// Make sure both tables exist, so reads against a freshly created
    /// archive never have to distinguish "table absent" from "table empty".
    fn ensure_tables(&self) -> Result<()> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let _ = txn.open_table(MEMBERS).map_err(StorageError::from)?;
            let _ = txn.open_table(BLOCKS).map_err(StorageError::from)?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Does a member with this exact path exist?
    pub fn member_exists(&self, member: &str) -> Result<bool> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = txn.open_table(MEMBERS).map_err(StorageError::from)?;
        Ok(table.get(member).map_err(StorageError::from)?.is_some())
    }

    /// Read every block of `member` in ascending byte-key order (`block.0`,
    /// `block.1`, ..., then `block.inode` last — ASCII digits sort before
    /// `i`), calling `visit` with each block's suffix key (e.g.
    /// `"block.inode"`, `"block.0"`) and stored bytes. Callers that need the
    /// inode decoded before the data blocks, or the data blocks in numeric
    /// rather than lexicographic order (`block.10` sorts before `block.2`),
    /// must not rely on this order directly; see
    /// [`crate::handle::load`] for the reassembly that does.
    ///
    /// Returns `Ok(false)` if the member does not exist.
    pub fn read_member(
        &self,
        member: &str,
        mut visit: impl FnMut(&str, &[u8]) -> Result<()>,
    ) -> Result<bool> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let members = txn.open_table(MEMBERS).map_err(StorageError::from)?;
        if members.get(member).map_err(StorageError::from)?.is_none() {
            return Ok(false);
        }

        let blocks = txn.open_table(BLOCKS).map_err(StorageError::from)?;
        let (lower, upper) = composite_range(member);
        let prefix_len = member.len() + 1;
        for entry in blocks
            .range(lower.as_slice()..upper.as_slice())
            .map_err(StorageError::from)?
        {
            let (key, value) = entry.map_err(StorageError::from)?;
            let key_bytes = key.value();
            let block_key = std::str::from_utf8(&key_bytes[prefix_len..])
                .map_err(|_| StorageError::Codec("non-utf8 block key".to_string()))?;
            visit(block_key, value.value())?;
        }
        Ok(true)
    }

    /// Atomically replace `member`'s inode and blocks: deletes any existing
    /// blocks for `member` first, so a write with fewer blocks than before
    /// never leaves stale trailing `block.<n>` keys, then writes the new
    /// inode and blocks, then records `member` in the listing. All of this
    /// happens in one write transaction.
    pub fn write_member(
        &self,
        member: &str,
        inode_bytes: &[u8],
        block_payloads: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<()> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut blocks = txn.open_table(BLOCKS).map_err(StorageError::from)?;
            delete_range(&mut blocks, member)?;

            let inode_key = composite_key(member, crate::block::INODE_KEY);
            blocks
                .insert(inode_key.as_slice(), inode_bytes)
                .map_err(StorageError::from)?;

            for (n, payload) in block_payloads.into_iter().enumerate() {
                let key = composite_key(member, &crate::block::block_key(n as u64));
                blocks
                    .insert(key.as_slice(), payload.as_slice())
                    .map_err(StorageError::from)?;
            }

            let mut members = txn.open_table(MEMBERS).map_err(StorageError::from)?;
            members.insert(member, ()).map_err(StorageError::from)?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Remove the exact member `path`, if present. No-op if absent.
    pub fn remove(&self, path: &str) -> Result<()> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut blocks = txn.open_table(BLOCKS).map_err(StorageError::from)?;
            delete_range(&mut blocks, path)?;
            let mut members = txn.open_table(MEMBERS).map_err(StorageError::from)?;
            members.remove(path).map_err(StorageError::from)?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Remove the member at `prefix` and every member whose key begins with
    /// `prefix + "/"`. Matches the exact boundary the store contract
    /// documents: `remove_all("foo")` must not remove `"foobar"`.
    pub fn remove_all(&self, prefix: &str) -> Result<()> {
        let slash_prefix = format!("{prefix}/");
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let matches: Vec<String> = {
                let members = txn.open_table(MEMBERS).map_err(StorageError::from)?;
                members
                    .iter()
                    .map_err(StorageError::from)?
                    .filter_map(|entry| entry.ok())
                    .map(|(k, _)| k.value().to_string())
                    .filter(|k| k == prefix || k.starts_with(&slash_prefix))
                    .collect()
            };

            let mut blocks = txn.open_table(BLOCKS).map_err(StorageError::from)?;
            let mut members = txn.open_table(MEMBERS).map_err(StorageError::from)?;
            for key in &matches {
                delete_range(&mut blocks, key)?;
                members.remove(key.as_str()).map_err(StorageError::from)?;
            }
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// List every member key for which `pred` returns `true`, in ascending
    /// lexicographic order.
    pub fn find(&self, mut pred: impl FnMut(&str) -> bool) -> Result<Vec<String>> {
        let txn = self.db.begin_read().map_err(StorageError::from)?;
        let members = txn.open_table(MEMBERS).map_err(StorageError::from)?;
        let mut out = Vec::new();
        for entry in members.iter().map_err(StorageError::from)? {
            let (key, _) = entry.map_err(StorageError::from)?;
            let name = key.value();
            if pred(name) {
                out.push(name.to_string());
            }
        }
        Ok(out)
    }
}

fn delete_range(blocks: &mut redb::Table<&[u8], &[u8]>, member: &str) -> Result<()> {
    let (lower, upper) = composite_range(member);
    let stale: Vec<Vec<u8>> = blocks
        .range(lower.as_slice()..upper.as_slice())
        .map_err(StorageError::from)?
        .filter_map(|entry| entry.ok())
        .map(|(k, _)| k.value().to_vec())
        .collect();
    for key in stale {
        blocks.remove(key.as_slice()).map_err(StorageError::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::create(dir.path().join("archive.raa"), 1 << 20).unwrap();
        (dir, store)
    }

    #[test]
    fn write_then_read_round_trips_blocks_in_order() {
        let (_dir, store) = store();
        store
            .write_member(
                "/foo",
                b"inode-bytes",
                vec![b"block-0".to_vec(), b"block-1".to_vec()],
            )
            .unwrap();

        let mut seen = Vec::new();
        let existed = store
            .read_member("/foo", |key, value| {
                seen.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();

        assert!(existed);
        // Ascending byte order: "block.0" < "block.1" < "block.inode" since
        // ASCII digits (0x30-0x39) sort before 'i' (0x69).
        assert_eq!(
            seen,
            vec![
                ("block.0".to_string(), b"block-0".to_vec()),
                ("block.1".to_string(), b"block-1".to_vec()),
                ("block.inode".to_string(), b"inode-bytes".to_vec()),
            ]
        );
    }

    #[test]
    fn overwrite_with_fewer_blocks_drops_stale_trailing_keys() {
        let (_dir, store) = store();
        store
            .write_member(
                "/foo",
                b"v1",
                vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
            )
            .unwrap();
        store.write_member("/foo", b"v2", vec![b"x".to_vec()]).unwrap();

        let mut seen = Vec::new();
        store
            .read_member("/foo", |key, value| {
                seen.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("block.0".to_string(), b"x".to_vec()),
                ("block.inode".to_string(), b"v2".to_vec()),
            ]
        );
    }

    #[test]
    fn remove_all_respects_prefix_boundary() {
        // S6: "foo", "foobar", "foo/bar" all created; remove_all("foo") must
        // remove only "foo" and "foo/bar", never "foobar".
        let (_dir, store) = store();
        for name in ["/foo", "/foobar", "/foo/bar"] {
            store.write_member(name, b"i", vec![b"foo".to_vec()]).unwrap();
        }

        store.remove_all("/foo").unwrap();

        assert!(!store.member_exists("/foo").unwrap());
        assert!(store.member_exists("/foobar").unwrap());
        assert!(!store.member_exists("/foo/bar").unwrap());
    }

    #[test]
    fn find_returns_ascending_matches() {
        let (_dir, store) = store();
        for name in ["/b", "/a", "/c"] {
            store.write_member(name, b"i", vec![]).unwrap();
        }
        let names = store.find(|_| true).unwrap();
        assert_eq!(names, vec!["/a", "/b", "/c"]);
    }
}
