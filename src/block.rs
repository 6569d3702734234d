//! Compress/decompress a single block, and name blocks within a member.
//!
//! The codec itself is a build-time constant of the crate: raw DEFLATE via
//! `miniz_oxide`. Mixing codecs within one archive is not supported — an
//! archive written by one version of this crate must be read back by a
//! version using the same codec.

use miniz_oxide::deflate::compress_to_vec;
use miniz_oxide::inflate::decompress_to_vec;

use crate::error::{Error, StorageError};

/// Reserved block key holding the member's [`crate::inode::Inode`] record.
/// Never mistaken for a numeric block ordinal since the namespace of data
/// blocks (`block.0`, `block.1`, ...) is numeric and this key is not.
pub const INODE_KEY: &str = "block.inode";

/// Compress a raw block payload for storage.
pub fn encode(raw: &[u8]) -> Vec<u8> {
    // Compression level 6 is miniz_oxide's usual balance of ratio vs. speed;
    // blocks are decompressed far more often than they're written.
    compress_to_vec(raw, 6)
}

/// Decompress a stored block back into its raw payload.
pub fn decode(compressed: &[u8]) -> crate::error::Result<Vec<u8>> {
    decompress_to_vec(compressed)
        .map_err(|e| Error::Io(StorageError::Codec(format!("failed to inflate block: {e:?}"))))
}

/// Render the key for block ordinal `n` within a member, e.g. `block.3`.
pub fn block_key(n: u64) -> String {
    format!("block.{n}")
}

/// Split `payload` into chunks of `block_size` bytes, the last chunk possibly
/// short. A zero-length payload yields a single empty chunk iff `keep_empty`
/// is set by the caller (the store decides whether a zero-byte file gets a
/// lone empty block or no blocks at all; see [`crate::store`]).
pub fn chunks(payload: &[u8], block_size: usize) -> Vec<&[u8]> {
    if payload.is_empty() {
        return Vec::new();
    }
    payload.chunks(block_size.max(1)).collect()
}
