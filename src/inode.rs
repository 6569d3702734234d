//! Fixed-layout, little-endian, length-tagged metadata record for one archive member.
//!
//! The layout is deliberately not derived through a generic serialization
//! framework: it carries its own signature, header length and version so
//! that a reader written against an older version of this crate can still
//! skip unknown trailing fields (see [`Inode::decode`]).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::error::Error;

/// Magic bytes every inode record starts with.
const SIGNATURE: [u8; 3] = *b"RAA";

/// Number of header bytes following the signature and the header-length field
/// itself, for the fields this version of the format knows about.
const KNOWN_HEADER_LEN: i32 = 60;

/// Format version written by this crate.
const VERSION: i32 = 1;

/// Default block size new members are striped into: 10 MiB.
pub const DEFAULT_BLOCK_SIZE: i32 = 10 * 1024 * 1024;

/// Per-member metadata: identity, permissions, ownership, size and timestamps.
///
/// Invariants (enforced by the store, not by this type): `size` equals the
/// sum of the decoded lengths of `block.0..block.K-1`, and
/// `K == ceil(size / block_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    /// Opaque identifier for this member. Not currently used for lookup
    /// (members are looked up by path), but persisted for forward
    /// compatibility with schemes that want a stable id independent of path.
    pub id: u64,
    /// Size, in bytes, of each block this member is striped into.
    pub block_size: i32,
    /// File-mode bits; the low 12 bits carry POSIX permission bits.
    pub mode: u32,
    /// Numeric user id that owns this member.
    pub uid: u64,
    /// Numeric group id that owns this member.
    pub gid: u64,
    /// Total payload size, in bytes.
    pub size: i64,
    /// Last modification time, unix seconds.
    pub modified_at: i64,
    /// Creation time, unix seconds.
    pub created_at: i64,
}

impl Inode {
    /// Number of data blocks a member with this inode's `size` and
    /// `block_size` should have: `K = ceil(size / block_size)`, with `K = 0`
    /// iff `size == 0`.
    pub fn block_count(&self) -> u64 {
        if self.size <= 0 || self.block_size <= 0 {
            return 0;
        }
        let size = self.size as u64;
        let block_size = self.block_size as u64;
        (size + block_size - 1) / block_size
    }

    /// Serialize this inode into the fixed on-disk layout described in the
    /// module documentation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + 4 + KNOWN_HEADER_LEN as usize);
        buf.extend_from_slice(&SIGNATURE);
        // Unwraps below only fail on I/O errors, which a `Vec<u8>` writer never produces.
        buf.write_i32::<LittleEndian>(KNOWN_HEADER_LEN).unwrap();
        buf.write_i32::<LittleEndian>(VERSION).unwrap();
        buf.write_u64::<LittleEndian>(self.id).unwrap();
        buf.write_i32::<LittleEndian>(self.block_size).unwrap();
        buf.write_u32::<LittleEndian>(self.mode).unwrap();
        buf.write_u64::<LittleEndian>(self.uid).unwrap();
        buf.write_u64::<LittleEndian>(self.gid).unwrap();
        buf.write_i64::<LittleEndian>(self.size).unwrap();
        buf.write_i64::<LittleEndian>(self.modified_at).unwrap();
        buf.write_i64::<LittleEndian>(self.created_at).unwrap();
        buf
    }

    /// Decode an inode from its on-disk layout.
    ///
    /// Fails with [`Error::CorruptInode`] on a signature mismatch, a short
    /// read before all known fields are present, or a negative header
    /// length. A header length greater than [`KNOWN_HEADER_LEN`] is
    /// tolerated: the extra bytes are consumed and discarded, so readers
    /// built against this version can still open archives written by a
    /// future version that appends fields.
    pub fn decode(data: &[u8]) -> Result<Inode, Error> {
        let mut c = Cursor::new(data);

        let mut sig = [0u8; 3];
        c.read_exact(&mut sig)
            .map_err(|_| Error::CorruptInode("truncated before signature"))?;
        if sig != SIGNATURE {
            return Err(Error::CorruptInode("signature mismatch"));
        }

        let header_len = c
            .read_i32::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated header length"))?;
        if header_len < KNOWN_HEADER_LEN {
            return Err(Error::CorruptInode("header length too short"));
        }

        let _version = c
            .read_i32::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated version"))?;
        let id = c
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated id"))?;
        let block_size = c
            .read_i32::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated block size"))?;
        let mode = c
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated mode"))?;
        let uid = c
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated uid"))?;
        let gid = c
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated gid"))?;
        let size = c
            .read_i64::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated size"))?;
        let modified_at = c
            .read_i64::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated modified_at"))?;
        let created_at = c
            .read_i64::<LittleEndian>()
            .map_err(|_| Error::CorruptInode("truncated created_at"))?;

        // Forward compatibility: skip any header bytes this version doesn't know about.
        let extra = (header_len - KNOWN_HEADER_LEN) as u64;
        if extra > 0 {
            let mut sink = std::io::sink();
            std::io::copy(&mut c.by_ref().take(extra), &mut sink)
                .map_err(|_| Error::CorruptInode("truncated forward-compatible tail"))?;
        }

        Ok(Inode {
            id,
            block_size,
            mode,
            uid,
            gid,
            size,
            modified_at,
            created_at,
        })
    }
}
