//! Open-mode state machine, in-memory buffer and flush-on-close for one
//! open member.
//!
//! A handle is created by [`crate::Archive::open_file`] and friends; it is
//! single-threaded, and all of its observable side effects on the archive
//! happen at flush time (on `close`, or immediately after every write if
//! opened with `SYNC`). Prior to that, the buffer is purely in-memory.

use std::path::Path as RelPath;
use std::sync::{Arc, Mutex};

use bit_field::BitField;

use crate::block;
use crate::error::{Error, Result};
use crate::flags::OpenFlags;
use crate::inode::Inode;
use crate::kv::Store;

/// A `FileInfo`-like view over a member's inode, returned by
/// [`File::stat`] and [`crate::Archive::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    inode: Inode,
}

impl FileInfo {
    pub(crate) fn new(name: impl Into<String>, inode: Inode) -> FileInfo {
        FileInfo {
            name: name.into(),
            inode,
        }
    }

    /// Base name of the member (the last path component).
    pub fn name(&self) -> &str {
        RelPath::new(&self.name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("/")
    }

    /// Total payload size, in bytes.
    pub fn size(&self) -> i64 {
        self.inode.size
    }

    /// File-mode bits (POSIX permission bits in the low 12 bits).
    pub fn mode(&self) -> u32 {
        self.inode.mode
    }

    /// Just the POSIX permission bits (`rwxrwxrwx`, the low 12 bits of `mode`),
    /// with any higher file-type bits masked off.
    pub fn permissions(&self) -> u32 {
        self.inode.mode.get_bits(0..12)
    }

    /// Last modification time, unix seconds.
    pub fn modified_at(&self) -> i64 {
        self.inode.modified_at
    }

    /// Always `false`: members are never directories.
    pub fn is_dir(&self) -> bool {
        false
    }

    /// The underlying inode, for callers that want the raw metadata.
    pub fn sys(&self) -> &Inode {
        &self.inode
    }
}

/// An open member: an in-memory buffer plus the inode that will be
/// persisted when the handle flushes.
pub struct File {
    name: String,
    inode: Inode,
    buf: Vec<u8>,
    read_pos: usize,
    store: Arc<Mutex<Store>>,

    is_closed: bool,
    is_readable: bool,
    is_writable: bool,
    is_sync: bool,
}

impl File {
    pub(crate) fn new_empty(name: String, mode: u32, flags: OpenFlags, store: Arc<Mutex<Store>>) -> File {
        let now = now_unix();
        File {
            name,
            inode: Inode {
                id: 0,
                block_size: crate::inode::DEFAULT_BLOCK_SIZE,
                mode,
                uid: 0,
                gid: 0,
                size: 0,
                modified_at: now,
                created_at: now,
            },
            buf: Vec::new(),
            read_pos: 0,
            store,
            is_closed: false,
            is_readable: flags.is_readable(),
            is_writable: flags.is_writable(),
            is_sync: flags.is_sync(),
        }
    }

    pub(crate) fn new_loaded(
        name: String,
        inode: Inode,
        buf: Vec<u8>,
        flags: OpenFlags,
        store: Arc<Mutex<Store>>,
    ) -> File {
        File {
            name,
            inode,
            buf,
            read_pos: 0,
            store,
            is_closed: false,
            is_readable: flags.is_readable(),
            is_writable: flags.is_writable(),
            is_sync: flags.is_sync(),
        }
    }

    /// The absolute resolved key this handle was opened against.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read up to `buf.len()` bytes from the unread portion of the file into `buf`.
    /// Returns the number of bytes read; `0` means end-of-input.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.is_closed {
            return Err(Error::ClosedFile);
        }
        if !self.is_readable {
            return Err(Error::NonReadable);
        }

        let remaining = &self.buf[self.read_pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }

    /// The full unread portion of the file's buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.read_pos..]
    }

    /// Append `data` to the file, advancing `inode.size`. Flushes
    /// immediately if the handle was opened with `SYNC`.
    ///
    /// Always writes the entire slice: `Vec::extend_from_slice` cannot
    /// refuse bytes, so this in-memory buffer can never produce
    /// [`Error::ShortWrite`] — that variant exists for the error taxonomy's
    /// completeness, not because this implementation raises it.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.is_closed {
            return Err(Error::ClosedFile);
        }
        if !self.is_writable {
            return Err(Error::NonWritable);
        }

        self.buf.extend_from_slice(data);
        self.inode.size += data.len() as i64;
        let written = data.len();

        if self.is_sync {
            self.flush()?;
        }

        Ok(written)
    }

    /// Shrink or grow (zero-filled) the buffer to exactly `size` bytes, and
    /// update `inode.size` to match.
    pub fn truncate(&mut self, size: u64) {
        self.buf.resize(size as usize, 0);
        self.read_pos = self.read_pos.min(self.buf.len());
        self.inode.size = size as i64;
    }

    /// Change the mode bits. Only takes effect once the handle is flushed.
    pub fn chmod(&mut self, mode: u32) {
        self.inode.mode = mode;
    }

    /// Change the numeric owner. Only takes effect once the handle is flushed.
    pub fn chown(&mut self, uid: u64, gid: u64) {
        self.inode.uid = uid;
        self.inode.gid = gid;
    }

    /// Override the block size this handle's payload will be striped into
    /// on flush. A freshly created handle otherwise inherits
    /// [`crate::inode::DEFAULT_BLOCK_SIZE`]; a loaded handle inherits
    /// whatever size was stored. Rewriting a loaded file preserves the
    /// stored block size unless this is called explicitly.
    pub fn set_block_size(&mut self, block_size: i32) {
        self.inode.block_size = block_size;
    }

    /// Unconditional `NotDirectory`: members are never directories, so a
    /// handle can never be `chdir`'d into.
    pub fn chdir(&self) -> Result<()> {
        Err(Error::NotDirectory(self.name.clone()))
    }

    /// A [`FileInfo`] view over this handle's current (possibly unflushed) inode.
    pub fn stat(&self) -> FileInfo {
        FileInfo::new(self.name.clone(), self.inode)
    }

    /// Persist the handle's inode and buffer to the store: this is the
    /// write path of [`crate::archive`]'s component design — chunk the
    /// buffer by `inode.block_size`, compress each chunk, and replace the
    /// member's stored blocks in one write transaction.
    pub fn flush(&mut self) -> Result<()> {
        self.inode.modified_at = now_unix();

        let block_size = if self.inode.block_size > 0 {
            self.inode.block_size as usize
        } else {
            crate::inode::DEFAULT_BLOCK_SIZE as usize
        };

        let encoded_blocks: Vec<Vec<u8>> = block::chunks(&self.buf, block_size)
            .into_iter()
            .map(block::encode)
            .collect();

        let inode_bytes = self.inode.encode();
        let store = self.store.lock().expect("archive store mutex poisoned");
        store.write_member(&self.name, &inode_bytes, encoded_blocks)?;
        Ok(())
    }

    /// Close the handle. Flushes first; double-close is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }
        self.is_closed = true;
        self.flush()
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if !self.is_closed {
            // Best-effort: a handle dropped without an explicit close() still
            // flushes, mirroring the teacher's `Device` flushing on drop.
            let _ = self.flush();
        }
    }
}

/// Load a member's inode and buffer from the store, concatenating its
/// blocks in key order. Returns `Ok(None)` if the member does not exist.
pub(crate) fn load(store: &Store, name: &str) -> Result<Option<(Inode, Vec<u8>)>> {
    let mut inode: Option<Inode> = None;
    let mut numbered_blocks: Vec<(u64, Vec<u8>)> = Vec::new();

    let existed = store.read_member(name, |key, value| {
        if key == block::INODE_KEY {
            inode = Some(Inode::decode(value)?);
        } else {
            let n: u64 = key
                .strip_prefix("block.")
                .and_then(|ordinal| ordinal.parse().ok())
                .ok_or(Error::CorruptInode("non-numeric block key"))?;
            numbered_blocks.push((n, block::decode(value)?));
        }
        Ok(())
    })?;

    if !existed {
        return Ok(None);
    }

    let inode = inode.ok_or(Error::CorruptInode("member has no inode entry"))?;
    numbered_blocks.sort_by_key(|(n, _)| *n);

    let mut buf = Vec::with_capacity(inode.size.max(0) as usize);
    for (_, payload) in numbered_blocks {
        buf.extend_from_slice(&payload);
    }

    if buf.len() as i64 != inode.size {
        return Err(Error::UnableToRead {
            expected: inode.size.max(0) as u64,
            actual: buf.len() as u64,
        });
    }

    Ok(Some((inode, buf)))
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, Arc<Mutex<Store>>) {
        let dir = tempdir().unwrap();
        let store = Store::create(dir.path().join("archive.raa"), 1 << 20).unwrap();
        (dir, Arc::new(Mutex::new(store)))
    }

    #[test]
    fn write_then_flush_then_reload_round_trips_content() {
        let (_dir, store) = store();
        let mut file = File::new_empty("/a".to_string(), 0o644, OpenFlags::READ_WRITE, store.clone());
        file.write(b"some payload").unwrap();
        file.close().unwrap();

        let guard = store.lock().unwrap();
        let (inode, buf) = load(&guard, "/a").unwrap().unwrap();
        assert_eq!(buf, b"some payload");
        assert_eq!(inode.size, 12);
    }

    #[test]
    fn read_only_handle_rejects_write() {
        let (_dir, store) = store();
        let mut file = File::new_empty("/a".to_string(), 0o644, OpenFlags::RDONLY, store);
        assert!(matches!(file.write(b"x"), Err(Error::NonWritable)));
    }

    #[test]
    fn write_only_handle_rejects_read() {
        let (_dir, store) = store();
        let mut file = File::new_empty("/a".to_string(), 0o644, OpenFlags::WRITE_ONLY, store);
        let mut buf = [0u8; 4];
        assert!(matches!(file.read(&mut buf), Err(Error::NonReadable)));
    }

    #[test]
    fn closed_handle_rejects_further_io() {
        let (_dir, store) = store();
        let mut file = File::new_empty("/a".to_string(), 0o644, OpenFlags::READ_WRITE, store);
        file.close().unwrap();
        assert!(matches!(file.write(b"x"), Err(Error::ClosedFile)));
        assert!(matches!(file.read(&mut [0u8; 1]), Err(Error::ClosedFile)));
    }

    #[test]
    fn double_close_is_a_no_op() {
        let (_dir, store) = store();
        let mut file = File::new_empty("/a".to_string(), 0o644, OpenFlags::READ_WRITE, store);
        file.close().unwrap();
        file.close().unwrap();
    }

    #[test]
    fn truncate_shrinks_and_zero_fills() {
        let (_dir, store) = store();
        let mut file = File::new_empty("/a".to_string(), 0o644, OpenFlags::READ_WRITE, store);
        file.write(b"0123456789").unwrap();
        file.truncate(4);
        assert_eq!(file.stat().size(), 4);
        file.truncate(6);
        assert_eq!(file.bytes(), &[b'0', b'1', b'2', b'3', 0, 0]);
    }

    #[test]
    fn chdir_on_a_handle_is_always_not_a_directory() {
        let (_dir, store) = store();
        let file = File::new_empty("/a".to_string(), 0o644, OpenFlags::READ_WRITE, store);
        assert!(matches!(file.chdir(), Err(Error::NotDirectory(_))));
    }

    #[test]
    fn permissions_masks_off_high_bits() {
        let (_dir, store) = store();
        let file = File::new_empty("/a".to_string(), 0o100644, OpenFlags::READ_WRITE, store);
        assert_eq!(file.stat().permissions(), 0o644);
    }
}
