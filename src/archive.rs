//! Public entry point: the archive as a whole, tying the path resolver, the
//! backing key/value store and file handles together.
//!
//! An `Archive` is cheap to clone (it's a thin handle around `Arc`-shared
//! state) and is meant to be held for the lifetime of the process that owns
//! the archive file, the same way the teacher's `Device` wraps one open
//! `mmap` for the controller's lifetime.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument, warn};

use crate::error::{Error, PathError, PathResult};
use crate::flags::OpenFlags;
use crate::handle::{self, File, FileInfo};
use crate::inode::Inode;
use crate::kv::Store;
use crate::path::PathResolver;

/// Default permission bits for members created via the [`Archive::create_file`] shorthand.
const DEFAULT_FILE_MODE: u32 = 0o666;

/// Tunable knobs for opening or creating an archive, the way the teacher's
/// `Device::create_device` took explicit `block_size`/`nblocks` parameters
/// rather than hiding them behind a config file or environment variables —
/// there is no runtime configuration surface beyond these two.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveOptions {
    /// Block size new members are striped into, absent a size inherited from
    /// a loaded inode. Defaults to [`crate::inode::DEFAULT_BLOCK_SIZE`].
    pub default_block_size: i32,
    /// Minimum bytes `redb` reserves for its page cache. `redb` ignores
    /// values below its own floor; this only matters for very small archives
    /// where a generous cache would otherwise be wasted.
    pub min_page_cache_size: u64,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        ArchiveOptions {
            default_block_size: crate::inode::DEFAULT_BLOCK_SIZE,
            min_page_cache_size: 1024 * 1024,
        }
    }
}

/// A single-file random-access archive.
///
/// All mutating operations are serialized behind one mutex around the
/// backing store; this is deliberately coarser-grained than `redb`'s own
/// internal transaction locking, so that the serialization point is visible
/// in this crate's own code rather than implicit in `redb`'s behavior.
pub struct Archive {
    location: PathBuf,
    store: Arc<Mutex<Store>>,
    resolver: Mutex<PathResolver>,
}

impl Archive {
    /// Create a brand new archive at `path` with default options. Fails with
    /// [`Error::AlreadyExists`] if a file already exists there.
    pub fn create(path: impl AsRef<Path>) -> PathResult<Archive> {
        Archive::create_with_options(path, ArchiveOptions::default())
    }

    /// Create a brand new archive at `path`, with explicit [`ArchiveOptions`].
    #[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn create_with_options(path: impl AsRef<Path>, options: ArchiveOptions) -> PathResult<Archive> {
        let path = path.as_ref();
        if path.exists() {
            return Err(PathError::new(
                "create",
                path.display().to_string(),
                Error::AlreadyExists(path.display().to_string()),
            ));
        }
        let store = Store::create(path, options.min_page_cache_size)
            .map_err(|e| PathError::new("create", path.display().to_string(), e))?;
        debug!("created new archive");
        Ok(Archive {
            location: path.to_path_buf(),
            store: Arc::new(Mutex::new(store)),
            resolver: Mutex::new(PathResolver::new()),
        })
    }

    /// Open an existing archive at `path` with default options. Fails with
    /// [`Error::NotFound`] if no archive exists there.
    pub fn open(path: impl AsRef<Path>) -> PathResult<Archive> {
        Archive::open_with_options(path, ArchiveOptions::default())
    }

    /// Open an existing archive at `path`, with explicit [`ArchiveOptions`].
    #[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn open_with_options(path: impl AsRef<Path>, options: ArchiveOptions) -> PathResult<Archive> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PathError::new(
                "open",
                path.display().to_string(),
                Error::NotFound(path.display().to_string()),
            ));
        }
        let store = Store::open(path, options.min_page_cache_size)
            .map_err(|e| PathError::new("open", path.display().to_string(), e))?;
        debug!("opened existing archive");
        Ok(Archive {
            location: path.to_path_buf(),
            store: Arc::new(Mutex::new(store)),
            resolver: Mutex::new(PathResolver::new()),
        })
    }

    /// The host filesystem path this archive's backing file lives at.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Close the archive, releasing this handle on the backing store.
    ///
    /// Consuming `self` gives the store's `Drop` (which `redb` already runs
    /// to flush and unmap the backing file) a named, explicit call site
    /// instead of leaving it implicit — matching the `close()` operation of
    /// the component design rather than relying solely on scope exit.
    /// Outstanding [`File`] handles opened against this archive each hold
    /// their own reference to the store and keep working independently;
    /// per the data model, they should be treated as invalid once the
    /// archive that produced them has been closed.
    #[instrument(skip(self), fields(path = %self.location.display()))]
    pub fn close(self) -> crate::error::Result<()> {
        debug!("closed archive");
        Ok(())
    }

    /// The archive's current working directory.
    pub fn getwd(&self) -> String {
        self.resolver.lock().expect("path resolver mutex poisoned").getwd().to_string()
    }

    /// Change the archive's current working directory. Always succeeds:
    /// directories are implicit path prefixes, not entries that can be missing.
    pub fn chdir(&self, dir: &str) {
        self.resolver.lock().expect("path resolver mutex poisoned").chdir(dir);
    }

    fn resolve(&self, name: &str) -> String {
        self.resolver.lock().expect("path resolver mutex poisoned").resolve(name)
    }

    /// Open a member with the given flags, creating, truncating and
    /// rejecting pre-existing members according to the combination of
    /// [`OpenFlags`] passed.
    ///
    /// The decision table:
    /// - absent, `CREATE` unset -> `NotFound`
    /// - absent, `CREATE` set -> create a zero-length member with `mode`
    /// - present, `CREATE | EXCL` both set -> `AlreadyExists`
    /// - present, `TRUNC` set and handle is writable -> load then truncate to zero
    /// - present, otherwise -> load as-is
    #[instrument(skip(self), fields(name = %name))]
    pub fn open_file(&self, name: &str, flags: OpenFlags, mode: u32) -> PathResult<File> {
        let resolved = self.resolve(name);
        self.open_file_resolved(&resolved, flags, mode)
            .map_err(|e| PathError::new("open", resolved.clone(), e))
    }

    fn open_file_resolved(&self, resolved: &str, flags: OpenFlags, mode: u32) -> crate::error::Result<File> {
        let store = self.store.lock().expect("archive store mutex poisoned");

        let loaded = handle::load(&store, resolved)?;
        drop(store);

        match loaded {
            Some((inode, buf)) => {
                if flags.contains(OpenFlags::CREATE) && flags.contains(OpenFlags::EXCL) {
                    return Err(Error::AlreadyExists(resolved.to_string()));
                }
                let (inode, buf) = if flags.contains(OpenFlags::TRUNC) && flags.is_writable() {
                    (Inode { size: 0, ..inode }, Vec::new())
                } else {
                    (inode, buf)
                };
                Ok(File::new_loaded(
                    resolved.to_string(),
                    inode,
                    buf,
                    flags,
                    self.store.clone(),
                ))
            }
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(Error::NotFound(resolved.to_string()));
                }
                let file = File::new_empty(resolved.to_string(), mode, flags, self.store.clone());
                Ok(file)
            }
        }
    }

    /// Shorthand for opening an existing member read-only.
    pub fn open_read(&self, name: &str) -> PathResult<File> {
        self.open_file(name, OpenFlags::RDONLY, 0)
    }

    /// Shorthand for creating (or truncating) a member for writing, the way
    /// a fresh output file is usually wanted: `CREATE | TRUNC | READ_WRITE`.
    pub fn create_file(&self, name: &str) -> PathResult<File> {
        self.open_file(
            name,
            OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::TRUNC,
            DEFAULT_FILE_MODE,
        )
    }

    /// Metadata for a member, without opening a handle.
    #[instrument(skip(self), fields(name = %name))]
    pub fn stat(&self, name: &str) -> PathResult<FileInfo> {
        let resolved = self.resolve(name);
        let store = self.store.lock().expect("archive store mutex poisoned");
        let loaded = handle::load(&store, &resolved)
            .map_err(|e| PathError::new("stat", resolved.clone(), e))?;
        match loaded {
            Some((inode, _buf)) => Ok(FileInfo::new(resolved, inode)),
            None => Err(PathError::new(
                "stat",
                resolved.clone(),
                Error::NotFound(resolved),
            )),
        }
    }

    /// Remove exactly the named member. No-op if it does not exist... except
    /// callers expect a `NotFound` the same way `os.Remove` does; this
    /// returns `NotFound` if the member is absent.
    #[instrument(skip(self), fields(name = %name))]
    pub fn remove(&self, name: &str) -> PathResult<()> {
        let resolved = self.resolve(name);
        let store = self.store.lock().expect("archive store mutex poisoned");
        if !store
            .member_exists(&resolved)
            .map_err(|e| PathError::new("remove", resolved.clone(), e))?
        {
            return Err(PathError::new(
                "remove",
                resolved.clone(),
                Error::NotFound(resolved),
            ));
        }
        store
            .remove(&resolved)
            .map_err(|e| PathError::new("remove", resolved.clone(), e))
    }

    /// Remove the named member and every member nested under it, as a
    /// directory prefix. Unlike [`Archive::remove`], this is not an error if
    /// nothing matched.
    #[instrument(skip(self), fields(name = %name))]
    pub fn remove_all(&self, name: &str) -> PathResult<()> {
        let resolved = self.resolve(name);
        let store = self.store.lock().expect("archive store mutex poisoned");
        store
            .remove_all(&resolved)
            .map_err(|e| PathError::new("remove_all", resolved.clone(), e))
    }

    /// Rename `old` to `new`.
    ///
    /// `new` must not already exist: this engine checks destination
    /// existence explicitly up front rather than overwriting, which means a
    /// rename can observably fail after being told `old` exists but before
    /// any bytes move, unlike a single atomic filesystem rename. Implemented
    /// as a non-atomic copy-then-delete, since the backing store has no
    /// cross-member atomic move primitive.
    #[instrument(skip(self), fields(old = %old, new = %new))]
    pub fn rename(&self, old: &str, new: &str) -> PathResult<()> {
        let old_resolved = self.resolve(old);
        let new_resolved = self.resolve(new);

        let store = self.store.lock().expect("archive store mutex poisoned");

        if store
            .member_exists(&new_resolved)
            .map_err(|e| PathError::new("rename", new_resolved.clone(), e))?
        {
            return Err(PathError::new(
                "rename",
                new_resolved.clone(),
                Error::AlreadyExists(new_resolved),
            ));
        }

        let (inode, buf) = handle::load(&store, &old_resolved)
            .map_err(|e| PathError::new("rename", old_resolved.clone(), e))?
            .ok_or_else(|| {
                PathError::new(
                    "rename",
                    old_resolved.clone(),
                    Error::NotFound(old_resolved.clone()),
                )
            })?;

        let block_size = if inode.block_size > 0 {
            inode.block_size as usize
        } else {
            crate::inode::DEFAULT_BLOCK_SIZE as usize
        };
        let encoded_blocks: Vec<Vec<u8>> = crate::block::chunks(&buf, block_size)
            .into_iter()
            .map(crate::block::encode)
            .collect();

        store
            .write_member(&new_resolved, &inode.encode(), encoded_blocks)
            .map_err(|e| PathError::new("rename", new_resolved.clone(), e))?;
        store
            .remove(&old_resolved)
            .map_err(|e| PathError::new("rename", old_resolved.clone(), e))?;

        warn!(from = %old_resolved, to = %new_resolved, "renamed via non-atomic copy-then-delete");
        Ok(())
    }

    /// Grow or shrink a member in place without opening a handle for it.
    #[instrument(skip(self), fields(name = %name))]
    pub fn truncate(&self, name: &str, size: u64) -> PathResult<()> {
        let resolved = self.resolve(name);
        let mut file = self
            .open_file_resolved(&resolved, OpenFlags::READ_WRITE, DEFAULT_FILE_MODE)
            .map_err(|e| PathError::new("truncate", resolved.clone(), e))?;
        file.truncate(size);
        file.close()
            .map_err(|e| PathError::new("truncate", resolved, e))
    }

    /// Change a member's mode bits without opening a handle for it.
    pub fn chmod(&self, name: &str, mode: u32) -> PathResult<()> {
        let resolved = self.resolve(name);
        let mut file = self
            .open_file_resolved(&resolved, OpenFlags::READ_WRITE, DEFAULT_FILE_MODE)
            .map_err(|e| PathError::new("chmod", resolved.clone(), e))?;
        file.chmod(mode);
        file.close()
            .map_err(|e| PathError::new("chmod", resolved, e))
    }

    /// Change a member's numeric owner without opening a handle for it.
    pub fn chown(&self, name: &str, uid: u64, gid: u64) -> PathResult<()> {
        let resolved = self.resolve(name);
        let mut file = self
            .open_file_resolved(&resolved, OpenFlags::READ_WRITE, DEFAULT_FILE_MODE)
            .map_err(|e| PathError::new("chown", resolved.clone(), e))?;
        file.chown(uid, gid);
        file.close()
            .map_err(|e| PathError::new("chown", resolved, e))
    }

    /// List every member satisfying `pred`, in ascending lexicographic
    /// order of their absolute path.
    pub fn find(&self, pred: impl FnMut(&str) -> bool) -> PathResult<Vec<String>> {
        let store = self.store.lock().expect("archive store mutex poisoned");
        store
            .find(pred)
            .map_err(|e| PathError::new("find", self.getwd(), e))
    }
}
