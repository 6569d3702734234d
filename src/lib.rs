//! A single-file, random-access archive: many logical members striped into
//! compressed blocks and indexed by a transactional, ordered key/value
//! store, addressable by forward-slash paths.
//!
//! The top-level type is [`Archive`]; open or create one, then use it to
//! open [`File`] handles or operate on members directly (`stat`, `remove`,
//! `rename`, ...).
//!
//! ```no_run
//! use raa::{Archive, OpenFlags};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let archive = Archive::create("example.raa")?;
//! let mut f = archive.create_file("/greeting.txt")?;
//! f.write(b"hello")?;
//! f.close()?;
//! # Ok(())
//! # }
//! ```

mod archive;
mod block;
mod error;
mod flags;
mod handle;
mod inode;
mod kv;
mod path;

pub use archive::{Archive, ArchiveOptions};
pub use error::{Error, PathError, PathResult, Result, StorageError};
pub use flags::OpenFlags;
pub use handle::{File, FileInfo};
pub use inode::Inode;
