//! Open-mode flags, mirroring the POSIX `O_*` constants without tying the
//! public API to any particular platform's values.

use std::ops::{BitOr, BitOrAssign};

/// A set of open-mode flags, combined with `|`.
///
/// `OpenFlags::WRITE_ONLY` and `OpenFlags::READ_WRITE` are mutually
/// exclusive access modes; the absence of either means read-only. The rest
/// are independent modifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Open for reading only. This is the zero value: the default when no
    /// other access-mode flag is set.
    pub const RDONLY: OpenFlags = OpenFlags(0);
    /// Open for writing only.
    pub const WRITE_ONLY: OpenFlags = OpenFlags(1 << 0);
    /// Open for reading and writing.
    pub const READ_WRITE: OpenFlags = OpenFlags(1 << 1);
    /// Create the member if it does not already exist.
    pub const CREATE: OpenFlags = OpenFlags(1 << 2);
    /// Used with `CREATE`: fail if the member already exists.
    pub const EXCL: OpenFlags = OpenFlags(1 << 3);
    /// Truncate the member to zero length on open.
    pub const TRUNC: OpenFlags = OpenFlags(1 << 4);
    /// Flush to the store after every write.
    pub const SYNC: OpenFlags = OpenFlags(1 << 5);

    /// Does this flag set contain every bit of `other`?
    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Is this a write-only open (as opposed to read-write or read-only)?
    pub fn is_write_only(self) -> bool {
        self.contains(OpenFlags::WRITE_ONLY) && !self.contains(OpenFlags::READ_WRITE)
    }

    /// Should the resulting handle be writable?
    /// `is_writable = (flag ∈ {WRITE_ONLY, READ_WRITE})`.
    pub fn is_writable(self) -> bool {
        self.contains(OpenFlags::WRITE_ONLY) || self.contains(OpenFlags::READ_WRITE)
    }

    /// Should the resulting handle be readable?
    /// `is_readable = (flag ∉ {WRITE_ONLY})` — RDONLY, RDWR, and bare-SYNC all imply readable.
    pub fn is_readable(self) -> bool {
        !self.is_write_only()
    }

    /// Should every write flush immediately?
    pub fn is_sync(self) -> bool {
        self.contains(OpenFlags::SYNC)
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;
    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}
