//! Types mirroring the `wasi_snapshot_preview1` witx definitions.
//!
//! Scalars, flags and structs in this module are bit-for-bit compatible with
//! the preview1 ABI; how they are laid out in guest linear memory is the
//! business of the `memory` module.

use bitflags::bitflags;
use std::fmt;

pub type Size = u32;
pub type Filesize = u64;
pub type Timestamp = u64;
pub type Dircookie = u64;
pub type Filedelta = i64;
pub type Device = u64;
pub type Inode = u64;
pub type Linkcount = u64;

/// A file descriptor handle as the guest sees it.
pub type Fd = u32;

/// An offset into guest linear memory.
pub type GuestPtr = u32;

/// Cookie value denoting the start of a directory stream.
pub const DIRCOOKIE_START: Dircookie = 0;

/// The only preopen type defined by preview1.
pub const PREOPENTYPE_DIR: u8 = 0;

/// Error codes returned by every hostcall, with the fixed preview1 numbering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum Errno {
    Success = 0,
    TooBig = 1,
    Acces = 2,
    Addrinuse = 3,
    Addrnotavail = 4,
    Afnosupport = 5,
    Again = 6,
    Already = 7,
    Badf = 8,
    Badmsg = 9,
    Busy = 10,
    Canceled = 11,
    Child = 12,
    Connaborted = 13,
    Connrefused = 14,
    Connreset = 15,
    Deadlk = 16,
    Destaddrreq = 17,
    Dom = 18,
    Dquot = 19,
    Exist = 20,
    Fault = 21,
    Fbig = 22,
    Hostunreach = 23,
    Idrm = 24,
    Ilseq = 25,
    Inprogress = 26,
    Intr = 27,
    Inval = 28,
    Io = 29,
    Isconn = 30,
    Isdir = 31,
    Loop = 32,
    Mfile = 33,
    Mlink = 34,
    Msgsize = 35,
    Multihop = 36,
    Nametoolong = 37,
    Netdown = 38,
    Netreset = 39,
    Netunreach = 40,
    Nfile = 41,
    Nobufs = 42,
    Nodev = 43,
    Noent = 44,
    Noexec = 45,
    Nolck = 46,
    Nolink = 47,
    Nomem = 48,
    Nomsg = 49,
    Noprotoopt = 50,
    Nospc = 51,
    Nosys = 52,
    Notconn = 53,
    Notdir = 54,
    Notempty = 55,
    Notrecoverable = 56,
    Notsock = 57,
    Notsup = 58,
    Notty = 59,
    Nxio = 60,
    Overflow = 61,
    Ownerdead = 62,
    Perm = 63,
    Pipe = 64,
    Proto = 65,
    Protonosupport = 66,
    Prototype = 67,
    Range = 68,
    Rofs = 69,
    Spipe = 70,
    Srch = 71,
    Stale = 72,
    Timedout = 73,
    Txtbsy = 74,
    Xdev = 75,
    Notcapable = 76,
}

impl Errno {
    pub fn as_raw_errno(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as u16)
    }
}

impl std::error::Error for Errno {}

/// The type of a file descriptor or file, with the preview1 discriminants.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Filetype {
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

/// The position relative to which to set the offset of a descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

impl TryFrom<u8> for Whence {
    type Error = Errno;

    fn try_from(raw: u8) -> Result<Self, Errno> {
        match raw {
            0 => Ok(Self::Set),
            1 => Ok(Self::Cur),
            2 => Ok(Self::End),
            _ => Err(Errno::Inval),
        }
    }
}

bitflags! {
    /// File descriptor rights, determining which actions may be taken.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Rights: u64 {
        const FD_DATASYNC = 1 << 0;
        const FD_READ = 1 << 1;
        const FD_SEEK = 1 << 2;
        const FD_FDSTAT_SET_FLAGS = 1 << 3;
        const FD_SYNC = 1 << 4;
        const FD_TELL = 1 << 5;
        const FD_WRITE = 1 << 6;
        const FD_ADVISE = 1 << 7;
        const FD_ALLOCATE = 1 << 8;
        const PATH_CREATE_DIRECTORY = 1 << 9;
        const PATH_CREATE_FILE = 1 << 10;
        const PATH_LINK_SOURCE = 1 << 11;
        const PATH_LINK_TARGET = 1 << 12;
        const PATH_OPEN = 1 << 13;
        const FD_READDIR = 1 << 14;
        const PATH_READLINK = 1 << 15;
        const PATH_RENAME_SOURCE = 1 << 16;
        const PATH_RENAME_TARGET = 1 << 17;
        const PATH_FILESTAT_GET = 1 << 18;
        const PATH_FILESTAT_SET_SIZE = 1 << 19;
        const PATH_FILESTAT_SET_TIMES = 1 << 20;
        const FD_FILESTAT_GET = 1 << 21;
        const FD_FILESTAT_SET_SIZE = 1 << 22;
        const FD_FILESTAT_SET_TIMES = 1 << 23;
        const PATH_SYMLINK = 1 << 24;
        const PATH_REMOVE_DIRECTORY = 1 << 25;
        const PATH_UNLINK_FILE = 1 << 26;
        const POLL_FD_READWRITE = 1 << 27;
        const SOCK_SHUTDOWN = 1 << 28;
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.bits())
    }
}

bitflags! {
    /// File descriptor flags.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Fdflags: u16 {
        const APPEND = 1 << 0;
        const DSYNC = 1 << 1;
        const NONBLOCK = 1 << 2;
        const RSYNC = 1 << 3;
        const SYNC = 1 << 4;
    }
}

bitflags! {
    /// Open flags used by `path_open`.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Oflags: u16 {
        const CREAT = 1 << 0;
        const DIRECTORY = 1 << 1;
        const EXCL = 1 << 2;
        const TRUNC = 1 << 3;
    }
}

bitflags! {
    /// Flags determining how a path is resolved.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Lookupflags: u32 {
        const SYMLINK_FOLLOW = 1 << 0;
    }
}

bitflags! {
    /// Which file time attributes to adjust.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Fstflags: u16 {
        const ATIM = 1 << 0;
        const ATIM_NOW = 1 << 1;
        const MTIM = 1 << 2;
        const MTIM_NOW = 1 << 3;
    }
}

/// File descriptor attributes, as reported by `fd_fdstat_get`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fdstat {
    pub fs_filetype: Filetype,
    pub fs_flags: Fdflags,
    pub fs_rights_base: Rights,
    pub fs_rights_inheriting: Rights,
}

/// File attributes, as reported by `fd_filestat_get` and `path_filestat_get`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Filestat {
    pub dev: Device,
    pub ino: Inode,
    pub filetype: Filetype,
    pub nlink: Linkcount,
    pub size: Filesize,
    pub atim: Timestamp,
    pub mtim: Timestamp,
    pub ctim: Timestamp,
}

/// Information about a preopened descriptor. The only defined variant is a
/// directory, so the struct carries just the name length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prestat {
    pub pr_name_len: Size,
}

/// A directory entry header, followed on the wire by `d_namlen` name bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dirent {
    pub d_next: Dircookie,
    pub d_ino: Inode,
    pub d_namlen: Size,
    pub d_type: Filetype,
}

pub(crate) trait RightsExt: Sized {
    fn directory_base() -> Self;
    fn directory_inheriting() -> Self;
    fn regular_file_base() -> Self;
    fn regular_file_inheriting() -> Self;
    fn character_device_base() -> Self;
    fn character_device_inheriting() -> Self;
}

impl RightsExt for Rights {
    // Only allow directory operations on directories. Directories can only
    // yield file descriptors to other directories and files.
    fn directory_base() -> Self {
        Self::FD_FDSTAT_SET_FLAGS
            | Self::FD_SYNC
            | Self::FD_ADVISE
            | Self::PATH_CREATE_DIRECTORY
            | Self::PATH_CREATE_FILE
            | Self::PATH_LINK_SOURCE
            | Self::PATH_LINK_TARGET
            | Self::PATH_OPEN
            | Self::FD_READDIR
            | Self::PATH_READLINK
            | Self::PATH_RENAME_SOURCE
            | Self::PATH_RENAME_TARGET
            | Self::PATH_FILESTAT_GET
            | Self::PATH_FILESTAT_SET_SIZE
            | Self::PATH_FILESTAT_SET_TIMES
            | Self::FD_FILESTAT_GET
            | Self::FD_FILESTAT_SET_TIMES
            | Self::PATH_SYMLINK
            | Self::PATH_UNLINK_FILE
            | Self::PATH_REMOVE_DIRECTORY
            | Self::POLL_FD_READWRITE
    }
    fn directory_inheriting() -> Self {
        Self::directory_base() | Self::regular_file_base()
    }

    // Operations that apply to regular files.
    fn regular_file_base() -> Self {
        Self::FD_DATASYNC
            | Self::FD_READ
            | Self::FD_SEEK
            | Self::FD_FDSTAT_SET_FLAGS
            | Self::FD_SYNC
            | Self::FD_TELL
            | Self::FD_WRITE
            | Self::FD_ADVISE
            | Self::FD_ALLOCATE
            | Self::FD_FILESTAT_GET
            | Self::FD_FILESTAT_SET_SIZE
            | Self::FD_FILESTAT_SET_TIMES
            | Self::POLL_FD_READWRITE
    }
    fn regular_file_inheriting() -> Self {
        Self::empty()
    }

    // Stdio and /dev/null descriptors. The seek and tell bits are included
    // deliberately: seeking a pipe must surface `Spipe` from the stream
    // rather than fail the rights check.
    fn character_device_base() -> Self {
        Self::FD_READ
            | Self::FD_WRITE
            | Self::FD_SEEK
            | Self::FD_TELL
            | Self::FD_FDSTAT_SET_FLAGS
            | Self::FD_FILESTAT_GET
            | Self::POLL_FD_READWRITE
    }
    fn character_device_inheriting() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_numbering_matches_preview1() {
        assert_eq!(Errno::Success.as_raw_errno(), 0);
        assert_eq!(Errno::Acces.as_raw_errno(), 2);
        assert_eq!(Errno::Badf.as_raw_errno(), 8);
        assert_eq!(Errno::Noent.as_raw_errno(), 44);
        assert_eq!(Errno::Spipe.as_raw_errno(), 70);
        assert_eq!(Errno::Notcapable.as_raw_errno(), 76);
    }

    #[test]
    fn directory_rights_nest() {
        let base = Rights::directory_base();
        let inheriting = Rights::directory_inheriting();
        assert!(inheriting.contains(base));
        assert!(inheriting.contains(Rights::regular_file_base()));
        assert!(!base.contains(Rights::FD_READ));
    }

    #[test]
    fn whence_decoding() {
        assert_eq!(Whence::try_from(0), Ok(Whence::Set));
        assert_eq!(Whence::try_from(1), Ok(Whence::Cur));
        assert_eq!(Whence::try_from(2), Ok(Whence::End));
        assert_eq!(Whence::try_from(3), Err(Errno::Inval));
    }
}
