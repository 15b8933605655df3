//! Host-side primitives: translating native I/O failures into preview1
//! errnos, positional reads and writes, and metadata probing.

use crate::wasi::{Errno, Filestat, Filetype};
use std::fs::{File, Metadata};
use std::io;
use std::time::SystemTime;

pub(crate) fn errno_from_ioerror(e: &io::Error) -> Errno {
    match e.raw_os_error() {
        Some(code) => errno_from_host(code),
        None => errno_from_kind(e.kind()),
    }
}

fn errno_from_kind(kind: io::ErrorKind) -> Errno {
    use io::ErrorKind::*;
    match kind {
        NotFound => Errno::Noent,
        PermissionDenied => Errno::Acces,
        AlreadyExists => Errno::Exist,
        WouldBlock => Errno::Again,
        InvalidInput => Errno::Inval,
        TimedOut => Errno::Timedout,
        Interrupted => Errno::Intr,
        WriteZero => Errno::Nospc,
        _ => Errno::Io,
    }
}

#[cfg(unix)]
pub(crate) fn errno_from_host(code: i32) -> Errno {
    match code {
        libc::EPERM => Errno::Perm,
        libc::ENOENT => Errno::Noent,
        libc::ESRCH => Errno::Srch,
        libc::EINTR => Errno::Intr,
        libc::EIO => Errno::Io,
        libc::ENXIO => Errno::Nxio,
        libc::E2BIG => Errno::TooBig,
        libc::ENOEXEC => Errno::Noexec,
        libc::EBADF => Errno::Badf,
        libc::ECHILD => Errno::Child,
        libc::EAGAIN => Errno::Again,
        libc::ENOMEM => Errno::Nomem,
        libc::EACCES => Errno::Acces,
        libc::EFAULT => Errno::Fault,
        libc::EBUSY => Errno::Busy,
        libc::EEXIST => Errno::Exist,
        libc::EXDEV => Errno::Xdev,
        libc::ENODEV => Errno::Nodev,
        libc::ENOTDIR => Errno::Notdir,
        libc::EISDIR => Errno::Isdir,
        libc::EINVAL => Errno::Inval,
        libc::ENFILE => Errno::Nfile,
        libc::EMFILE => Errno::Mfile,
        libc::ENOTTY => Errno::Notty,
        libc::ETXTBSY => Errno::Txtbsy,
        libc::EFBIG => Errno::Fbig,
        libc::ENOSPC => Errno::Nospc,
        libc::ESPIPE => Errno::Spipe,
        libc::EROFS => Errno::Rofs,
        libc::EMLINK => Errno::Mlink,
        libc::EPIPE => Errno::Pipe,
        libc::EDOM => Errno::Dom,
        libc::ERANGE => Errno::Range,
        libc::EDEADLK => Errno::Deadlk,
        libc::ENAMETOOLONG => Errno::Nametoolong,
        libc::ENOLCK => Errno::Nolck,
        libc::ENOSYS => Errno::Nosys,
        libc::ENOTEMPTY => Errno::Notempty,
        libc::ELOOP => Errno::Loop,
        libc::ENOMSG => Errno::Nomsg,
        libc::EIDRM => Errno::Idrm,
        libc::ENOLINK => Errno::Nolink,
        libc::EPROTO => Errno::Proto,
        libc::EMULTIHOP => Errno::Multihop,
        libc::EBADMSG => Errno::Badmsg,
        libc::EOVERFLOW => Errno::Overflow,
        libc::EILSEQ => Errno::Ilseq,
        libc::ENOTSOCK => Errno::Notsock,
        libc::EDESTADDRREQ => Errno::Destaddrreq,
        libc::EMSGSIZE => Errno::Msgsize,
        libc::ENOTSUP => Errno::Notsup,
        libc::ETIMEDOUT => Errno::Timedout,
        libc::ESTALE => Errno::Stale,
        libc::EDQUOT => Errno::Dquot,
        libc::ECANCELED => Errno::Canceled,
        libc::EOWNERDEAD => Errno::Ownerdead,
        libc::ENOTRECOVERABLE => Errno::Notrecoverable,
        _ => Errno::Io,
    }
}

#[cfg(not(unix))]
pub(crate) fn errno_from_host(_code: i32) -> Errno {
    Errno::Io
}

#[cfg(unix)]
pub(crate) fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(unix)]
pub(crate) fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

// Windows lacks positional I/O that leaves the cursor alone, so save and
// restore it around a seek_read/seek_write pair.
#[cfg(windows)]
pub(crate) fn pread(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::io::{Seek, SeekFrom};
    use std::os::windows::fs::FileExt;
    let cur_pos = file.seek(SeekFrom::Current(0))?;
    let nread = file.seek_read(buf, offset)?;
    file.seek(SeekFrom::Start(cur_pos))?;
    Ok(nread)
}

#[cfg(windows)]
pub(crate) fn pwrite(mut file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::io::{Seek, SeekFrom};
    use std::os::windows::fs::FileExt;
    let cur_pos = file.seek(SeekFrom::Current(0))?;
    let nwritten = file.seek_write(buf, offset)?;
    file.seek(SeekFrom::Start(cur_pos))?;
    Ok(nwritten)
}

pub(crate) fn filetype_from_metadata(meta: &Metadata) -> Filetype {
    let ft = meta.file_type();
    if ft.is_file() {
        Filetype::RegularFile
    } else if ft.is_dir() {
        Filetype::Directory
    } else if ft.is_symlink() {
        Filetype::SymbolicLink
    } else {
        filetype_from_special(meta)
    }
}

#[cfg(unix)]
fn filetype_from_special(meta: &Metadata) -> Filetype {
    use std::os::unix::fs::FileTypeExt;
    let ft = meta.file_type();
    if ft.is_char_device() {
        Filetype::CharacterDevice
    } else if ft.is_block_device() {
        Filetype::BlockDevice
    } else if ft.is_socket() {
        Filetype::SocketStream
    } else {
        // FIFOs have no dedicated preview1 filetype.
        Filetype::Unknown
    }
}

#[cfg(not(unix))]
fn filetype_from_special(_meta: &Metadata) -> Filetype {
    Filetype::Unknown
}

fn timestamp_from(time: io::Result<SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

pub(crate) fn filestat_from_metadata(meta: &Metadata) -> Filestat {
    Filestat {
        dev: device_id(meta),
        ino: inode(meta),
        filetype: filetype_from_metadata(meta),
        nlink: nlink(meta),
        size: meta.len(),
        atim: timestamp_from(meta.accessed()),
        mtim: timestamp_from(meta.modified()),
        ctim: ctim(meta),
    }
}

#[cfg(unix)]
fn ctim(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    (meta.ctime() as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(meta.ctime_nsec() as u64)
}

#[cfg(not(unix))]
fn ctim(meta: &Metadata) -> u64 {
    timestamp_from(meta.created())
}

#[cfg(unix)]
fn device_id(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.dev()
}

#[cfg(unix)]
pub(crate) fn inode(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(unix)]
fn nlink(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.nlink()
}

#[cfg(not(unix))]
fn device_id(_meta: &Metadata) -> u64 {
    0
}

#[cfg(not(unix))]
pub(crate) fn inode(_meta: &Metadata) -> u64 {
    0
}

#[cfg(not(unix))]
fn nlink(_meta: &Metadata) -> u64 {
    0
}
