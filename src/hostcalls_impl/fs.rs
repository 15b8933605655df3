//! Hostcall bodies for the filesystem surface.
//!
//! Every function here mirrors one `wasi_snapshot_preview1` export. The flow
//! is uniform: look the descriptor up (Badf), check the required rights
//! against its base set (Notcapable), resolve any path argument through the
//! preopen mapper, perform the host operation, then marshal results back
//! into guest memory. The `hostcalls` wrapper turns the `Result` into the
//! errno the guest sees.

use crate::ctx::WasiFs;
use crate::entry::{AccessMode, Entry, EntryRights};
use crate::handle::{systimespec, Handle};
use crate::memory;
use crate::path::{join_guest, normalize_guest, DEV_PREFIX};
use crate::wasi::{
    Dircookie, Errno, Fd, Fdflags, Fdstat, Filedelta, Filesize, Filestat, Filetype, Fstflags,
    GuestPtr, Lookupflags, Oflags, Prestat, Rights, RightsExt, Timestamp, Whence,
};
use crate::Result;
use std::fs;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::trace;

/// A path argument after translation: its canonical guest form, plus the
/// host path it names unless it lives in the reserved `/dev` namespace.
struct ResolvedPath {
    guest: String,
    host: Option<PathBuf>,
}

impl ResolvedPath {
    /// The host path, for operations that have no business in `/dev`.
    fn host(self) -> Result<PathBuf> {
        self.host.ok_or_else(|| Errno::Noent.into())
    }
}

fn dir_entry(fs: &WasiFs, dirfd: Fd, required: Rights) -> Result<Arc<Entry>> {
    let entry = fs.table.get(dirfd)?;
    if entry.file_type != Filetype::Directory {
        return Err(Errno::Notdir.into());
    }
    entry.validate_rights(&EntryRights::from_base(required))?;
    Ok(entry)
}

fn resolve_path(
    fs: &WasiFs,
    entry: &Entry,
    memory: &[u8],
    path_ptr: GuestPtr,
    path_len: u32,
    flags: Lookupflags,
) -> Result<ResolvedPath> {
    let path = memory::dec_path(memory, path_ptr, path_len)?;
    trace!("     | (path_ptr,path_len)={:?}", path);
    if path.starts_with('/') {
        // Guest paths are dirfd-relative; absolute ones cannot be granted.
        return Err(Errno::Notcapable.into());
    }
    let joined = join_guest(&entry.guest_path, &path);
    let guest = normalize_guest(&joined)?;
    if guest == DEV_PREFIX || guest.starts_with("/dev/") {
        return Ok(ResolvedPath { guest, host: None });
    }
    let host = fs.paths.map_to_host(&joined, flags)?;
    Ok(ResolvedPath {
        guest,
        host: Some(host),
    })
}

pub(crate) fn fd_close(fs: &WasiFs, fd: Fd) -> Result<()> {
    trace!("fd_close(fd={})", fd);
    // Closing a preopened directory is permitted; it simply leaves the
    // table. Regular files close their stream when the entry drops.
    fs.table.delete(fd)?;
    Ok(())
}

pub(crate) fn fd_datasync(fs: &WasiFs, fd: Fd) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_DATASYNC))?;
    entry.handle.datasync()
}

pub(crate) fn fd_sync(fs: &WasiFs, fd: Fd) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_SYNC))?;
    entry.handle.sync()
}

pub(crate) fn fd_read(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    iovs_ptr: GuestPtr,
    iovs_len: u32,
    nread_ptr: GuestPtr,
) -> Result<()> {
    trace!("fd_read(fd={}, iovs_len={})", fd, iovs_len);
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_READ))?;
    let iovs = memory::dec_iovec_slice(memory, iovs_ptr, iovs_len)?;

    let mut nread: usize = 0;
    for (buf, buf_len) in iovs {
        if buf_len == 0 {
            continue;
        }
        let slice = memory::dec_slice_of_mut_u8(memory, buf, buf_len)?;
        match entry.handle.read(slice) {
            Ok(0) => break,
            Ok(n) => {
                nread += n;
                if n < slice.len() {
                    break;
                }
            }
            // Bytes already transferred win over a late failure.
            Err(e) if nread == 0 => return Err(e),
            Err(_) => break,
        }
    }
    memory::enc_u32_byref(memory, nread_ptr, nread.try_into()?)
}

pub(crate) fn fd_write(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    iovs_ptr: GuestPtr,
    iovs_len: u32,
    nwritten_ptr: GuestPtr,
) -> Result<()> {
    trace!("fd_write(fd={}, iovs_len={})", fd, iovs_len);
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_WRITE))?;
    let iovs = memory::dec_iovec_slice(memory, iovs_ptr, iovs_len)?;
    let append = entry.fdflags().contains(Fdflags::APPEND);

    let mut nwritten: usize = 0;
    for (buf, buf_len) in iovs {
        if buf_len == 0 {
            continue;
        }
        let bytes = memory::dec_slice_of_u8(memory, buf, buf_len)?;
        match entry.handle.write(bytes, append) {
            Ok(n) => {
                nwritten += n;
                if n < bytes.len() {
                    break;
                }
            }
            Err(e) if nwritten == 0 => return Err(e),
            Err(_) => break,
        }
    }
    memory::enc_u32_byref(memory, nwritten_ptr, nwritten.try_into()?)
}

pub(crate) fn fd_pread(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    iovs_ptr: GuestPtr,
    iovs_len: u32,
    offset: Filesize,
    nread_ptr: GuestPtr,
) -> Result<()> {
    trace!("fd_pread(fd={}, offset={})", fd, offset);
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_READ | Rights::FD_SEEK))?;
    let iovs = memory::dec_iovec_slice(memory, iovs_ptr, iovs_len)?;

    let mut nread: usize = 0;
    for (buf, buf_len) in iovs {
        if buf_len == 0 {
            continue;
        }
        let slice = memory::dec_slice_of_mut_u8(memory, buf, buf_len)?;
        let at = offset
            .checked_add(nread as u64)
            .ok_or(Errno::Overflow)?;
        match entry.handle.pread(slice, at) {
            Ok(0) => break,
            Ok(n) => {
                nread += n;
                if n < slice.len() {
                    break;
                }
            }
            Err(e) if nread == 0 => return Err(e),
            Err(_) => break,
        }
    }
    memory::enc_u32_byref(memory, nread_ptr, nread.try_into()?)
}

pub(crate) fn fd_pwrite(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    iovs_ptr: GuestPtr,
    iovs_len: u32,
    offset: Filesize,
    nwritten_ptr: GuestPtr,
) -> Result<()> {
    trace!("fd_pwrite(fd={}, offset={})", fd, offset);
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_WRITE | Rights::FD_SEEK))?;
    let iovs = memory::dec_iovec_slice(memory, iovs_ptr, iovs_len)?;

    let mut nwritten: usize = 0;
    for (buf, buf_len) in iovs {
        if buf_len == 0 {
            continue;
        }
        let bytes = memory::dec_slice_of_u8(memory, buf, buf_len)?;
        let at = offset
            .checked_add(nwritten as u64)
            .ok_or(Errno::Overflow)?;
        match entry.handle.pwrite(bytes, at) {
            Ok(n) => {
                nwritten += n;
                if n < bytes.len() {
                    break;
                }
            }
            Err(e) if nwritten == 0 => return Err(e),
            Err(_) => break,
        }
    }
    memory::enc_u32_byref(memory, nwritten_ptr, nwritten.try_into()?)
}

pub(crate) fn fd_seek(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    offset: Filedelta,
    whence: u8,
    newoffset_ptr: GuestPtr,
) -> Result<()> {
    trace!("fd_seek(fd={}, offset={}, whence={})", fd, offset, whence);
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_SEEK))?;
    let pos = match Whence::try_from(whence)? {
        Whence::Set => SeekFrom::Start(offset.try_into().map_err(|_| Errno::Inval)?),
        Whence::Cur => SeekFrom::Current(offset),
        Whence::End => SeekFrom::End(offset),
    };
    let newoffset = entry.handle.seek(pos)?;
    memory::enc_u64_byref(memory, newoffset_ptr, newoffset)
}

pub(crate) fn fd_tell(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    newoffset_ptr: GuestPtr,
) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_TELL))?;
    let offset = entry.handle.tell()?;
    memory::enc_u64_byref(memory, newoffset_ptr, offset)
}

pub(crate) fn fd_renumber(fs: &WasiFs, from: Fd, to: Fd) -> Result<()> {
    trace!("fd_renumber(from={}, to={})", from, to);
    fs.table.renumber(from, to)
}

pub(crate) fn fd_fdstat_get(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    fdstat_ptr: GuestPtr,
) -> Result<()> {
    let entry = fs.table.get(fd)?;
    let rights = entry.rights();
    let fdstat = Fdstat {
        fs_filetype: entry.file_type,
        fs_flags: entry.fdflags(),
        fs_rights_base: rights.base,
        fs_rights_inheriting: rights.inheriting,
    };
    memory::enc_fdstat_byref(memory, fdstat_ptr, fdstat)
}

pub(crate) fn fd_fdstat_set_flags(fs: &WasiFs, fd: Fd, fdflags: u16) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_FDSTAT_SET_FLAGS))?;
    let flags = Fdflags::from_bits(fdflags).ok_or(Errno::Inval)?;
    entry.set_fdflags(flags);
    Ok(())
}

pub(crate) fn fd_fdstat_set_rights(
    fs: &WasiFs,
    fd: Fd,
    fs_rights_base: u64,
    fs_rights_inheriting: u64,
) -> Result<()> {
    trace!(
        "fd_fdstat_set_rights(fd={}, base={:#x}, inheriting={:#x})",
        fd,
        fs_rights_base,
        fs_rights_inheriting
    );
    let entry = fs.table.get(fd)?;
    let requested = EntryRights::new(
        Rights::from_bits(fs_rights_base).ok_or(Errno::Inval)?,
        Rights::from_bits(fs_rights_inheriting).ok_or(Errno::Inval)?,
    );
    entry.narrow_rights(requested)
}

pub(crate) fn fd_advise(
    fs: &WasiFs,
    fd: Fd,
    offset: Filesize,
    len: Filesize,
    advice: u8,
) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_ADVISE))?;
    if advice > 5 {
        return Err(Errno::Inval.into());
    }
    offset.checked_add(len).ok_or(Errno::Inval)?;
    // Purely advisory; the host file cache is left to its own devices.
    Ok(())
}

pub(crate) fn fd_allocate(fs: &WasiFs, fd: Fd, offset: Filesize, len: Filesize) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_ALLOCATE))?;
    entry.handle.allocate(offset, len)
}

pub(crate) fn fd_filestat_get(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    filestat_ptr: GuestPtr,
) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_FILESTAT_GET))?;
    let filestat = entry.handle.filestat(entry.file_type)?;
    memory::enc_filestat_byref(memory, filestat_ptr, filestat)
}

pub(crate) fn fd_filestat_set_size(fs: &WasiFs, fd: Fd, st_size: Filesize) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_FILESTAT_SET_SIZE))?;
    entry.handle.set_size(st_size)
}

pub(crate) fn fd_filestat_set_times(
    fs: &WasiFs,
    fd: Fd,
    st_atim: Timestamp,
    st_mtim: Timestamp,
    fst_flags: u16,
) -> Result<()> {
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_FILESTAT_SET_TIMES))?;
    let fst_flags = Fstflags::from_bits(fst_flags).ok_or(Errno::Inval)?;
    let atim = systimespec(
        fst_flags.contains(Fstflags::ATIM),
        st_atim,
        fst_flags.contains(Fstflags::ATIM_NOW),
    )?;
    let mtim = systimespec(
        fst_flags.contains(Fstflags::MTIM),
        st_mtim,
        fst_flags.contains(Fstflags::MTIM_NOW),
    )?;
    entry.handle.set_times(atim, mtim)
}

pub(crate) fn fd_readdir(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    buf: GuestPtr,
    buf_len: u32,
    cookie: Dircookie,
    bufused_ptr: GuestPtr,
) -> Result<()> {
    trace!("fd_readdir(fd={}, buf_len={}, cookie={})", fd, buf_len, cookie);
    let entry = fs.table.get(fd)?;
    entry.validate_rights(&EntryRights::from_base(Rights::FD_READDIR))?;
    // The whole output window must be valid before anything is produced.
    memory::dec_slice_of_u8(memory, buf, buf_len)?;

    let mut bufused: u32 = 0;
    for (dirent, name) in entry.handle.readdir(cookie)? {
        let header = memory::dirent_to_bytes(dirent);
        let name_bytes = name.as_bytes();

        // Copy as many bytes of the header as fit, then of the name. A
        // partial copy reports a full buffer, which tells the guest this is
        // not EOF.
        let copy = (header.len() as u32).min(buf_len - bufused);
        memory::enc_slice_of_u8(memory, &header[..copy as usize], buf + bufused)?;
        bufused += copy;
        if (copy as usize) < header.len() {
            bufused = buf_len;
            break;
        }

        let copy = (name_bytes.len() as u32).min(buf_len - bufused);
        memory::enc_slice_of_u8(memory, &name_bytes[..copy as usize], buf + bufused)?;
        bufused += copy;
        if (copy as usize) < name_bytes.len() {
            bufused = buf_len;
            break;
        }
    }
    memory::enc_u32_byref(memory, bufused_ptr, bufused)
}

pub(crate) fn fd_prestat_get(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    prestat_ptr: GuestPtr,
) -> Result<()> {
    let entry = fs.table.get(fd)?;
    if entry.file_type != Filetype::Directory {
        return Err(Errno::Notdir.into());
    }
    if !entry.preopen {
        return Err(Errno::Notsup.into());
    }
    let prestat = Prestat {
        pr_name_len: entry.guest_path.len().try_into()?,
    };
    memory::enc_prestat_byref(memory, prestat_ptr, prestat)
}

pub(crate) fn fd_prestat_dir_name(
    fs: &WasiFs,
    memory: &mut [u8],
    fd: Fd,
    path_ptr: GuestPtr,
    path_len: u32,
) -> Result<()> {
    let entry = fs.table.get(fd)?;
    if entry.file_type != Filetype::Directory {
        return Err(Errno::Notdir.into());
    }
    if !entry.preopen {
        return Err(Errno::Notsup.into());
    }
    let name = entry.guest_path.as_bytes();
    if name.len() > path_len as usize {
        return Err(Errno::Nametoolong.into());
    }
    memory::enc_slice_of_u8(memory, name, path_ptr)
}

pub(crate) fn path_create_directory(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: Fd,
    path_ptr: GuestPtr,
    path_len: u32,
) -> Result<()> {
    trace!("path_create_directory(dirfd={})", dirfd);
    let entry = dir_entry(fs, dirfd, Rights::PATH_CREATE_DIRECTORY)?;
    let host = resolve_path(fs, &entry, memory, path_ptr, path_len, Lookupflags::empty())?
        .host()?;
    fs::create_dir(host)?;
    Ok(())
}

pub(crate) fn path_filestat_get(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: Fd,
    dirflags: u32,
    path_ptr: GuestPtr,
    path_len: u32,
    filestat_ptr: GuestPtr,
) -> Result<()> {
    let entry = dir_entry(fs, dirfd, Rights::PATH_FILESTAT_GET)?;
    let flags = Lookupflags::from_bits(dirflags).ok_or(Errno::Inval)?;
    let resolved = resolve_path(fs, &entry, memory, path_ptr, path_len, flags)?;
    let filestat = match resolved.host {
        Some(host) => {
            let meta = fs::symlink_metadata(host)?;
            crate::sys::filestat_from_metadata(&meta)
        }
        None if resolved.guest == "/dev/null" => Filestat {
            dev: 0,
            ino: 0,
            filetype: Filetype::CharacterDevice,
            nlink: 0,
            size: 0,
            atim: 0,
            mtim: 0,
            ctim: 0,
        },
        None => return Err(Errno::Noent.into()),
    };
    memory::enc_filestat_byref(memory, filestat_ptr, filestat)
}

pub(crate) fn path_filestat_set_times(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: Fd,
    dirflags: u32,
    path_ptr: GuestPtr,
    path_len: u32,
    st_atim: Timestamp,
    st_mtim: Timestamp,
    fst_flags: u16,
) -> Result<()> {
    let entry = dir_entry(fs, dirfd, Rights::PATH_FILESTAT_SET_TIMES)?;
    let flags = Lookupflags::from_bits(dirflags).ok_or(Errno::Inval)?;
    let fst_flags = Fstflags::from_bits(fst_flags).ok_or(Errno::Inval)?;
    let atim = systimespec(
        fst_flags.contains(Fstflags::ATIM),
        st_atim,
        fst_flags.contains(Fstflags::ATIM_NOW),
    )?;
    let mtim = systimespec(
        fst_flags.contains(Fstflags::MTIM),
        st_mtim,
        fst_flags.contains(Fstflags::MTIM_NOW),
    )?;
    let host = resolve_path(fs, &entry, memory, path_ptr, path_len, flags)?.host()?;
    let meta = fs::symlink_metadata(&host)?;
    let atim = atim.unwrap_or_else(|| filetime::FileTime::from_last_access_time(&meta));
    let mtim = mtim.unwrap_or_else(|| filetime::FileTime::from_last_modification_time(&meta));
    if flags.contains(Lookupflags::SYMLINK_FOLLOW) {
        filetime::set_file_times(&host, atim, mtim)?;
    } else {
        filetime::set_symlink_file_times(&host, atim, mtim)?;
    }
    Ok(())
}

pub(crate) fn path_link(
    fs: &WasiFs,
    memory: &mut [u8],
    old_dirfd: Fd,
    old_flags: u32,
    old_path_ptr: GuestPtr,
    old_path_len: u32,
    new_dirfd: Fd,
    new_path_ptr: GuestPtr,
    new_path_len: u32,
) -> Result<()> {
    trace!("path_link(old_dirfd={}, new_dirfd={})", old_dirfd, new_dirfd);
    let old_entry = dir_entry(fs, old_dirfd, Rights::PATH_LINK_SOURCE)?;
    let new_entry = dir_entry(fs, new_dirfd, Rights::PATH_LINK_TARGET)?;
    let old_flags = Lookupflags::from_bits(old_flags).ok_or(Errno::Inval)?;
    if old_flags.contains(Lookupflags::SYMLINK_FOLLOW) {
        // Symlink following on link sources is not supported.
        return Err(Errno::Inval.into());
    }
    let old_host = resolve_path(
        fs,
        &old_entry,
        memory,
        old_path_ptr,
        old_path_len,
        Lookupflags::empty(),
    )?
    .host()?;
    let new_host = resolve_path(
        fs,
        &new_entry,
        memory,
        new_path_ptr,
        new_path_len,
        Lookupflags::empty(),
    )?
    .host()?;
    fs::hard_link(old_host, new_host)?;
    Ok(())
}

pub(crate) fn path_open(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: Fd,
    dirflags: u32,
    path_ptr: GuestPtr,
    path_len: u32,
    oflags: u16,
    fs_rights_base: u64,
    fs_rights_inheriting: u64,
    fs_flags: u16,
    fd_out_ptr: GuestPtr,
) -> Result<()> {
    trace!(
        "path_open(dirfd={}, oflags={:#x}, base={:#x}, inheriting={:#x})",
        dirfd,
        oflags,
        fs_rights_base,
        fs_rights_inheriting
    );
    let entry = fs.table.get(dirfd)?;
    if entry.file_type != Filetype::Directory {
        return Err(Errno::Notdir.into());
    }
    let dirflags = Lookupflags::from_bits(dirflags).ok_or(Errno::Inval)?;
    let oflags = Oflags::from_bits(oflags).ok_or(Errno::Inval)?;
    let fdflags = Fdflags::from_bits(fs_flags).ok_or(Errno::Inval)?;
    let requested = EntryRights::new(
        Rights::from_bits(fs_rights_base).ok_or(Errno::Inval)?,
        Rights::from_bits(fs_rights_inheriting).ok_or(Errno::Inval)?,
    );

    let mut needed = Rights::PATH_OPEN;
    if oflags.contains(Oflags::CREAT) {
        needed |= Rights::PATH_CREATE_FILE;
    }
    if oflags.contains(Oflags::TRUNC) {
        needed |= Rights::PATH_FILESTAT_SET_SIZE;
    }
    entry.validate_rights(&EntryRights::from_base(needed))?;

    // The child's rights derive from the parent's inheriting set. A request
    // that would have to be narrowed is refused outright rather than
    // silently trimmed.
    let parent_inheriting = entry.rights().inheriting;
    if !parent_inheriting.contains(requested.base)
        || !parent_inheriting.contains(requested.inheriting)
    {
        return Err(Errno::Notcapable.into());
    }

    let resolved = resolve_path(fs, &entry, memory, path_ptr, path_len, dirflags)?;
    drop(entry);

    let read = requested
        .base
        .intersects(Rights::FD_READ | Rights::FD_READDIR);
    let write = requested.base.intersects(
        Rights::FD_WRITE | Rights::FD_ALLOCATE | Rights::FD_FILESTAT_SET_SIZE,
    );
    let access = access_mode(read, write);

    let host = match resolved.host {
        Some(host) => host,
        None if resolved.guest == "/dev/null" => {
            // /dev/null works on any host: reads see EOF, writes vanish.
            let rights = requested.restrict(&EntryRights::new(
                Rights::character_device_base(),
                Rights::character_device_inheriting(),
            ));
            let fd = fs.table.push(Entry::new(
                Filetype::CharacterDevice,
                resolved.guest,
                Handle::DevNull,
                access,
                rights,
                false,
            ))?;
            return memory::enc_u32_byref(memory, fd_out_ptr, fd);
        }
        None => return Err(Errno::Noent.into()),
    };

    let existing = fs::symlink_metadata(&host).ok();
    // O_EXCL refuses any existing target, directories included; the host
    // openat would never be reached for those, so check here.
    if oflags.contains(Oflags::EXCL) && existing.is_some() {
        return Err(Errno::Exist.into());
    }
    let opens_directory = match &existing {
        Some(meta) => meta.is_dir(),
        None => false,
    };

    if oflags.contains(Oflags::DIRECTORY) && oflags.contains(Oflags::CREAT) {
        return Err(Errno::Inval.into());
    }

    let new_entry = if opens_directory || oflags.contains(Oflags::DIRECTORY) {
        let meta = existing.ok_or(Errno::Noent)?;
        if !meta.is_dir() {
            return Err(Errno::Notdir.into());
        }
        if write {
            return Err(Errno::Isdir.into());
        }
        let rights = requested.restrict(&EntryRights::new(
            Rights::directory_base(),
            Rights::directory_inheriting(),
        ));
        Entry::new(
            Filetype::Directory,
            resolved.guest,
            Handle::Dir(host),
            access,
            rights,
            false,
        )
    } else {
        let file = open_host_file(&host, read, write, oflags, fdflags, dirflags)?;
        let meta = file.metadata()?;
        let file_type = crate::sys::filetype_from_metadata(&meta);
        let rights = requested.restrict(&EntryRights::new(
            Rights::regular_file_base(),
            Rights::regular_file_inheriting(),
        ));
        let entry = Entry::new(
            file_type,
            resolved.guest,
            Handle::OsFile(std::sync::Mutex::new(file)),
            access,
            rights,
            false,
        );
        entry.set_fdflags(fdflags);
        entry
    };

    let fd = fs.table.push(new_entry)?;
    trace!("     | *fd={:?}", fd);
    // On success the out-pointer is written exactly once; any earlier
    // failure leaves it untouched.
    memory::enc_u32_byref(memory, fd_out_ptr, fd)
}

fn access_mode(read: bool, write: bool) -> AccessMode {
    let mut access = AccessMode::empty();
    if read {
        access |= AccessMode::READ;
    }
    if write {
        access |= AccessMode::WRITE;
    }
    access
}

fn open_host_file(
    host: &std::path::Path,
    read: bool,
    write: bool,
    oflags: Oflags,
    fdflags: Fdflags,
    dirflags: Lookupflags,
) -> Result<fs::File> {
    let mut opts = fs::OpenOptions::new();
    // Stat-only opens (neither data right requested) still need a host
    // access mode; reading is the harmless choice.
    opts.read(read || !write);
    if write {
        if fdflags.contains(Fdflags::APPEND) {
            opts.append(true);
        } else {
            opts.write(true);
        }
    }
    if oflags.contains(Oflags::CREAT) {
        if oflags.contains(Oflags::EXCL) {
            opts.create_new(true);
        } else {
            opts.create(true);
        }
    }
    if oflags.contains(Oflags::TRUNC) {
        opts.truncate(true);
    }
    #[cfg(unix)]
    if !dirflags.contains(Lookupflags::SYMLINK_FOLLOW) {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_NOFOLLOW);
    }
    #[cfg(not(unix))]
    let _ = dirflags;
    Ok(opts.open(host)?)
}

pub(crate) fn path_readlink(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: Fd,
    path_ptr: GuestPtr,
    path_len: u32,
    buf_ptr: GuestPtr,
    buf_len: u32,
    bufused_ptr: GuestPtr,
) -> Result<()> {
    let entry = dir_entry(fs, dirfd, Rights::PATH_READLINK)?;
    let host = resolve_path(fs, &entry, memory, path_ptr, path_len, Lookupflags::empty())?
        .host()?;
    let target = fs::read_link(host)?;
    let target = target.to_str().ok_or(Errno::Ilseq)?.as_bytes();
    // Like posix readlink(2), silently truncate when the destination buffer
    // is too small.
    let used = target.len().min(buf_len as usize);
    memory::enc_slice_of_u8(memory, &target[..used], buf_ptr)?;
    memory::enc_u32_byref(memory, bufused_ptr, used.try_into()?)
}

pub(crate) fn path_remove_directory(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: Fd,
    path_ptr: GuestPtr,
    path_len: u32,
) -> Result<()> {
    trace!("path_remove_directory(dirfd={})", dirfd);
    let entry = dir_entry(fs, dirfd, Rights::PATH_REMOVE_DIRECTORY)?;
    let host = resolve_path(fs, &entry, memory, path_ptr, path_len, Lookupflags::empty())?
        .host()?;
    fs::remove_dir(host)?;
    Ok(())
}

pub(crate) fn path_rename(
    fs: &WasiFs,
    memory: &mut [u8],
    old_dirfd: Fd,
    old_path_ptr: GuestPtr,
    old_path_len: u32,
    new_dirfd: Fd,
    new_path_ptr: GuestPtr,
    new_path_len: u32,
) -> Result<()> {
    trace!("path_rename(old_dirfd={}, new_dirfd={})", old_dirfd, new_dirfd);
    let old_entry = dir_entry(fs, old_dirfd, Rights::PATH_RENAME_SOURCE)?;
    let new_entry = dir_entry(fs, new_dirfd, Rights::PATH_RENAME_TARGET)?;
    let old_host = resolve_path(
        fs,
        &old_entry,
        memory,
        old_path_ptr,
        old_path_len,
        Lookupflags::empty(),
    )?
    .host()?;
    let new_host = resolve_path(
        fs,
        &new_entry,
        memory,
        new_path_ptr,
        new_path_len,
        Lookupflags::empty(),
    )?
    .host()?;
    // Renaming across preopens is fine as long as the host can do it
    // atomically; crossing filesystems surfaces as Xdev.
    fs::rename(old_host, new_host)?;
    Ok(())
}

pub(crate) fn path_symlink(
    fs: &WasiFs,
    memory: &mut [u8],
    old_path_ptr: GuestPtr,
    old_path_len: u32,
    dirfd: Fd,
    new_path_ptr: GuestPtr,
    new_path_len: u32,
) -> Result<()> {
    trace!("path_symlink(dirfd={})", dirfd);
    let entry = dir_entry(fs, dirfd, Rights::PATH_SYMLINK)?;
    // The link target is stored verbatim; containment is enforced when the
    // link is resolved, not when it is created.
    let target = memory::dec_path(memory, old_path_ptr, old_path_len)?;
    let new_host = resolve_path(
        fs,
        &entry,
        memory,
        new_path_ptr,
        new_path_len,
        Lookupflags::empty(),
    )?
    .host()?;
    symlink(&target, &new_host)
}

#[cfg(unix)]
fn symlink(target: &str, link: &std::path::Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(_target: &str, _link: &std::path::Path) -> Result<()> {
    Err(Errno::Notsup.into())
}

pub(crate) fn path_unlink_file(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: Fd,
    path_ptr: GuestPtr,
    path_len: u32,
) -> Result<()> {
    trace!("path_unlink_file(dirfd={})", dirfd);
    let entry = dir_entry(fs, dirfd, Rights::PATH_UNLINK_FILE)?;
    let host = resolve_path(fs, &entry, memory, path_ptr, path_len, Lookupflags::empty())?
        .host()?;
    fs::remove_file(host)?;
    Ok(())
}
