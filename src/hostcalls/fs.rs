use crate::ctx::WasiFs;
use crate::wasi::{Dircookie, Errno, Fd, Filedelta, Filesize, GuestPtr, Timestamp};

hostcalls! {
    pub fn fd_close(fs: &WasiFs, fd: Fd,) -> Errno;

    pub fn fd_datasync(fs: &WasiFs, fd: Fd,) -> Errno;

    pub fn fd_pread(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        iovs_ptr: GuestPtr,
        iovs_len: u32,
        offset: Filesize,
        nread_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_pwrite(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        iovs_ptr: GuestPtr,
        iovs_len: u32,
        offset: Filesize,
        nwritten_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_read(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        iovs_ptr: GuestPtr,
        iovs_len: u32,
        nread_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_renumber(fs: &WasiFs, from: Fd, to: Fd,) -> Errno;

    pub fn fd_seek(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        offset: Filedelta,
        whence: u8,
        newoffset_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_tell(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        newoffset_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_fdstat_get(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        fdstat_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_fdstat_set_flags(
        fs: &WasiFs,
        fd: Fd,
        fdflags: u16,
    ) -> Errno;

    pub fn fd_fdstat_set_rights(
        fs: &WasiFs,
        fd: Fd,
        fs_rights_base: u64,
        fs_rights_inheriting: u64,
    ) -> Errno;

    pub fn fd_sync(fs: &WasiFs, fd: Fd,) -> Errno;

    pub fn fd_write(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        iovs_ptr: GuestPtr,
        iovs_len: u32,
        nwritten_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_advise(
        fs: &WasiFs,
        fd: Fd,
        offset: Filesize,
        len: Filesize,
        advice: u8,
    ) -> Errno;

    pub fn fd_allocate(
        fs: &WasiFs,
        fd: Fd,
        offset: Filesize,
        len: Filesize,
    ) -> Errno;

    pub fn fd_filestat_get(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        filestat_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_filestat_set_size(
        fs: &WasiFs,
        fd: Fd,
        st_size: Filesize,
    ) -> Errno;

    pub fn fd_filestat_set_times(
        fs: &WasiFs,
        fd: Fd,
        st_atim: Timestamp,
        st_mtim: Timestamp,
        fst_flags: u16,
    ) -> Errno;

    pub fn fd_readdir(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        buf: GuestPtr,
        buf_len: u32,
        cookie: Dircookie,
        bufused_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_prestat_get(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        prestat_ptr: GuestPtr,
    ) -> Errno;

    pub fn fd_prestat_dir_name(
        fs: &WasiFs,
        memory: &mut [u8],
        fd: Fd,
        path_ptr: GuestPtr,
        path_len: u32,
    ) -> Errno;

    pub fn path_create_directory(
        fs: &WasiFs,
        memory: &mut [u8],
        dirfd: Fd,
        path_ptr: GuestPtr,
        path_len: u32,
    ) -> Errno;

    pub fn path_filestat_get(
        fs: &WasiFs,
        memory: &mut [u8],
        dirfd: Fd,
        dirflags: u32,
        path_ptr: GuestPtr,
        path_len: u32,
        filestat_ptr: GuestPtr,
    ) -> Errno;

    pub fn path_filestat_set_times(
        fs: &WasiFs,
        memory: &mut [u8],
        dirfd: Fd,
        dirflags: u32,
        path_ptr: GuestPtr,
        path_len: u32,
        st_atim: Timestamp,
        st_mtim: Timestamp,
        fst_flags: u16,
    ) -> Errno;

    pub fn path_link(
        fs: &WasiFs,
        memory: &mut [u8],
        old_dirfd: Fd,
        old_flags: u32,
        old_path_ptr: GuestPtr,
        old_path_len: u32,
        new_dirfd: Fd,
        new_path_ptr: GuestPtr,
        new_path_len: u32,
    ) -> Errno;

    pub fn path_open(
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
    ) -> Errno;

    pub fn path_readlink(
        fs: &WasiFs,
        memory: &mut [u8],
        dirfd: Fd,
        path_ptr: GuestPtr,
        path_len: u32,
        buf_ptr: GuestPtr,
        buf_len: u32,
        bufused_ptr: GuestPtr,
    ) -> Errno;

    pub fn path_remove_directory(
        fs: &WasiFs,
        memory: &mut [u8],
        dirfd: Fd,
        path_ptr: GuestPtr,
        path_len: u32,
    ) -> Errno;

    pub fn path_rename(
        fs: &WasiFs,
        memory: &mut [u8],
        old_dirfd: Fd,
        old_path_ptr: GuestPtr,
        old_path_len: u32,
        new_dirfd: Fd,
        new_path_ptr: GuestPtr,
        new_path_len: u32,
    ) -> Errno;

    pub fn path_symlink(
        fs: &WasiFs,
        memory: &mut [u8],
        old_path_ptr: GuestPtr,
        old_path_len: u32,
        dirfd: Fd,
        new_path_ptr: GuestPtr,
        new_path_len: u32,
    ) -> Errno;

    pub fn path_unlink_file(
        fs: &WasiFs,
        memory: &mut [u8],
        dirfd: Fd,
        path_ptr: GuestPtr,
        path_len: u32,
    ) -> Errno;
}
