//! End-to-end scenarios driven through the hostcall surface, with a plain
//! `Vec<u8>` standing in for guest linear memory and tempdir sandboxes for
//! the host side.

use std::fs;
use std::io;
use wasi_hostfs::pipe::{ReadPipe, WritePipe};
use wasi_hostfs::wasi::{Errno, Fdflags, Lookupflags, Oflags, Rights};
use wasi_hostfs::{hostcalls, WasiFs};

const PATH: u32 = 1024;
const IOVEC: u32 = 2048;
const DATA: u32 = 4096;
const OUT: u32 = 8192;
const DIRBUF: u32 = 16384;

fn guest_memory() -> Vec<u8> {
    vec![0; 65536]
}

fn put_bytes(memory: &mut [u8], at: u32, bytes: &[u8]) {
    memory[at as usize..at as usize + bytes.len()].copy_from_slice(bytes);
}

fn put_iovec(memory: &mut [u8], at: u32, buf: u32, len: u32) {
    put_bytes(memory, at, &buf.to_le_bytes());
    put_bytes(memory, at + 4, &len.to_le_bytes());
}

fn u32_at(memory: &[u8], at: u32) -> u32 {
    u32::from_le_bytes(memory[at as usize..at as usize + 4].try_into().unwrap())
}

fn u64_at(memory: &[u8], at: u32) -> u64 {
    u64::from_le_bytes(memory[at as usize..at as usize + 8].try_into().unwrap())
}

fn sandbox() -> (tempfile::TempDir, WasiFs) {
    let dir = tempfile::tempdir().unwrap();
    let fs = WasiFs::builder(dir.path())
        .preopened_dir(dir.path(), "/")
        .build()
        .unwrap();
    (dir, fs)
}

fn open(
    fs: &WasiFs,
    memory: &mut [u8],
    dirfd: u32,
    path: &str,
    oflags: Oflags,
    base: Rights,
) -> Result<u32, Errno> {
    put_bytes(memory, PATH, path.as_bytes());
    let errno = hostcalls::path_open(
        fs,
        memory,
        dirfd,
        Lookupflags::SYMLINK_FOLLOW.bits(),
        PATH,
        path.len() as u32,
        oflags.bits(),
        base.bits(),
        0,
        0,
        OUT,
    );
    if errno == Errno::Success {
        Ok(u32_at(memory, OUT))
    } else {
        Err(errno)
    }
}

fn write(fs: &WasiFs, memory: &mut [u8], fd: u32, bytes: &[u8]) -> Result<u32, Errno> {
    put_bytes(memory, DATA, bytes);
    put_iovec(memory, IOVEC, DATA, bytes.len() as u32);
    let errno = hostcalls::fd_write(fs, memory, fd, IOVEC, 1, OUT + 16);
    if errno == Errno::Success {
        Ok(u32_at(memory, OUT + 16))
    } else {
        Err(errno)
    }
}

fn read(fs: &WasiFs, memory: &mut [u8], fd: u32, len: u32) -> Result<Vec<u8>, Errno> {
    put_iovec(memory, IOVEC, DATA, len);
    let errno = hostcalls::fd_read(fs, memory, fd, IOVEC, 1, OUT + 16);
    if errno == Errno::Success {
        let n = u32_at(memory, OUT + 16);
        Ok(memory[DATA as usize..(DATA + n) as usize].to_vec())
    } else {
        Err(errno)
    }
}

#[test]
fn write_then_reopen_and_read_back() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();

    let fd = open(
        &fs,
        &mut memory,
        3,
        "hello.txt",
        Oflags::CREAT | Oflags::TRUNC,
        Rights::FD_READ | Rights::FD_WRITE,
    )
    .unwrap();
    assert_eq!(write(&fs, &mut memory, fd, b"hi").unwrap(), 2);
    assert_eq!(hostcalls::fd_close(&fs, fd), Errno::Success);

    let fd = open(&fs, &mut memory, 3, "hello.txt", Oflags::empty(), Rights::FD_READ).unwrap();
    assert_eq!(read(&fs, &mut memory, fd, 2).unwrap(), b"hi");
    assert_eq!(hostcalls::fd_close(&fs, fd), Errno::Success);
}

#[test]
fn dot_dot_escape_is_not_capable() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    let err = open(
        &fs,
        &mut memory,
        3,
        "../../etc/passwd",
        Oflags::empty(),
        Rights::FD_READ,
    )
    .unwrap_err();
    assert_eq!(err, Errno::Notcapable);
    // The out-pointer must be untouched on failure.
    assert_eq!(u32_at(&memory, OUT), 0);
}

#[test]
fn rights_narrow_monotonically() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    let fd = open(
        &fs,
        &mut memory,
        3,
        "file.txt",
        Oflags::CREAT,
        Rights::FD_READ | Rights::FD_WRITE,
    )
    .unwrap();

    assert_eq!(
        hostcalls::fd_fdstat_set_rights(&fs, fd, Rights::FD_READ.bits(), 0),
        Errno::Success
    );
    // Once dropped, FD_WRITE cannot come back.
    assert_eq!(
        hostcalls::fd_fdstat_set_rights(
            &fs,
            fd,
            (Rights::FD_READ | Rights::FD_WRITE).bits(),
            0
        ),
        Errno::Notcapable
    );
    // And the write path now fails the rights check.
    assert_eq!(write(&fs, &mut memory, fd, b"x").unwrap_err(), Errno::Notcapable);
}

#[test]
fn child_rights_must_nest_in_parent_inheriting() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    // SOCK_SHUTDOWN is never part of a directory's inheriting set, so
    // requesting it for the child must be refused, not narrowed away.
    let err = open(
        &fs,
        &mut memory,
        3,
        "file.txt",
        Oflags::CREAT,
        Rights::FD_READ | Rights::SOCK_SHUTDOWN,
    )
    .unwrap_err();
    assert_eq!(err, Errno::Notcapable);
}

#[test]
fn seek_on_stdout_pipe_is_spipe() {
    let dir = tempfile::tempdir().unwrap();
    let fs = WasiFs::builder(dir.path())
        .stdout(WritePipe::new(io::sink()))
        .build()
        .unwrap();
    let mut memory = guest_memory();
    // whence=1 is CUR.
    assert_eq!(
        hostcalls::fd_seek(&fs, &mut memory, 1, 0, 1, OUT),
        Errno::Spipe
    );
}

#[test]
fn readdir_yields_every_entry_exactly_once() {
    let (dir, fs) = sandbox();
    for name in ["a", "b", "c"] {
        fs::write(dir.path().join(name), b"x").unwrap();
    }
    let mut memory = guest_memory();

    // One big buffer: all three entries, terminated by bufused < buf_len.
    let errno = hostcalls::fd_readdir(&fs, &mut memory, 3, DIRBUF, 512, 0, OUT);
    assert_eq!(errno, Errno::Success);
    let bufused = u32_at(&memory, OUT);
    assert!(bufused < 512);
    assert_eq!(bufused, 3 * (24 + 1));

    // Tiny buffer: resume via the cookie, collecting one entry per call.
    let mut names = Vec::new();
    let mut cookie = 0u64;
    loop {
        let errno = hostcalls::fd_readdir(&fs, &mut memory, 3, DIRBUF, 32, cookie, OUT);
        assert_eq!(errno, Errno::Success);
        let bufused = u32_at(&memory, OUT);
        if bufused == 0 {
            break;
        }
        let next = u64_at(&memory, DIRBUF);
        let namlen = u32_at(&memory, DIRBUF + 16);
        let name_start = (DIRBUF + 24) as usize;
        names.push(String::from_utf8(memory[name_start..name_start + namlen as usize].to_vec()).unwrap());
        if bufused < 32 {
            break;
        }
        cookie = next;
    }
    assert_eq!(names, ["a", "b", "c"]);
}

#[test]
fn unlink_is_not_capable_when_deletion_is_disallowed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("victim.txt"), b"data").unwrap();
    let fs = WasiFs::builder(dir.path())
        .preopened_dir(dir.path(), "/")
        .allow_delete(false)
        .build()
        .unwrap();
    let mut memory = guest_memory();
    put_bytes(&mut memory, PATH, b"victim.txt");
    assert_eq!(
        hostcalls::path_unlink_file(&fs, &mut memory, 3, PATH, 10),
        Errno::Notcapable
    );
    assert!(dir.path().join("victim.txt").exists());
}

#[test]
fn dev_null_reads_empty_and_discards_writes() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    let fd = open(
        &fs,
        &mut memory,
        3,
        "dev/null",
        Oflags::empty(),
        Rights::FD_READ | Rights::FD_WRITE,
    )
    .unwrap();
    assert_eq!(write(&fs, &mut memory, fd, b"discarded").unwrap(), 9);
    assert_eq!(read(&fs, &mut memory, fd, 16).unwrap(), b"");
    assert_eq!(hostcalls::fd_close(&fs, fd), Errno::Success);
}

#[test]
fn fd_three_is_badf_without_preopens() {
    let dir = tempfile::tempdir().unwrap();
    let fs = WasiFs::builder(dir.path()).build().unwrap();
    let mut memory = guest_memory();
    assert_eq!(
        hostcalls::fd_fdstat_get(&fs, &mut memory, 3, OUT),
        Errno::Badf
    );
    assert_eq!(
        hostcalls::fd_prestat_get(&fs, &mut memory, 3, OUT),
        Errno::Badf
    );
}

#[test]
fn writing_to_stdin_is_not_capable() {
    let dir = tempfile::tempdir().unwrap();
    let fs = WasiFs::builder(dir.path())
        .stdin(ReadPipe::from("input"))
        .build()
        .unwrap();
    let mut memory = guest_memory();
    assert_eq!(write(&fs, &mut memory, 0, b"nope").unwrap_err(), Errno::Notcapable);
    // Reading stdin works and drains the pipe.
    assert_eq!(read(&fs, &mut memory, 0, 5).unwrap(), b"input");
}

#[test]
fn prestat_reports_the_guest_path() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    assert_eq!(
        hostcalls::fd_prestat_get(&fs, &mut memory, 3, OUT),
        Errno::Success
    );
    // tag dir, then the name length.
    assert_eq!(memory[OUT as usize], 0);
    assert_eq!(u32_at(&memory, OUT + 4), 1);
    assert_eq!(
        hostcalls::fd_prestat_dir_name(&fs, &mut memory, 3, PATH, 1),
        Errno::Success
    );
    assert_eq!(&memory[PATH as usize..PATH as usize + 1], b"/");
    assert_eq!(
        hostcalls::fd_prestat_dir_name(&fs, &mut memory, 3, PATH, 0),
        Errno::Nametoolong
    );
}

#[test]
fn seek_and_tell_track_the_file_cursor() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    let fd = open(
        &fs,
        &mut memory,
        3,
        "cursor.txt",
        Oflags::CREAT,
        Rights::FD_READ | Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL,
    )
    .unwrap();
    assert_eq!(write(&fs, &mut memory, fd, b"abcdef").unwrap(), 6);
    // SET(0) to 1, then read two bytes.
    assert_eq!(hostcalls::fd_seek(&fs, &mut memory, fd, 1, 0, OUT), Errno::Success);
    assert_eq!(u64_at(&memory, OUT), 1);
    assert_eq!(read(&fs, &mut memory, fd, 2).unwrap(), b"bc");
    assert_eq!(hostcalls::fd_tell(&fs, &mut memory, fd, OUT), Errno::Success);
    assert_eq!(u64_at(&memory, OUT), 3);
    // END(-1) lands on the last byte.
    assert_eq!(hostcalls::fd_seek(&fs, &mut memory, fd, -1, 2, OUT), Errno::Success);
    assert_eq!(u64_at(&memory, OUT), 5);
}

#[test]
fn pread_does_not_move_the_cursor() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    let fd = open(
        &fs,
        &mut memory,
        3,
        "pread.txt",
        Oflags::CREAT,
        Rights::FD_READ | Rights::FD_WRITE | Rights::FD_SEEK | Rights::FD_TELL,
    )
    .unwrap();
    write(&fs, &mut memory, fd, b"0123456789").unwrap();
    hostcalls::fd_seek(&fs, &mut memory, fd, 0, 0, OUT);

    put_iovec(&mut memory, IOVEC, DATA, 4);
    assert_eq!(
        hostcalls::fd_pread(&fs, &mut memory, fd, IOVEC, 1, 6, OUT + 16),
        Errno::Success
    );
    assert_eq!(u32_at(&memory, OUT + 16), 4);
    assert_eq!(&memory[DATA as usize..DATA as usize + 4], b"6789");

    hostcalls::fd_tell(&fs, &mut memory, fd, OUT);
    assert_eq!(u64_at(&memory, OUT), 0, "pread must not advance the offset");
}

#[test]
fn renumber_then_close_leaves_no_descriptor() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    let a = open(&fs, &mut memory, 3, "a.txt", Oflags::CREAT, Rights::FD_WRITE).unwrap();
    let b = open(&fs, &mut memory, 3, "b.txt", Oflags::CREAT, Rights::FD_WRITE).unwrap();
    assert_eq!(hostcalls::fd_renumber(&fs, a, b), Errno::Success);
    assert_eq!(hostcalls::fd_close(&fs, b), Errno::Success);
    assert_eq!(hostcalls::fd_close(&fs, a), Errno::Badf);
    assert_eq!(hostcalls::fd_close(&fs, b), Errno::Badf);
}

#[test]
fn open_files_are_bounded_by_the_configured_max() {
    let dir = tempfile::tempdir().unwrap();
    // Three stdio slots plus the preopen leave room for exactly one file.
    let fs = WasiFs::builder(dir.path())
        .preopened_dir(dir.path(), "/")
        .max_open_files(5)
        .build()
        .unwrap();
    let mut memory = guest_memory();
    let _fd = open(&fs, &mut memory, 3, "one.txt", Oflags::CREAT, Rights::FD_WRITE).unwrap();
    let err = open(&fs, &mut memory, 3, "two.txt", Oflags::CREAT, Rights::FD_WRITE).unwrap_err();
    assert_eq!(err, Errno::Nfile);
    // Closing frees a slot again.
    assert_eq!(hostcalls::fd_close(&fs, _fd), Errno::Success);
    assert!(open(&fs, &mut memory, 3, "two.txt", Oflags::CREAT, Rights::FD_WRITE).is_ok());
}

#[test]
fn exclusive_create_refuses_existing_targets() {
    let (dir, fs) = sandbox();
    let mut memory = guest_memory();

    // A fresh path opens fine with CREAT|EXCL...
    let fd = open(
        &fs,
        &mut memory,
        3,
        "fresh.txt",
        Oflags::CREAT | Oflags::EXCL,
        Rights::FD_WRITE,
    )
    .unwrap();
    assert_eq!(hostcalls::fd_close(&fs, fd), Errno::Success);

    // ...but an existing file is refused,
    let err = open(
        &fs,
        &mut memory,
        3,
        "fresh.txt",
        Oflags::CREAT | Oflags::EXCL,
        Rights::FD_WRITE,
    )
    .unwrap_err();
    assert_eq!(err, Errno::Exist);

    // and so is an existing directory, which the host open never sees.
    fs::create_dir(dir.path().join("taken")).unwrap();
    let err = open(
        &fs,
        &mut memory,
        3,
        "taken",
        Oflags::CREAT | Oflags::EXCL,
        Rights::FD_READ,
    )
    .unwrap_err();
    assert_eq!(err, Errno::Exist);
}

#[test]
fn append_mode_honors_the_flag() {
    let (dir, fs) = sandbox();
    let mut memory = guest_memory();
    fs::write(dir.path().join("log.txt"), b"start:").unwrap();
    let fd = open(
        &fs,
        &mut memory,
        3,
        "log.txt",
        Oflags::empty(),
        Rights::FD_WRITE | Rights::FD_FDSTAT_SET_FLAGS,
    )
    .unwrap();
    assert_eq!(
        hostcalls::fd_fdstat_set_flags(&fs, fd, Fdflags::APPEND.bits()),
        Errno::Success
    );
    write(&fs, &mut memory, fd, b"tail").unwrap();
    assert_eq!(fs::read(dir.path().join("log.txt")).unwrap(), b"start:tail");
}

#[test]
fn create_directory_enumerate_and_remove() {
    let (dir, fs) = sandbox();
    let mut memory = guest_memory();
    put_bytes(&mut memory, PATH, b"subdir");
    assert_eq!(
        hostcalls::path_create_directory(&fs, &mut memory, 3, PATH, 6),
        Errno::Success
    );
    assert!(dir.path().join("subdir").is_dir());
    assert_eq!(
        hostcalls::path_remove_directory(&fs, &mut memory, 3, PATH, 6),
        Errno::Success
    );
    assert!(!dir.path().join("subdir").exists());
}

#[cfg(unix)]
#[test]
fn symlink_containment_is_checked_at_resolution() {
    let (dir, fs) = sandbox();
    let mut memory = guest_memory();
    // Creating a link that points outside is allowed...
    put_bytes(&mut memory, PATH, b"/etc/passwd");
    put_bytes(&mut memory, PATH + 512, b"escape");
    assert_eq!(
        hostcalls::path_symlink(&fs, &mut memory, PATH, 11, 3, PATH + 512, 6),
        Errno::Success
    );
    assert!(dir.path().join("escape").symlink_metadata().is_ok());
    // ...but resolving through it is not.
    let err = open(&fs, &mut memory, 3, "escape", Oflags::empty(), Rights::FD_READ).unwrap_err();
    assert_eq!(err, Errno::Notcapable);
}

#[test]
fn filestat_reflects_written_size() {
    let (_dir, fs) = sandbox();
    let mut memory = guest_memory();
    let fd = open(
        &fs,
        &mut memory,
        3,
        "sized.txt",
        Oflags::CREAT,
        Rights::FD_WRITE | Rights::FD_FILESTAT_GET | Rights::FD_FILESTAT_SET_SIZE,
    )
    .unwrap();
    write(&fs, &mut memory, fd, b"12345").unwrap();
    assert_eq!(
        hostcalls::fd_filestat_set_size(&fs, fd, 64),
        Errno::Success
    );
    assert_eq!(
        hostcalls::fd_filestat_get(&fs, &mut memory, fd, OUT),
        Errno::Success
    );
    // size field sits at offset 32, filetype (regular file) at 16.
    assert_eq!(u64_at(&memory, OUT + 32), 64);
    assert_eq!(memory[(OUT + 16) as usize], 4);
}
