//! The backing object of a descriptor.
//!
//! A `Handle` is a tagged variant over the stream kinds the host knows how
//! to serve: an open host file, a host directory, the `/dev/null` sink, and
//! the two pipe directions used for stdio. Hostcalls query capability bits
//! (`can_read`, `can_seek`, ...) instead of matching on the variant, and the
//! per-operation methods translate host failures into preview1 errnos at
//! this single boundary.

use crate::pipe::{ReadPipe, WritePipe};
use crate::sys;
use crate::wasi::{Dircookie, Dirent, Errno, Filestat, Filetype, Timestamp};
use crate::Result;
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

pub(crate) enum Handle {
    /// An open host file. The mutex serializes stream operations on the
    /// descriptor; the file's own cursor is the descriptor offset.
    OsFile(Mutex<File>),
    /// A host directory. Directories never own a byte stream; the handle is
    /// the resolved host path.
    Dir(PathBuf),
    /// Reads return 0 bytes, writes discard.
    DevNull,
    /// Stdin-style byte source.
    ReadPipe(ReadPipe),
    /// Stdout/stderr-style byte sink.
    WritePipe(WritePipe),
}

impl Handle {
    pub fn can_read(&self) -> bool {
        matches!(self, Self::OsFile(_) | Self::DevNull | Self::ReadPipe(_))
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::OsFile(_) | Self::DevNull | Self::WritePipe(_))
    }

    #[allow(unused)]
    pub fn can_seek(&self) -> bool {
        matches!(self, Self::OsFile(_) | Self::DevNull)
    }

    /// A stream is open iff probing any capability succeeds; a handle that
    /// serves none of them backs a disposed descriptor.
    #[allow(unused)]
    pub fn is_open(&self) -> bool {
        self.can_read() || self.can_write() || matches!(self, Self::Dir(_))
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::OsFile(file) => Ok(file.lock().unwrap().read(buf)?),
            Self::DevNull => Ok(0),
            Self::ReadPipe(pipe) => Ok(pipe.read(buf)?),
            Self::WritePipe(_) => Err(Errno::Badf.into()),
            Self::Dir(_) => Err(Errno::Isdir.into()),
        }
    }

    pub fn write(&self, buf: &[u8], append: bool) -> Result<usize> {
        match self {
            Self::OsFile(file) => {
                let mut file = file.lock().unwrap();
                if append {
                    file.seek(SeekFrom::End(0))?;
                }
                Ok(file.write(buf)?)
            }
            Self::DevNull => Ok(buf.len()),
            Self::WritePipe(pipe) => Ok(pipe.write(buf)?),
            Self::ReadPipe(_) => Err(Errno::Badf.into()),
            Self::Dir(_) => Err(Errno::Isdir.into()),
        }
    }

    pub fn pread(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        match self {
            Self::OsFile(file) => Ok(sys::pread(&file.lock().unwrap(), buf, offset)?),
            Self::DevNull => Ok(0),
            Self::ReadPipe(_) | Self::WritePipe(_) => Err(Errno::Spipe.into()),
            Self::Dir(_) => Err(Errno::Isdir.into()),
        }
    }

    pub fn pwrite(&self, buf: &[u8], offset: u64) -> Result<usize> {
        match self {
            Self::OsFile(file) => Ok(sys::pwrite(&file.lock().unwrap(), buf, offset)?),
            Self::DevNull => Ok(buf.len()),
            Self::ReadPipe(_) | Self::WritePipe(_) => Err(Errno::Spipe.into()),
            Self::Dir(_) => Err(Errno::Isdir.into()),
        }
    }

    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        match self {
            Self::OsFile(file) => Ok(file.lock().unwrap().seek(pos)?),
            Self::DevNull => Ok(0),
            Self::ReadPipe(_) | Self::WritePipe(_) => Err(Errno::Spipe.into()),
            Self::Dir(_) => Err(Errno::Badf.into()),
        }
    }

    pub fn tell(&self) -> Result<u64> {
        self.seek(SeekFrom::Current(0))
    }

    pub fn datasync(&self) -> Result<()> {
        match self {
            Self::OsFile(file) => Ok(file.lock().unwrap().sync_data()?),
            Self::WritePipe(pipe) => Ok(pipe.flush()?),
            _ => Ok(()),
        }
    }

    pub fn sync(&self) -> Result<()> {
        match self {
            Self::OsFile(file) => Ok(file.lock().unwrap().sync_all()?),
            Self::WritePipe(pipe) => Ok(pipe.flush()?),
            _ => Ok(()),
        }
    }

    /// Reserve space by zero-extending the file; a no-op when the region
    /// already fits.
    pub fn allocate(&self, offset: u64, len: u64) -> Result<()> {
        let new_size = offset.checked_add(len).ok_or(Errno::Fbig)?;
        match self {
            Self::OsFile(file) => {
                let file = file.lock().unwrap();
                if file.metadata()?.len() < new_size {
                    file.set_len(new_size)?;
                }
                Ok(())
            }
            _ => Err(Errno::Notsup.into()),
        }
    }

    pub fn set_size(&self, size: u64) -> Result<()> {
        match self {
            Self::OsFile(file) => Ok(file.lock().unwrap().set_len(size)?),
            _ => Err(Errno::Notsup.into()),
        }
    }

    /// Stat the backing object. Descriptors without a host object report a
    /// synthetic filestat carrying only the descriptor's filetype.
    pub fn filestat(&self, filetype: Filetype) -> Result<Filestat> {
        match self {
            Self::OsFile(file) => {
                let meta = file.lock().unwrap().metadata()?;
                Ok(sys::filestat_from_metadata(&meta))
            }
            Self::Dir(path) => {
                let meta = fs::metadata(path)?;
                Ok(sys::filestat_from_metadata(&meta))
            }
            Self::DevNull | Self::ReadPipe(_) | Self::WritePipe(_) => Ok(Filestat {
                dev: 0,
                ino: 0,
                filetype,
                nlink: 0,
                size: 0,
                atim: 0,
                mtim: 0,
                ctim: 0,
            }),
        }
    }

    pub fn set_times(&self, atim: Option<FileTime>, mtim: Option<FileTime>) -> Result<()> {
        match self {
            Self::OsFile(file) => {
                let file = file.lock().unwrap();
                filetime::set_file_handle_times(&file, atim, mtim)?;
                Ok(())
            }
            Self::Dir(path) => {
                let meta = fs::metadata(path)?;
                let atim = atim.unwrap_or_else(|| FileTime::from_last_access_time(&meta));
                let mtim = mtim.unwrap_or_else(|| FileTime::from_last_modification_time(&meta));
                filetime::set_file_times(path, atim, mtim)?;
                Ok(())
            }
            _ => Err(Errno::Badf.into()),
        }
    }

    /// Enumerate a directory from `cookie` onwards.
    ///
    /// Entries are sorted by name so that cookies stay stable across calls:
    /// cookie N is simply "skip the first N entries", and each returned
    /// entity carries the cookie of its successor.
    pub fn readdir(&self, cookie: Dircookie) -> Result<Vec<(Dirent, String)>> {
        let path = match self {
            Self::Dir(path) => path,
            _ => return Err(Errno::Notdir.into()),
        };
        let mut names = Vec::new();
        for dirent in fs::read_dir(path)? {
            let dirent = dirent?;
            let name = dirent
                .file_name()
                .into_string()
                .map_err(|_| Errno::Ilseq)?;
            names.push((name, dirent.metadata().ok()));
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let mut entries = Vec::new();
        for (idx, (name, meta)) in names.into_iter().enumerate() {
            if (idx as Dircookie) < cookie {
                continue;
            }
            let (ino, filetype) = match &meta {
                Some(meta) => (sys::inode(meta), sys::filetype_from_metadata(meta)),
                None => (0, Filetype::Unknown),
            };
            let header = Dirent {
                d_next: idx as Dircookie + 1,
                d_ino: ino,
                d_namlen: name.len().try_into()?,
                d_type: filetype,
            };
            entries.push((header, name));
        }
        Ok(entries)
    }
}

pub(crate) fn systimespec(
    set: bool,
    ts: Timestamp,
    now: bool,
) -> Result<Option<FileTime>> {
    if set && now {
        Err(Errno::Inval.into())
    } else if set {
        Ok(Some(FileTime::from_unix_time(
            (ts / 1_000_000_000) as i64,
            (ts % 1_000_000_000) as u32,
        )))
    } else if now {
        Ok(Some(FileTime::now()))
    } else {
        Ok(None)
    }
}
