//! Functions to store and load preview1 values to and from wasm linear
//! memory, transforming them from and to host data types.
//!
//! Endianness and struct layout concerns are completely encapsulated in this
//! file: callers hold `wasi::*` values and never see the wire bytes. Guest
//! pointers are plain `u32` offsets; every access is bounds-checked against
//! the memory slice (`Fault`) and alignment-checked (`Inval`) before any
//! byte moves.

use crate::wasi::{
    Dirent, Errno, Fdflags, Fdstat, Filestat, Filetype, GuestPtr, Prestat, Rights,
    PREOPENTYPE_DIR,
};
use crate::{Error, Result};

pub(crate) const IOVEC_SIZE: u32 = 8;
pub(crate) const FDSTAT_SIZE: u32 = 24;
pub(crate) const FILESTAT_SIZE: u32 = 64;
pub(crate) const PRESTAT_SIZE: u32 = 8;
pub(crate) const DIRENT_SIZE: u32 = 24;

fn dec_region(memory: &[u8], ptr: GuestPtr, len: usize) -> Result<&[u8]> {
    let start = ptr as usize;
    let end = start.checked_add(len).ok_or(Errno::Fault)?;
    memory.get(start..end).ok_or(Error::Wasi(Errno::Fault))
}

fn dec_region_mut(memory: &mut [u8], ptr: GuestPtr, len: usize) -> Result<&mut [u8]> {
    let start = ptr as usize;
    let end = start.checked_add(len).ok_or(Errno::Fault)?;
    memory.get_mut(start..end).ok_or(Error::Wasi(Errno::Fault))
}

fn check_align(ptr: GuestPtr, align: u32) -> Result<()> {
    if ptr % align != 0 {
        return Err(Errno::Inval.into());
    }
    Ok(())
}

macro_rules! dec_enc_scalar {
    ($ty:ident, $dec_byref:ident, $enc_byref:ident) => {
        pub(crate) fn $dec_byref(memory: &[u8], ptr: GuestPtr) -> Result<$ty> {
            check_align(ptr, std::mem::align_of::<$ty>() as u32)?;
            let raw = dec_region(memory, ptr, std::mem::size_of::<$ty>())?;
            Ok(<$ty>::from_le_bytes(raw.try_into().unwrap()))
        }

        pub(crate) fn $enc_byref(memory: &mut [u8], ptr: GuestPtr, x: $ty) -> Result<()> {
            check_align(ptr, std::mem::align_of::<$ty>() as u32)?;
            let raw = dec_region_mut(memory, ptr, std::mem::size_of::<$ty>())?;
            raw.copy_from_slice(&x.to_le_bytes());
            Ok(())
        }
    };
}

dec_enc_scalar!(u16, dec_u16_byref, enc_u16_byref);
dec_enc_scalar!(u32, dec_u32_byref, enc_u32_byref);
dec_enc_scalar!(u64, dec_u64_byref, enc_u64_byref);

pub(crate) fn dec_slice_of_u8(memory: &[u8], ptr: GuestPtr, len: u32) -> Result<&[u8]> {
    dec_region(memory, ptr, len as usize)
}

pub(crate) fn dec_slice_of_mut_u8(
    memory: &mut [u8],
    ptr: GuestPtr,
    len: u32,
) -> Result<&mut [u8]> {
    dec_region_mut(memory, ptr, len as usize)
}

pub(crate) fn enc_slice_of_u8(memory: &mut [u8], slice: &[u8], ptr: GuestPtr) -> Result<()> {
    let len = u32::try_from(slice.len()).map_err(|_| Errno::Overflow)?;
    dec_region_mut(memory, ptr, len as usize)?.copy_from_slice(slice);
    Ok(())
}

/// Extract a path string from guest memory. Paths must be valid UTF-8 and
/// must not embed NUL bytes; both violations surface as `Ilseq`.
pub(crate) fn dec_path(memory: &[u8], ptr: GuestPtr, len: u32) -> Result<String> {
    let bytes = dec_slice_of_u8(memory, ptr, len)?;
    let path = std::str::from_utf8(bytes)?;
    if path.contains('\0') {
        return Err(Errno::Ilseq.into());
    }
    Ok(path.to_owned())
}

/// Decode an `iovec`/`ciovec` array into `(buf, buf_len)` pairs.
///
/// Both flavors share one wire layout (ptr u32, len u32). Every referenced
/// buffer region is validated here so that later per-buffer accesses cannot
/// fault halfway through a transfer.
pub(crate) fn dec_iovec_slice(
    memory: &[u8],
    ptr: GuestPtr,
    len: u32,
) -> Result<Vec<(GuestPtr, u32)>> {
    check_align(ptr, 4)?;
    let len_bytes = len.checked_mul(IOVEC_SIZE).ok_or(Errno::Overflow)?;
    let raw = dec_region(memory, ptr, len_bytes as usize)?;

    let mut iovs = Vec::with_capacity(len as usize);
    for chunk in raw.chunks_exact(IOVEC_SIZE as usize) {
        let buf = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
        let buf_len = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
        iovs.push((buf, buf_len));
    }
    for (buf, buf_len) in &iovs {
        dec_region(memory, *buf, *buf_len as usize)?;
    }
    Ok(iovs)
}

pub(crate) fn enc_fdstat_byref(memory: &mut [u8], ptr: GuestPtr, fdstat: Fdstat) -> Result<()> {
    check_align(ptr, 8)?;
    let raw = dec_region_mut(memory, ptr, FDSTAT_SIZE as usize)?;
    raw.fill(0);
    raw[0] = fdstat.fs_filetype as u8;
    raw[2..4].copy_from_slice(&fdstat.fs_flags.bits().to_le_bytes());
    raw[8..16].copy_from_slice(&fdstat.fs_rights_base.bits().to_le_bytes());
    raw[16..24].copy_from_slice(&fdstat.fs_rights_inheriting.bits().to_le_bytes());
    Ok(())
}

pub(crate) fn dec_fdstat_byref(memory: &[u8], ptr: GuestPtr) -> Result<Fdstat> {
    check_align(ptr, 8)?;
    let raw = dec_region(memory, ptr, FDSTAT_SIZE as usize)?;
    let filetype = filetype_from_raw(raw[0])?;
    let flags = u16::from_le_bytes(raw[2..4].try_into().unwrap());
    let base = u64::from_le_bytes(raw[8..16].try_into().unwrap());
    let inheriting = u64::from_le_bytes(raw[16..24].try_into().unwrap());
    Ok(Fdstat {
        fs_filetype: filetype,
        fs_flags: Fdflags::from_bits(flags).ok_or(Errno::Inval)?,
        fs_rights_base: Rights::from_bits(base).ok_or(Errno::Inval)?,
        fs_rights_inheriting: Rights::from_bits(inheriting).ok_or(Errno::Inval)?,
    })
}

pub(crate) fn enc_filestat_byref(
    memory: &mut [u8],
    ptr: GuestPtr,
    filestat: Filestat,
) -> Result<()> {
    check_align(ptr, 8)?;
    let raw = dec_region_mut(memory, ptr, FILESTAT_SIZE as usize)?;
    raw.fill(0);
    raw[0..8].copy_from_slice(&filestat.dev.to_le_bytes());
    raw[8..16].copy_from_slice(&filestat.ino.to_le_bytes());
    raw[16] = filestat.filetype as u8;
    raw[24..32].copy_from_slice(&filestat.nlink.to_le_bytes());
    raw[32..40].copy_from_slice(&filestat.size.to_le_bytes());
    raw[40..48].copy_from_slice(&filestat.atim.to_le_bytes());
    raw[48..56].copy_from_slice(&filestat.mtim.to_le_bytes());
    raw[56..64].copy_from_slice(&filestat.ctim.to_le_bytes());
    Ok(())
}

pub(crate) fn dec_filestat_byref(memory: &[u8], ptr: GuestPtr) -> Result<Filestat> {
    check_align(ptr, 8)?;
    let raw = dec_region(memory, ptr, FILESTAT_SIZE as usize)?;
    Ok(Filestat {
        dev: u64::from_le_bytes(raw[0..8].try_into().unwrap()),
        ino: u64::from_le_bytes(raw[8..16].try_into().unwrap()),
        filetype: filetype_from_raw(raw[16])?,
        nlink: u64::from_le_bytes(raw[24..32].try_into().unwrap()),
        size: u64::from_le_bytes(raw[32..40].try_into().unwrap()),
        atim: u64::from_le_bytes(raw[40..48].try_into().unwrap()),
        mtim: u64::from_le_bytes(raw[48..56].try_into().unwrap()),
        ctim: u64::from_le_bytes(raw[56..64].try_into().unwrap()),
    })
}

pub(crate) fn enc_prestat_byref(memory: &mut [u8], ptr: GuestPtr, prestat: Prestat) -> Result<()> {
    check_align(ptr, 4)?;
    let raw = dec_region_mut(memory, ptr, PRESTAT_SIZE as usize)?;
    raw.fill(0);
    raw[0] = PREOPENTYPE_DIR;
    raw[4..8].copy_from_slice(&prestat.pr_name_len.to_le_bytes());
    Ok(())
}

/// Serialize a dirent header to its 24-byte wire form. `fd_readdir` copies
/// these bytes (possibly truncated) straight into the guest buffer, so the
/// little-endian conversion happens here and nowhere else.
pub(crate) fn dirent_to_bytes(dirent: Dirent) -> [u8; DIRENT_SIZE as usize] {
    let mut raw = [0; DIRENT_SIZE as usize];
    raw[0..8].copy_from_slice(&dirent.d_next.to_le_bytes());
    raw[8..16].copy_from_slice(&dirent.d_ino.to_le_bytes());
    raw[16..20].copy_from_slice(&dirent.d_namlen.to_le_bytes());
    raw[20] = dirent.d_type as u8;
    raw
}

fn filetype_from_raw(raw: u8) -> Result<Filetype> {
    match raw {
        0 => Ok(Filetype::Unknown),
        1 => Ok(Filetype::BlockDevice),
        2 => Ok(Filetype::CharacterDevice),
        3 => Ok(Filetype::Directory),
        4 => Ok(Filetype::RegularFile),
        5 => Ok(Filetype::SocketDgram),
        6 => Ok(Filetype::SocketStream),
        7 => Ok(Filetype::SymbolicLink),
        _ => Err(Errno::Inval.into()),
    }
}
