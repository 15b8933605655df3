//! A WASI snapshot-preview1 filesystem host.
//!
//! This crate implements the filesystem and standard-stream half of the
//! `wasi_snapshot_preview1` interface as an embeddable library: a runtime
//! hands each hostcall the guest's linear memory and the raw arguments, and
//! gets back a preview1 errno.
//!
//! The moving parts:
//!
//! - a descriptor table ([`ctx::WasiFs`] owns it) mapping guest fds to
//!   entries, with smallest-free id allocation and a configurable cap;
//! - a preopen path mapper translating guest paths to host paths and
//!   containing every resolution -- `..` hops and symlinks included --
//!   within the preopened roots;
//! - the preview1 rights model: every operation checks its required rights
//!   against the descriptor, and rights only ever narrow;
//! - an ABI codec reading and writing the preview1 structs (`fdstat`,
//!   `filestat`, `prestat`, `dirent`, `iovec`) in guest memory, with every
//!   pointer/length pair bounds-checked.
//!
//! ```no_run
//! use wasi_hostfs::{hostcalls, WasiFs};
//!
//! # fn main() -> anyhow::Result<()> {
//! let fs = WasiFs::builder("/tmp/sandbox")
//!     .preopened_dir("/tmp/sandbox", "/")
//!     .build()?;
//! let mut memory = vec![0u8; 65536]; // stand-in for guest linear memory
//! let errno = hostcalls::fd_prestat_get(&fs, &mut memory, 3, 0);
//! # let _ = errno;
//! # Ok(())
//! # }
//! ```

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

mod ctx;
mod entry;
mod error;
mod fdpool;
mod handle;
mod hostcalls_impl;
#[macro_use]
mod macros;
mod memory;
mod path;
mod sys;
mod table;

pub mod hostcalls;
pub mod pipe;
pub mod wasi;

pub use ctx::{WasiFs, WasiFsBuilder};
pub use entry::AccessMode;
pub use error::Error;

pub(crate) type Result<T> = std::result::Result<T, Error>;
