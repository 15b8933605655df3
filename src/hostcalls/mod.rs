//! The `wasi_snapshot_preview1` host function surface.
//!
//! Every function takes the filesystem instance, the guest's linear memory,
//! and the raw scalar arguments of the corresponding preview1 export, and
//! returns an [`Errno`](crate::wasi::Errno). Host-side errors never escape:
//! the wrappers generated here collapse them into errno values at the
//! boundary.
//!
//! A runtime embedding this crate registers each function under the module
//! name `wasi_snapshot_preview1`, passing through its view of linear memory.

mod fs;

pub use fs::*;
