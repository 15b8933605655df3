use crate::sys;
use crate::wasi::Errno;
use std::num::TryFromIntError;
use std::str;

/// An error raised while servicing a hostcall.
///
/// Host-side failures never cross the guest boundary as-is; at the edge of
/// the hostcall surface every `Error` collapses into a preview1 [`Errno`]
/// via [`Error::as_wasi_errno`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Wasi(#[from] Errno),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn as_wasi_errno(&self) -> Errno {
        match self {
            Self::Wasi(no) => *no,
            Self::Io(e) => sys::errno_from_ioerror(e),
        }
    }
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::Wasi(Errno::Overflow)
    }
}

impl From<str::Utf8Error> for Error {
    fn from(_: str::Utf8Error) -> Self {
        Self::Wasi(Errno::Ilseq)
    }
}
