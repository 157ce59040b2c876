//! 9P client error types.
//!
//! Remote failures carry an errno, either sent by the server (`Rlerror`, or the
//! numeric extension of a 9P2000.u `Rerror`) or chosen locally. Failures of the
//! underlying stream, including frames that cannot be decoded, are `Error::Io`.

use std::{fmt, io};

/// Errno values used by the client.
pub mod errno {
    pub use nix::errno::Errno;
    pub use nix::errno::Errno::*;
}

use self::errno::Errno;

/// The client error type.
#[derive(Debug)]
pub enum Error {
    /// A remote or protocol level error identified by an errno.
    No(Errno),
    /// Transport failure or an undecodable frame.
    Io(io::Error),
}

impl Error {
    /// Get the errno this error maps to.
    pub fn errno(&self) -> Errno {
        match *self {
            Error::No(ref e) => *e,
            Error::Io(ref e) => match e.raw_os_error() {
                Some(code) => Errno::from_raw(code),
                None => match e.kind() {
                    io::ErrorKind::NotFound => Errno::ENOENT,
                    io::ErrorKind::PermissionDenied => Errno::EPERM,
                    io::ErrorKind::ConnectionRefused => Errno::ECONNREFUSED,
                    io::ErrorKind::ConnectionReset => Errno::ECONNRESET,
                    io::ErrorKind::ConnectionAborted => Errno::ECONNABORTED,
                    io::ErrorKind::NotConnected => Errno::ENOTCONN,
                    io::ErrorKind::BrokenPipe => Errno::EPIPE,
                    io::ErrorKind::InvalidInput => Errno::EINVAL,
                    io::ErrorKind::TimedOut => Errno::ETIMEDOUT,
                    io::ErrorKind::Interrupted => Errno::EINTR,
                    _ => Errno::EIO,
                },
            },
        }
    }

    /// Whether the error came from the stream rather than from the server.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

// A broken stream is reported to every waiter, so each one needs its own copy.
impl Clone for Error {
    fn clone(&self) -> Self {
        match *self {
            Error::No(e) => Error::No(e),
            Error::Io(ref e) => match e.raw_os_error() {
                Some(code) => Error::Io(io::Error::from_raw_os_error(code)),
                None => Error::Io(io::Error::new(e.kind(), e.to_string())),
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::No(ref e) => write!(f, "System error: {}", e.desc()),
            Error::Io(ref e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::No(_) => None,
            Error::Io(ref e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error::No(e)
    }
}
