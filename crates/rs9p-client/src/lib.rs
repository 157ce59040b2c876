#![forbid(unsafe_code)]
//! Asynchronous 9P client library for Rust.
//!
//! This crate speaks 9P2000, 9P2000.u and 9P2000.L to a remote file server over
//! any tokio byte stream, and lets any number of tasks share one connection.
//!
//! # Overview
//!
//! A [`Session`] owns the connection. Requests are tagged and written as soon as
//! they are issued; replies may come back in any order. The session never spawns
//! a background task to read them. Instead, one of the waiting callers takes the
//! reader role, reads frames and hands each one to the caller registered under
//! its tag until its own reply arrives, then passes the role on.
//!
//! A [`RemoteFile`] is a fid bound on the server: attach, walk, open, read, write,
//! getattr, readdir, truncate and clunk are methods on it.
//!
//! # Example
//!
//! ```no_run
//! use rs9p_client::{RemoteFile, Result, Session, SessionConfig, Stat};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SessionConfig::default().uname("glenda");
//!     let session = Arc::new(Session::connect("tcp!127.0.0.1!564", config).await?);
//!
//!     let root = RemoteFile::attach(&session).await?;
//!     for entry in root.readdir().await? {
//!         println!("{}", entry.name);
//!     }
//!
//!     let mut motd = root.walk_path(&["etc", "motd"]).await?;
//!     let attrs = motd.getattr(Stat::default()).await?;
//!     let mut buf = vec![0; attrs.size as usize];
//!     let n = motd.read(&mut buf, 0).await?;
//!     print!("{}", String::from_utf8_lossy(&buf[..n]));
//!     motd.clunk().await
//! }
//! ```
//!
//! # Protocol Details
//!
//! ## Dialects
//!
//! The client always proposes `9P2000.L`. Whatever the server answers decides the
//! [`Dialect`] used for the rest of the session:
//! - `9P2000.L`: `Tlopen`, `Tgetattr`, `Treaddir`, `Tsetattr` and friends, errors as `Rlerror`
//! - `9P2000.u`: classic messages, `Rerror` carries a numeric errno
//! - anything else: classic 9P2000, `Rerror` carries only text
//!
//! ## Tags and fids
//!
//! Tags identify outstanding requests and are reused once their reply arrived.
//! Fids are never reused while the session lives.
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Error`]. Errors reported by the server and
//! protocol violations are `Error::No(errno)`; a broken or garbled stream is
//! `Error::Io` and is reported to every caller waiting at that moment.
//!
//! # Transport
//!
//! [`Session::connect`] understands the usual dial strings:
//! - **TCP**: `"tcp!host!port"` (e.g., `"tcp!127.0.0.1!564"`)
//! - **Unix Domain Sockets**: `"unix!path!suffix"` (e.g., `"unix!/tmp/socket!0"`)
//!
//! Any other stream can be used through [`Session::new`].
//!
//! # Safety
//!
//! This crate forbids unsafe code (`#![forbid(unsafe_code)]`).
pub mod error;
pub mod fcall;
pub mod file;
pub mod message;
pub mod serialize;
pub mod session;
#[macro_use]
pub mod utils;

pub use crate::error::Error;
pub use crate::error::errno;
pub use crate::fcall::*;
pub use crate::file::RemoteFile;
pub use crate::message::Message;
pub use crate::session::{Session, SessionConfig};
pub use crate::utils::Result;
