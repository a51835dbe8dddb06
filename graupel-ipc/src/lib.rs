//! The resident build server.
//!
//! Repeated incremental builds in one working directory pay the tool's
//! startup cost every time. This crate lets the tool linger as a warm
//! daemon instead: a transient client process marshals its argv,
//! version, and standard streams over a local socket; the resident
//! server checks that its own captured state still matches, forks a
//! build worker wired to the client's terminal, and relays the
//! worker's exit code back.

#![warn(missing_docs)]

pub use self::state::Fingerprint;

pub mod client;
pub mod server;
pub mod state;
pub mod transport;

/// Reserved exit code meaning "the server declined and has exited;
/// the client should restart it".
///
/// Build commands are expected not to exit with this code;
/// a worker that does retires the server as well.
pub const SERVER_SHUTDOWN: i32 = 2;
