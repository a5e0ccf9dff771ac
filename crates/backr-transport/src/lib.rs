#![forbid(unsafe_code)]

//! Transport primitives shared by every `backr` role.
//!
//! All protocol messages are short ASCII tokens separated by spaces and
//! newlines, except file bodies, which are raw bytes of a size announced
//! in-band. [`LineReader`] handles the token part without consuming past a
//! separator; [`LineReader::copy_exact`] handles the raw part in bounded
//! chunks. Datagram exchanges are request/response with a client-side
//! deadline.

use std::time::Duration;

pub mod datagram;
pub mod error;
pub mod stream;

pub use datagram::{DatagramClient, DatagramServer, MAX_DATAGRAM};
pub use error::TransportError;
pub use stream::{LineReader, connect};

/// Deadline applied to client-side dials and datagram exchanges.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest piece moved at once when transferring a file body.
pub const CHUNK_SIZE: usize = 4096;

/// Upper bound on a single protocol token, separators excluded.
pub const MAX_TOKEN: usize = 4096;
