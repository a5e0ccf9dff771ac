#![forbid(unsafe_code)]

//! Core of the two-tier backup system: the central server (CS) that brokers
//! sessions, the backup servers (BS) that hold the bytes, and the client
//! verbs that drive them.
//!
//! Each server role runs a datagram control plane and a stream session
//! plane; the session acceptor spawns one task per connection. Shared state
//! is confined to mutex-guarded maps that rewrite their on-disk snapshot on
//! every mutation. See `cs`, `bs` and [`supervisor`] for the roles, and
//! [`client`] for the user-facing verbs the CLI shell dispatches to.

pub mod bs;
pub mod client;
pub mod cs;
pub mod error;
pub mod fsutil;
pub mod persist;
pub mod store;
pub mod supervisor;

pub use bs::{BsConfig, BsServer};
pub use client::{BackupOutcome, Client, FileListOutcome, LoginStatus, RestoreOutcome};
pub use cs::{BsAddr, CsConfig, CsServer};
pub use error::Error;
pub use supervisor::{best_local_ip, run_bs, run_cs};

pub use backr_proto as proto;
pub use backr_transport as transport;

// Re-exported for callers driving the servers directly.
pub use tokio_util::sync::CancellationToken;

/// Result type of the core crate.
pub type Result<T> = std::result::Result<T, crate::Error>;

/// Default port of the central server, both planes.
pub const DEFAULT_CS_PORT: u16 = 58028;

/// Default port of a backup server, both planes.
pub const DEFAULT_BS_PORT: u16 = 59000;
