use backr_proto::{ProtoError, Status};
use backr_transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors of the coordination core.
///
/// Protocol-level denials (`NOK`/`EOF` replies) are not errors; they are
/// modeled as outcome enums on the operations that produce them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol violation: {0}")]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The CS answered a `REG` with something other than `RGR OK`.
    #[error("central server refused registration: {0}")]
    Registration(Status),

    /// A BS answered an `LSU` with something other than `LUR OK`.
    #[error("backup server refused provisioning: {0}")]
    Provision(Status),

    /// The peer answered an `AUT` with `AUR NOK`.
    #[error("authentication refused")]
    AuthRefused,

    /// A client verb was invoked without a prior successful login.
    #[error("not logged in")]
    NotLoggedIn,

    /// The client-side cap on files per backed-up directory.
    #[error("directory holds {found} files, the cap is {cap}")]
    TooManyFiles { found: usize, cap: usize },

    /// A received file did not end up with its announced size on disk.
    #[error("size mismatch while receiving {0:?}")]
    SizeMismatch(String),

    /// A file shrank between being listed and being sent.
    #[error("file {0:?} changed while being sent")]
    FileTruncated(PathBuf),
}
