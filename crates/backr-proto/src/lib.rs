#![forbid(unsafe_code)]

//! Wire-level vocabulary of the backup protocol.
//!
//! Every message is a 3-letter verb followed by space-separated arguments
//! and a terminating newline; file listings append ` name date time size`
//! quadruples. This crate owns the identifiers, per-file metadata and the
//! typed datagram messages exchanged between the central server and the
//! backup servers. Byte shuffling lives in `backr-transport`; session
//! logic lives in `backr`.

pub mod error;
pub mod filemeta;
pub mod ident;
pub mod msg;

pub use error::ProtoError;
pub use filemeta::FileInfo;
pub use ident::{Password, Username};
pub use msg::{BsRequest, RegistryRequest, Status, parse_listing_reply, parse_status_reply};
