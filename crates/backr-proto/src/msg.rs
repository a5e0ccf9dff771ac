//! Typed datagram messages of the inter-server control plane.
//!
//! Requests encode to a single line; replies are either `<verb> <status>`
//! or an `LFD` listing. The stream-plane verbs are token streams rather
//! than fixed records and are handled directly by the session workers.

use crate::{FileInfo, Password, ProtoError, Username, filemeta};
use std::fmt;
use std::str::FromStr;

/// Three-way outcome carried by most replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Nok,
    Err,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::Nok => "NOK",
            Status::Err => "ERR",
        })
    }
}

impl FromStr for Status {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, ProtoError> {
        match s {
            "OK" => Ok(Status::Ok),
            "NOK" => Ok(Status::Nok),
            "ERR" => Ok(Status::Err),
            other => Err(ProtoError::BadStatus(other.to_owned())),
        }
    }
}

/// Backup-server lifecycle announcements, sent BS → CS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRequest {
    /// `REG <ip> <port>`, answered by `RGR <status>`.
    Register { host: String, port: u16 },
    /// `UNR <ip> <port>`, answered by `UAR <status>`.
    Unregister { host: String, port: u16 },
}

impl RegistryRequest {
    pub fn encode(&self) -> String {
        match self {
            RegistryRequest::Register { host, port } => format!("REG {host} {port}\n"),
            RegistryRequest::Unregister { host, port } => format!("UNR {host} {port}\n"),
        }
    }
}

/// Orders from the CS to a backup server, sent CS → BS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BsRequest {
    /// `LSU <user> <pass>`: provision the user, answered by `LUR <status>`.
    Provision { user: Username, pass: Password },
    /// `DLB <user> <dir>`: drop a directory, answered by `DBR <status>`.
    RemoveDir { user: Username, dir: String },
    /// `LSF <user> <dir>`: list a directory, answered by an `LFD` listing.
    ListFiles { user: Username, dir: String },
}

impl BsRequest {
    pub fn encode(&self) -> String {
        match self {
            BsRequest::Provision { user, pass } => format!("LSU {user} {pass}\n"),
            BsRequest::RemoveDir { user, dir } => format!("DLB {user} {dir}\n"),
            BsRequest::ListFiles { user, dir } => format!("LSF {user} {dir}\n"),
        }
    }
}

/// Parses a `<verb> <status>` reply such as `RGR OK`.
pub fn parse_status_reply(reply: &str, expected: &'static str) -> Result<Status, ProtoError> {
    let mut tokens = reply.split_whitespace();
    let verb = tokens.next().unwrap_or_default();
    if verb != expected {
        return Err(ProtoError::UnexpectedReply {
            expected,
            got: reply.to_owned(),
        });
    }
    let status = tokens
        .next()
        .ok_or_else(|| ProtoError::BadStatus(String::new()))?
        .parse()?;
    match tokens.next() {
        Some(_) => Err(ProtoError::Malformed("status reply arity")),
        None => Ok(status),
    }
}

/// Parses an `LFD <n> (name date time size)×n` listing reply.
pub fn parse_listing_reply(reply: &str) -> Result<Vec<FileInfo>, ProtoError> {
    let mut tokens = reply.split_whitespace();
    let verb = tokens.next().unwrap_or_default();
    if verb != "LFD" {
        return Err(ProtoError::UnexpectedReply {
            expected: "LFD",
            got: reply.to_owned(),
        });
    }
    let count: usize = tokens
        .next()
        .ok_or(ProtoError::BadCount)?
        .parse()
        .map_err(|_| ProtoError::Malformed("listing count"))?;
    filemeta::parse_entries(count, &mut tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn user() -> Username {
        "12345".parse().unwrap()
    }

    fn pass() -> Password {
        "abcd1234".parse().unwrap()
    }

    #[test]
    fn registry_requests_encode() {
        let reg = RegistryRequest::Register {
            host: "10.0.0.7".into(),
            port: 59000,
        };
        assert_eq!(reg.encode(), "REG 10.0.0.7 59000\n");
        let unr = RegistryRequest::Unregister {
            host: "10.0.0.7".into(),
            port: 59000,
        };
        assert_eq!(unr.encode(), "UNR 10.0.0.7 59000\n");
    }

    #[test]
    fn bs_requests_encode() {
        assert_eq!(
            BsRequest::Provision {
                user: user(),
                pass: pass()
            }
            .encode(),
            "LSU 12345 abcd1234\n"
        );
        assert_eq!(
            BsRequest::RemoveDir {
                user: user(),
                dir: "photos".into()
            }
            .encode(),
            "DLB 12345 photos\n"
        );
        assert_eq!(
            BsRequest::ListFiles {
                user: user(),
                dir: "photos".into()
            }
            .encode(),
            "LSF 12345 photos\n"
        );
    }

    #[test]
    fn status_replies_parse() {
        assert_eq!(parse_status_reply("RGR OK\n", "RGR").unwrap(), Status::Ok);
        assert_eq!(parse_status_reply("LUR NOK\n", "LUR").unwrap(), Status::Nok);
        assert_eq!(parse_status_reply("DBR ERR\n", "DBR").unwrap(), Status::Err);
        assert!(parse_status_reply("RGR OK\n", "UAR").is_err());
        assert!(parse_status_reply("RGR MAYBE\n", "RGR").is_err());
        assert!(parse_status_reply("RGR OK extra\n", "RGR").is_err());
    }

    #[test]
    fn listing_replies_parse() {
        let files = parse_listing_reply("LFD 1 a.txt 01.01.2024 00:00:00 3\n").unwrap();
        assert_eq!(
            files,
            vec![FileInfo::new(
                "a.txt".into(),
                datetime!(2024-01-01 00:00:00 UTC),
                3
            )]
        );
        assert!(parse_listing_reply("LFD 0\n").unwrap().is_empty());
        assert!(parse_listing_reply("LFD 2 a 01.01.2024 00:00:00 3\n").is_err());
        assert!(parse_listing_reply("LUR OK\n").is_err());
    }
}
