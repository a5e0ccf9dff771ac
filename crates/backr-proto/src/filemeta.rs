//! Per-file metadata carried on the wire: name, UTC modification time and
//! size in bytes. Timestamps are exchanged as `DD.MM.YYYY HH:MM:SS`.

use crate::ProtoError;
use std::fmt::{self, Write as _};
use std::time::SystemTime;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const MTIME_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]:[second]");

/// One file as announced in listings and transfer headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    /// Last modification time, UTC, second resolution.
    pub mtime: OffsetDateTime,
    pub size: u64,
}

impl FileInfo {
    /// Builds an entry, truncating the timestamp to whole seconds so that a
    /// round trip through the wire format compares equal.
    pub fn new(name: String, mtime: OffsetDateTime, size: u64) -> Self {
        let mtime = mtime
            .to_offset(time::UtcOffset::UTC)
            .replace_nanosecond(0)
            .unwrap_or(mtime);
        Self { name, mtime, size }
    }

    pub fn from_fs(name: String, modified: SystemTime, size: u64) -> Self {
        Self::new(name, OffsetDateTime::from(modified), size)
    }

    /// The `DD.MM.YYYY HH:MM:SS` form of the modification time.
    pub fn wire_mtime(&self) -> String {
        wire_mtime(self.mtime)
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.wire_mtime(), self.size)
    }
}

/// Formats a timestamp the way it travels on the wire.
pub fn wire_mtime(t: OffsetDateTime) -> String {
    let t = t.to_offset(time::UtcOffset::UTC);
    format!(
        "{:02}.{:02}.{:04} {:02}:{:02}:{:02}",
        t.day(),
        u8::from(t.month()),
        t.year(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

/// Parses the two wire tokens of a timestamp back into UTC.
pub fn parse_mtime(date: &str, hms: &str) -> Result<OffsetDateTime, ProtoError> {
    let joined = format!("{date} {hms}");
    PrimitiveDateTime::parse(&joined, MTIME_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| ProtoError::BadTimestamp)
}

/// Appends ` name date time size` for every entry.
pub fn push_entries(out: &mut String, files: &[FileInfo]) {
    for file in files {
        let _ = write!(out, " {file}");
    }
}

/// Parses `count` quadruples out of an already-split token stream.
pub fn parse_entries<'a>(
    count: usize,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<Vec<FileInfo>, ProtoError> {
    let mut files = Vec::with_capacity(count);
    for _ in 0..count {
        let name = tokens.next().ok_or(ProtoError::BadCount)?;
        let date = tokens.next().ok_or(ProtoError::BadCount)?;
        let hms = tokens.next().ok_or(ProtoError::BadCount)?;
        let size = tokens
            .next()
            .ok_or(ProtoError::BadCount)?
            .parse()
            .map_err(|_| ProtoError::Malformed("file size"))?;
        files.push(FileInfo {
            name: name.to_owned(),
            mtime: parse_mtime(date, hms)?,
            size,
        });
    }
    Ok(files)
}
