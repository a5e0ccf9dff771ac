//! Durable snapshot/restore of the in-memory maps.
//!
//! Maps are encoded as a JSON list of `(key, value)` entries, which
//! round-trips the composite tuple keys a JSON object could not hold. A
//! snapshot lands atomically: the bytes go to a sibling temp file that is
//! fsynced and renamed over the target, so a crash leaves either the old
//! snapshot or the new one, never a torn file.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Writes `entries` to `path`, replacing any previous snapshot.
pub fn snapshot<K: Serialize, V: Serialize>(entries: &[(K, V)], path: &Path) -> crate::Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec(entries)?;
    let mut file = fs::File::create(&tmp)?;
    file.write_all(&data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads the snapshot at `path`; `None` if no snapshot was ever taken.
pub fn restore<K: DeserializeOwned, V: DeserializeOwned>(
    path: &Path,
) -> crate::Result<Option<Vec<(K, V)>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
