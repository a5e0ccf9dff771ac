//! Filesystem helpers shared by the BS session plane and the client's
//! restore path: directory listings with wire metadata, chunked file
//! receive with size verification, and chunked file send.

use crate::Error;
use backr_proto::FileInfo;
use backr_transport::LineReader;
use std::path::Path;
use std::time::SystemTime;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Rejects names that would escape the user's directory tree.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

/// Lists the regular files of `dir` with wire metadata, sorted by name.
/// Subdirectories and files with non-UTF-8 names are skipped.
pub fn list_files(dir: &Path) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            log::warn!("skipping non-UTF-8 file name in {}", dir.display());
            continue;
        };
        files.push(FileInfo::new(
            name,
            OffsetDateTime::from(meta.modified()?),
            meta.len(),
        ));
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Receives exactly `size` bytes from `reader` into a fresh file at `path`,
/// then verifies the on-disk size and applies `mtime`.
///
/// Returns `false` when the on-disk size does not match the announcement;
/// the partial file is left in place.
pub async fn receive_file<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
    path: &Path,
    size: u64,
    mtime: SystemTime,
) -> crate::Result<bool> {
    let mut file = tokio::fs::File::create(path).await?;
    reader.copy_exact(&mut file, size).await?;
    file.flush().await?;
    drop(file);

    let written = tokio::fs::metadata(path).await?.len();
    if written != size {
        log::error!(
            "{}: wrote {written} bytes, announced {size}",
            path.display()
        );
        return Ok(false);
    }
    set_mtime(path, mtime)?;
    Ok(true)
}

/// Streams exactly `size` bytes of `path` into `writer`.
pub async fn send_file<W: AsyncWrite + Unpin>(
    writer: &mut W,
    path: &Path,
    size: u64,
) -> crate::Result<()> {
    let file = tokio::fs::File::open(path).await?;
    let sent = tokio::io::copy(&mut file.take(size), writer).await?;
    if sent != size {
        return Err(Error::FileTruncated(path.to_owned()));
    }
    Ok(())
}

fn set_mtime(path: &Path, mtime: SystemTime) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backr_proto::filemeta;

    #[test]
    fn unsafe_components_are_rejected() {
        for bad in ["", ".", "..", "a/b", "a\\b", "../etc"] {
            assert!(!is_safe_component(bad), "{bad:?} accepted");
        }
        assert!(is_safe_component("notes.txt"));
        assert!(is_safe_component("..hidden"));
    }

    #[test]
    fn listing_skips_directories_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"xy").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(files[1].size, 2);
    }

    #[tokio::test]
    async fn receive_writes_bytes_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let mtime = filemeta::parse_mtime("02.03.2021", "04:05:06").unwrap();

        let mut reader = LineReader::new(&b"abc"[..]);
        let ok = receive_file(&mut reader, &path, 3, mtime.into())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");

        let files = list_files(dir.path()).unwrap();
        assert_eq!(files[0].mtime, mtime);
    }

    #[tokio::test]
    async fn send_detects_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"ab").unwrap();

        let mut out = Vec::new();
        assert!(matches!(
            send_file(&mut out, &path, 5).await,
            Err(Error::FileTruncated(_))
        ));

        out.clear();
        send_file(&mut out, &path, 2).await.unwrap();
        assert_eq!(out, b"ab");
    }
}
