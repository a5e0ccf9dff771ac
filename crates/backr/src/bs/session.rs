//! BS session plane: one worker per accepted client connection.
//!
//! After an `AUT` against the local user table, a session carries exactly
//! one transfer: `UPL` receives a directory's files, `RSB` sends them
//! back. Headers are space-separated tokens; each body is `size` raw bytes
//! followed by a single separator byte (space between files, newline after
//! the last).

use super::BsState;
use crate::fsutil;
use backr_proto::{ProtoError, Username, filemeta};
use backr_transport::{LineReader, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

pub(crate) async fn serve(stream: TcpStream, peer: SocketAddr, state: Arc<BsState>) {
    match handle(stream, peer, &state).await {
        Ok(()) => log::debug!("{peer}: session closed"),
        Err(e) => log::debug!("{peer}: session aborted: {e}"),
    }
}

async fn handle(stream: TcpStream, peer: SocketAddr, state: &BsState) -> crate::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = LineReader::new(read_half);
    let mut logged_in: Option<Username> = None;

    loop {
        let verb = match reader.read_token(b" \n").await {
            Ok(verb) => verb,
            Err(TransportError::Closed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        log::debug!("{peer}: {verb}");

        match (verb.as_str(), &logged_in) {
            ("AUT", _) => logged_in = authenticate(&mut reader, &mut writer, state).await?,
            ("UPL", Some(user)) => {
                let user = user.clone();
                return upload(&mut reader, &mut writer, state, &user).await;
            }
            ("RSB", Some(user)) => {
                let user = user.clone();
                return send_back(&mut reader, &mut writer, state, &user).await;
            }
            _ => writer.write_all(b"ERR\n").await?,
        }
    }
}

/// `AUT <user> <pass>` against the mirrored table. A BS never registers
/// users itself, so there is no `NEW` outcome here.
async fn authenticate(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &BsState,
) -> crate::Result<Option<Username>> {
    let user_token = reader.read_token(b" ").await?;
    let pass_token = reader.read_token(b"\n").await?;

    let known = match user_token.parse::<Username>() {
        Ok(user) => state
            .users
            .get(&user)
            .await
            .is_some_and(|stored| stored.as_str() == pass_token)
            .then_some(user),
        Err(_) => None,
    };

    match known {
        Some(user) => {
            log::info!("user {user} logged in");
            writer.write_all(b"AUR OK\n").await?;
            Ok(Some(user))
        }
        None => {
            log::info!("refused login for {user_token:?}");
            writer.write_all(b"AUR NOK\n").await?;
            Ok(None)
        }
    }
}

/// `UPL <dir> <n> (name date time size BYTES sep)×n`: receive the files
/// into `<root>/<user>/<dir>/`. The first on-disk size mismatch aborts the
/// rest and answers `UPR NOK`; files already written stay.
async fn upload(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &BsState,
    user: &Username,
) -> crate::Result<()> {
    let dir = reader.read_token(b" ").await?;
    // An empty transfer ends the line right after the count.
    let count: usize = reader
        .read_token(b" \n")
        .await?
        .parse()
        .map_err(|_| ProtoError::Malformed("file count"))?;
    if !fsutil::is_safe_component(&dir) {
        return Err(ProtoError::Malformed("directory name").into());
    }
    log::info!("{user}: UPL {dir} with {count} file(s)");

    let target = state.user_dir(user).join(&dir);
    tokio::fs::create_dir_all(&target).await?;

    let mut all_good = true;
    for _ in 0..count {
        let name = reader.read_token(b" ").await?;
        let date = reader.read_token(b" ").await?;
        let hms = reader.read_token(b" ").await?;
        let size: u64 = reader
            .read_token(b" ")
            .await?
            .parse()
            .map_err(|_| ProtoError::Malformed("file size"))?;
        let mtime = filemeta::parse_mtime(&date, &hms)?;
        if !fsutil::is_safe_component(&name) {
            return Err(ProtoError::Malformed("file name").into());
        }

        log::debug!("{user}: receiving {name} ({size} bytes)");
        if !fsutil::receive_file(reader, &target.join(&name), size, mtime.into()).await? {
            all_good = false;
            break;
        }

        match reader.read_byte().await? {
            b' ' | b'\n' => {}
            _ => return Err(ProtoError::Malformed("file separator").into()),
        }
    }

    let reply: &[u8] = if all_good { b"UPR OK\n" } else { b"UPR NOK\n" };
    writer.write_all(reply).await?;
    Ok(())
}

/// `RSB <dir>`: send every file of `<root>/<user>/<dir>/` back, or
/// `RBR EOF` when the directory does not exist here.
async fn send_back(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &BsState,
    user: &Username,
) -> crate::Result<()> {
    let dir = reader.read_token(b"\n").await?;
    if !fsutil::is_safe_component(&dir) {
        log::debug!("{user}: RSB with malformed directory name");
        writer.write_all(b"RBR ERR\n").await?;
        return Ok(());
    }

    let source = state.user_dir(user).join(&dir);
    if !source.is_dir() {
        log::info!("{user}: RSB {dir} -> no such directory");
        writer.write_all(b"RBR EOF\n").await?;
        return Ok(());
    }

    let files = fsutil::list_files(&source)?;
    log::info!("{user}: RSB {dir} -> sending {} file(s)", files.len());
    writer
        .write_all(format!("RBR {}", files.len()).as_bytes())
        .await?;

    for file in &files {
        log::debug!("{user}: sending {} ({} bytes)", file.name, file.size);
        writer.write_all(format!(" {file} ").as_bytes()).await?;
        fsutil::send_file(writer, &source.join(&file.name), file.size).await?;
    }
    writer.write_all(b"\n").await?;
    Ok(())
}
