//! CS session plane: one worker per accepted client connection.
//!
//! The worker reads a verb, dispatches, writes a reply. Only `AUT` loops
//! back into the command phase; every other verb terminates the session
//! after its reply. Verbs arriving before a successful `AUT` are answered
//! with `ERR` and the connection stays open for further attempts.

use super::{BsAddr, CsState};
use crate::Error;
use crate::store::InsertOutcome;
use backr_proto::msg::{BsRequest, Status};
use backr_proto::{
    FileInfo, Password, ProtoError, Username, filemeta, parse_listing_reply, parse_status_reply,
};
use backr_transport::{DatagramClient, LineReader, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

pub(crate) async fn serve(stream: TcpStream, peer: SocketAddr, state: Arc<CsState>) {
    match handle(stream, peer, &state).await {
        Ok(()) => log::debug!("{peer}: session closed"),
        // Transport failures are terminal for the worker, not the server.
        Err(e) => log::debug!("{peer}: session aborted: {e}"),
    }
}

async fn handle(stream: TcpStream, peer: SocketAddr, state: &CsState) -> crate::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = LineReader::new(read_half);
    let mut logged_in: Option<(Username, Password)> = None;

    loop {
        let verb = match reader.read_token(b" \n").await {
            Ok(verb) => verb,
            Err(TransportError::Closed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        log::debug!("{peer}: {verb}");

        match (verb.as_str(), &logged_in) {
            ("AUT", _) => logged_in = authenticate(&mut reader, &mut writer, state).await?,
            ("BCK", Some((user, pass))) => {
                let (user, pass) = (user.clone(), pass.clone());
                return backup(&mut reader, &mut writer, state, &user, &pass).await;
            }
            ("RST", Some((user, _))) => {
                let user = user.clone();
                return restore(&mut reader, &mut writer, state, &user).await;
            }
            ("LSD", Some((user, _))) => {
                let user = user.clone();
                return list_dirs(&mut writer, state, &user).await;
            }
            ("LSF", Some((user, _))) => {
                let user = user.clone();
                return list_files(&mut reader, &mut writer, state, &user).await;
            }
            ("DEL", Some((user, _))) => {
                let user = user.clone();
                return delete_dir(&mut reader, &mut writer, state, &user).await;
            }
            ("DLU", Some((user, _))) => {
                let user = user.clone();
                return delete_user(&mut writer, state, &user).await;
            }
            _ => writer.write_all(b"ERR\n").await?,
        }
    }
}

/// `AUT <user> <pass>`: absent registers (`AUR NEW`), matching logs in
/// (`AUR OK`), mismatching is refused (`AUR NOK`). A syntactically invalid
/// pair is a malformed request.
async fn authenticate(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &CsState,
) -> crate::Result<Option<(Username, Password)>> {
    let user_token = reader.read_token(b" ").await?;
    let pass_token = reader.read_token(b"\n").await?;

    let (Ok(user), Ok(pass)) = (
        user_token.parse::<Username>(),
        pass_token.parse::<Password>(),
    ) else {
        log::debug!("malformed AUT arguments");
        writer.write_all(b"ERR\n").await?;
        return Ok(None);
    };

    match state.users.try_insert(user.clone(), pass.clone()).await? {
        InsertOutcome::Inserted => {
            log::info!("registered new user {user}");
            writer.write_all(b"AUR NEW\n").await?;
            Ok(Some((user, pass)))
        }
        InsertOutcome::Unchanged => {
            log::info!("user {user} logged in");
            writer.write_all(b"AUR OK\n").await?;
            Ok(Some((user, pass)))
        }
        InsertOutcome::Conflict => {
            log::info!("password mismatch for {user}");
            writer.write_all(b"AUR NOK\n").await?;
            Ok(None)
        }
    }
}

/// `BCK <dir> <n> (name date time size)×n`: sticky placement with stale
/// detection, or least-used selection with provisioning for a new
/// directory.
async fn backup(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &CsState,
    user: &Username,
    pass: &Password,
) -> crate::Result<()> {
    let dir = reader.read_token(b" ").await?;
    // A zero-file announcement ends the line right after the count.
    let count: usize = reader
        .read_token(b" \n")
        .await?
        .parse()
        .map_err(|_| ProtoError::Malformed("file count"))?;
    let announced = if count > 0 {
        let rest = reader.read_token(b"\n").await?;
        filemeta::parse_entries(count, &mut rest.split_whitespace())?
    } else {
        Vec::new()
    };
    log::info!("{user}: BCK {dir} with {count} file(s)");

    let key = (user.clone(), dir.clone());
    if let Some(bs) = state.placements.get(&key).await {
        // Sticky: the directory already lives somewhere. Ask that BS what
        // it holds and send back the stale subset.
        let on_bs = query_listing(&bs, user, &dir).await?;
        let stale = stale_files(&announced, &on_bs);
        log::info!("{user}: {dir} is on {bs}, {} file(s) stale", stale.len());
        let mut reply = format!("BKR {} {} {}", bs.host, bs.port, stale.len());
        filemeta::push_entries(&mut reply, &stale);
        reply.push('\n');
        writer.write_all(reply.as_bytes()).await?;
        return Ok(());
    }

    let Some(bs) = state.pick_least_used().await? else {
        log::warn!("{user}: no backup server available for {dir}");
        writer.write_all(b"BKR EOF\n").await?;
        return Ok(());
    };
    log::info!("{user}: placing {dir} on {bs}");

    let already_there = state
        .placements
        .read(|m| m.iter().any(|((owner, _), addr)| owner == user && *addr == bs))
        .await;
    state
        .placements
        .mutate(|m| {
            m.insert(key, bs.clone());
        })
        .await?;

    if !already_there {
        provision(&bs, user, pass).await?;
    }

    let mut reply = format!("BKR {} {} {}", bs.host, bs.port, count);
    filemeta::push_entries(&mut reply, &announced);
    reply.push('\n');
    writer.write_all(reply.as_bytes()).await?;
    Ok(())
}

/// Files the client announced that the BS already holds under a different
/// `(date, time, size)` triple; the BS-side triple is what gets echoed.
fn stale_files(announced: &[FileInfo], on_bs: &[FileInfo]) -> Vec<FileInfo> {
    announced
        .iter()
        .filter_map(|ours| {
            on_bs
                .iter()
                .find(|theirs| theirs.name == ours.name)
                .filter(|theirs| theirs.mtime != ours.mtime || theirs.size != ours.size)
                .cloned()
        })
        .collect()
}

/// `RST <dir>`: hand out the owning BS, or `RSR EOF` if never backed up.
async fn restore(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &CsState,
    user: &Username,
) -> crate::Result<()> {
    let dir = reader.read_token(b"\n").await?;
    let reply = match state.placements.get(&(user.clone(), dir.clone())).await {
        Some(bs) => {
            log::info!("{user}: RST {dir} -> {bs}");
            format!("RSR {} {}\n", bs.host, bs.port)
        }
        None => {
            log::info!("{user}: RST {dir} -> not placed");
            "RSR EOF\n".to_owned()
        }
    };
    writer.write_all(reply.as_bytes()).await?;
    Ok(())
}

/// `LSD`: every directory this user has placed.
async fn list_dirs(
    writer: &mut OwnedWriteHalf,
    state: &CsState,
    user: &Username,
) -> crate::Result<()> {
    let mut dirs = state
        .placements
        .read(|m| {
            m.keys()
                .filter(|(owner, _)| owner == user)
                .map(|(_, dir)| dir.clone())
                .collect::<Vec<_>>()
        })
        .await;
    dirs.sort();
    log::info!("{user}: LSD -> {} directorie(s)", dirs.len());
    let reply = format!("LDR {} {}\n", dirs.len(), dirs.join(" "));
    writer.write_all(reply.as_bytes()).await?;
    Ok(())
}

/// `LSF <dir>`: proxy the owning BS's listing, or `LFD NOK` if not placed.
async fn list_files(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &CsState,
    user: &Username,
) -> crate::Result<()> {
    let dir = reader.read_token(b" \n").await?;
    let Some(bs) = state.placements.get(&(user.clone(), dir.clone())).await else {
        log::info!("{user}: LSF {dir} -> not placed");
        writer.write_all(b"LFD NOK\n").await?;
        return Ok(());
    };

    match query_listing(&bs, user, &dir).await {
        Ok(files) => {
            log::info!("{user}: LSF {dir} -> {} file(s) on {bs}", files.len());
            let mut reply = format!("LFD {} {} {}", bs.host, bs.port, files.len());
            filemeta::push_entries(&mut reply, &files);
            reply.push('\n');
            writer.write_all(reply.as_bytes()).await?;
        }
        Err(Error::Proto(e)) => {
            log::warn!("{bs} answered LSF with garbage: {e}");
            writer.write_all(b"ERR\n").await?;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

/// `DEL <dir>`: order the owning BS to drop the directory, then forget the
/// placement. The placement survives if the BS does not confirm.
async fn delete_dir(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    state: &CsState,
    user: &Username,
) -> crate::Result<()> {
    let dir = reader.read_token(b" \n").await?;
    let key = (user.clone(), dir.clone());
    let Some(bs) = state.placements.get(&key).await else {
        log::info!("{user}: DEL {dir} -> not placed");
        writer.write_all(b"DDR NOK\n").await?;
        return Ok(());
    };

    let client = DatagramClient::connect(bs.target()).await?;
    let request = BsRequest::RemoveDir {
        user: user.clone(),
        dir: dir.clone(),
    };
    let raw = client.exchange(&request.encode()).await?;

    let reply: &[u8] = match parse_status_reply(&raw, "DBR") {
        Ok(Status::Ok) => {
            state.placements.remove(&key).await?;
            log::info!("{user}: DEL {dir} -> removed from {bs}");
            b"DDR OK\n"
        }
        Ok(Status::Nok) => {
            log::info!("{user}: DEL {dir} -> {bs} has no such directory");
            b"DDR NOK\n"
        }
        Ok(Status::Err) | Err(_) => {
            log::warn!("{user}: DEL {dir} -> {bs} answered {:?}", raw.trim_end());
            b"ERR\n"
        }
    };
    writer.write_all(reply).await?;
    Ok(())
}

/// `DLU`: drop the credentials, refused while any placement remains.
async fn delete_user(
    writer: &mut OwnedWriteHalf,
    state: &CsState,
    user: &Username,
) -> crate::Result<()> {
    let reply: &[u8] = if state.delete_user_if_unplaced(user).await? {
        log::info!("user {user} deleted");
        b"DLR OK\n"
    } else {
        log::info!("{user}: DLU refused, directories still placed");
        b"DLR NOK\n"
    };
    writer.write_all(reply).await?;
    Ok(())
}

async fn query_listing(bs: &BsAddr, user: &Username, dir: &str) -> crate::Result<Vec<FileInfo>> {
    let client = DatagramClient::connect(bs.target()).await?;
    let request = BsRequest::ListFiles {
        user: user.clone(),
        dir: dir.to_owned(),
    };
    let raw = client.exchange(&request.encode()).await?;
    Ok(parse_listing_reply(&raw)?)
}

/// Sends `LSU` to a BS that does not know this user yet. Anything but
/// `LUR OK` fails the session.
async fn provision(bs: &BsAddr, user: &Username, pass: &Password) -> crate::Result<()> {
    let client = DatagramClient::connect(bs.target()).await?;
    let request = BsRequest::Provision {
        user: user.clone(),
        pass: pass.clone(),
    };
    let raw = client.exchange(&request.encode()).await?;
    match parse_status_reply(&raw, "LUR")? {
        Status::Ok => {
            log::info!("provisioned {user} on {bs}");
            Ok(())
        }
        refused => Err(Error::Provision(refused)),
    }
}
