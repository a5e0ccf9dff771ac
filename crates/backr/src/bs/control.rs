//! BS control plane: the datagram loop serving orders from the CS.
//!
//! Only the CS is expected on this socket, so one task suffices. Requests
//! not terminated by a newline are malformed.

use super::BsState;
use crate::fsutil;
use crate::store::InsertOutcome;
use backr_proto::{Password, Status, Username, filemeta};
use backr_transport::DatagramServer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run(server: DatagramServer, state: Arc<BsState>, shutdown: CancellationToken) {
    loop {
        let (request, peer) = tokio::select! {
            _ = shutdown.cancelled() => return,
            received = server.recv_from() => match received {
                Ok(datagram) => datagram,
                Err(e) => {
                    log::warn!("control receive failed: {e}");
                    continue;
                }
            },
        };
        log::debug!("{peer}: {}", request.trim_end());
        let reply = dispatch(&request, &state).await;
        if let Err(e) = server.send_to(&reply, peer).await {
            log::warn!("control reply to {peer} failed: {e}");
        }
    }
}

async fn dispatch(request: &str, state: &BsState) -> String {
    let Some(line) = request.strip_suffix('\n') else {
        log::debug!("control request without newline terminator");
        return "ERR\n".to_owned();
    };
    let mut tokens = line.split(' ');
    match tokens.next() {
        Some("LSU") => format!("LUR {}\n", provision(tokens, state).await),
        Some("DLB") => format!("DBR {}\n", remove_dir(tokens, state).await),
        Some("LSF") => list_files(tokens, state).await,
        _ => {
            log::debug!("unknown control verb in {line:?}");
            "ERR\n".to_owned()
        }
    }
}

/// `LSU <user> <pass>`: create the user folder and mirror the credentials.
/// Re-issuing with the same password is a no-op success; a different
/// password is refused.
async fn provision(mut args: impl Iterator<Item = &str>, state: &BsState) -> Status {
    let parsed = (|| {
        let user: Username = args.next()?.parse().ok()?;
        let pass: Password = args.next()?.parse().ok()?;
        args.next().is_none().then_some((user, pass))
    })();
    let Some((user, pass)) = parsed else {
        log::debug!("malformed LSU arguments");
        return Status::Err;
    };

    match state.users.try_insert(user.clone(), pass).await {
        Ok(InsertOutcome::Inserted) | Ok(InsertOutcome::Unchanged) => {
            if let Err(e) = std::fs::create_dir_all(state.user_dir(&user)) {
                log::error!("cannot create folder for {user}: {e}");
                return Status::Err;
            }
            log::info!("user {user} provisioned");
            Status::Ok
        }
        Ok(InsertOutcome::Conflict) => {
            log::info!("user {user} already known with a different password");
            Status::Nok
        }
        Err(e) => {
            log::error!("user table snapshot failed: {e}");
            Status::Err
        }
    }
}

/// `DLB <user> <dir>`: delete the directory's files and the directory;
/// forget the user entirely once their folder is empty.
async fn remove_dir(mut args: impl Iterator<Item = &str>, state: &BsState) -> Status {
    let parsed = (|| {
        let user: Username = args.next()?.parse().ok()?;
        let dir = args.next()?.to_owned();
        args.next().is_none().then_some((user, dir))
    })();
    let Some((user, dir)) = parsed else {
        log::debug!("malformed DLB arguments");
        return Status::Err;
    };

    let user_dir = state.user_dir(&user);
    if !state.users.contains(&user).await || !user_dir.is_dir() {
        log::info!("DLB for unknown user {user}");
        return Status::Err;
    }
    if !fsutil::is_safe_component(&dir) || !user_dir.join(&dir).is_dir() {
        log::info!("{user}: DLB {dir} -> no such directory");
        return Status::Nok;
    }

    match drop_dir(state, &user, &user_dir.join(&dir)).await {
        Ok(()) => {
            log::info!("{user}: directory {dir} removed");
            Status::Ok
        }
        Err(e) => {
            log::error!("{user}: removing {dir} failed: {e}");
            Status::Err
        }
    }
}

async fn drop_dir(
    state: &BsState,
    user: &Username,
    dir: &std::path::Path,
) -> crate::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.metadata()?.is_file() {
            std::fs::remove_file(entry.path())?;
        }
    }
    std::fs::remove_dir(dir)?;

    // Last directory gone: forget the user and their folder.
    let user_dir = state.user_dir(user);
    if std::fs::read_dir(&user_dir)?.next().is_none() {
        state.users.remove(user).await?;
        std::fs::remove_dir(&user_dir)?;
        log::info!("user {user} has no directories left, forgotten");
    }
    Ok(())
}

/// `LSF <user> <dir>`: the directory listing, `LFD 0` both when the
/// directory is empty and when the user or directory is unknown.
async fn list_files(mut args: impl Iterator<Item = &str>, state: &BsState) -> String {
    let parsed = (|| {
        let user: Username = args.next()?.parse().ok()?;
        let dir = args.next()?.to_owned();
        args.next().is_none().then_some((user, dir))
    })();
    let Some((user, dir)) = parsed else {
        log::debug!("malformed LSF arguments");
        return "LFD 0\n".to_owned();
    };

    let user_dir = state.user_dir(&user);
    if !state.users.contains(&user).await
        || !fsutil::is_safe_component(&dir)
        || !user_dir.join(&dir).is_dir()
    {
        log::info!("{user}: LSF {dir} -> nothing here");
        return "LFD 0\n".to_owned();
    }

    match fsutil::list_files(&user_dir.join(&dir)) {
        Ok(files) => {
            log::info!("{user}: LSF {dir} -> {} file(s)", files.len());
            let mut reply = format!("LFD {}", files.len());
            filemeta::push_entries(&mut reply, &files);
            reply.push('\n');
            reply
        }
        Err(e) => {
            log::error!("{user}: listing {dir} failed: {e}");
            "LFD 0\n".to_owned()
        }
    }
}
