//! CS control plane: the datagram loop backup servers register with.
//!
//! Single task, no per-peer state. `REG` inserts a `(host, port)` pair at
//! use-count zero, `UNR` removes it; both snapshot the registry.

use super::{BsAddr, CsState};
use crate::store::InsertOutcome;
use backr_proto::Status;
use backr_transport::DatagramServer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run(server: DatagramServer, state: Arc<CsState>, shutdown: CancellationToken) {
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

async fn dispatch(request: &str, state: &CsState) -> String {
    let line = request.strip_suffix('\n').unwrap_or(request);
    let mut tokens = line.split(' ');
    match tokens.next() {
        Some("REG") => format!("RGR {}\n", register(tokens, state).await),
        Some("UNR") => format!("UAR {}\n", unregister(tokens, state).await),
        _ => {
            log::debug!("unknown control verb in {line:?}");
            "ERR\n".to_owned()
        }
    }
}

async fn register(args: impl Iterator<Item = &str>, state: &CsState) -> Status {
    let Some(addr) = parse_addr(args) else {
        return Status::Err;
    };
    match state.registry.try_insert(addr.clone(), 0).await {
        Ok(InsertOutcome::Inserted) => {
            log::info!("backup server {addr} registered");
            Status::Ok
        }
        Ok(_) => {
            log::info!("backup server {addr} is already registered");
            Status::Nok
        }
        Err(e) => {
            log::error!("registry snapshot failed: {e}");
            Status::Err
        }
    }
}

async fn unregister(args: impl Iterator<Item = &str>, state: &CsState) -> Status {
    let Some(addr) = parse_addr(args) else {
        return Status::Err;
    };
    match state.registry.remove(&addr).await {
        Ok(true) => {
            log::info!("backup server {addr} unregistered");
            Status::Ok
        }
        Ok(false) => {
            log::info!("backup server {addr} was not registered");
            Status::Nok
        }
        Err(e) => {
            log::error!("registry snapshot failed: {e}");
            Status::Err
        }
    }
}

fn parse_addr<'a>(mut args: impl Iterator<Item = &'a str>) -> Option<BsAddr> {
    let host = args.next().filter(|h| !h.is_empty())?.to_owned();
    let port = args.next()?.parse().ok()?;
    match args.next() {
        Some(_) => None,
        None => Some(BsAddr { host, port }),
    }
}
