//! Process lifecycle: signal handling, the shared session acceptor, and
//! the top-level entry points the CLI binary calls into.
//!
//! Shutdown is cooperative: the termination signal cancels a token, the
//! acceptors stop taking connections, in-flight session workers get a
//! bounded grace period to finish their current transfer, and every map is
//! snapshotted one final time on the way out.

use crate::{BsConfig, BsServer, CsConfig, CsServer};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How long in-flight sessions may keep running after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs a central server until SIGINT/SIGTERM.
pub async fn run_cs(config: CsConfig) -> crate::Result<()> {
    let server = CsServer::bind(&config).await?;
    log::info!("central server listening on {}", server.local_addr()?);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));
    server.run(shutdown).await
}

/// Runs a backup server until SIGINT/SIGTERM. Failure to register with the
/// CS is fatal.
pub async fn run_bs(config: BsConfig) -> crate::Result<()> {
    let server = BsServer::bind(&config).await?;
    log::info!("backup server listening on {}", server.local_addr()?);
    server.register().await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));
    server.run(shutdown).await
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    wait_for_signal().await;
    log::info!("shutdown signal received");
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            log::warn!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Accepts connections until `shutdown` cancels, spawning one session task
/// per connection, then drains the still-running sessions for up to
/// [`SHUTDOWN_GRACE`].
pub(crate) async fn accept_loop<F, Fut>(
    listener: TcpListener,
    shutdown: CancellationToken,
    mut serve: F,
) where
    F: FnMut(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut sessions: JoinSet<()> = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    log::debug!("accepted connection from {peer}");
                    sessions.spawn(serve(stream, peer));
                }
                Err(e) => log::warn!("accept failed: {e}"),
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    log::debug!("session task ended abnormally: {e}");
                }
            }
        }
    }
    drop(listener);

    if sessions.is_empty() {
        return;
    }
    log::info!(
        "waiting up to {SHUTDOWN_GRACE:?} for {} running session(s)",
        sessions.len()
    );
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        log::warn!("sessions still running at shutdown, aborting them");
        sessions.abort_all();
    }
}

/// The local address the OS would route towards the CS from; what a BS
/// announces in `REG` when no address was configured.
pub(crate) fn local_ip_towards(cs_host: &str, cs_port: u16) -> crate::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((cs_host, cs_port))?;
    Ok(socket.local_addr()?.ip())
}

/// Best-effort local IP used for CLI defaults: the address routing towards
/// the public internet, falling back to loopback on isolated hosts.
pub fn best_local_ip() -> IpAddr {
    match local_ip_towards("8.8.8.8", 53) {
        Ok(ip) => ip,
        Err(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
