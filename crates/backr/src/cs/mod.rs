//! Central Server role.
//!
//! The CS tracks three maps: the registry of live backup servers with their
//! placement use-counts, the user credentials, and the sticky placement of
//! every backed-up directory. A datagram loop serves BS registration
//! ([`control`]); a stream acceptor serves authenticated client sessions
//! ([`session`]), one task per connection.

pub(crate) mod control;
pub(crate) mod session;

use crate::store::Store;
use crate::supervisor;
use backr_proto::{Password, Username};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const KNOWN_BS_SAVEFILE: &str = "cs_known_bs.json";
const VALID_USERS_SAVEFILE: &str = "cs_valid_users.json";
const DIRS_LOCATION_SAVEFILE: &str = "cs_dirs_location.json";

/// Address a backup server announced at registration, as clients will dial
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BsAddr {
    pub host: String,
    pub port: u16,
}

impl BsAddr {
    /// Pair usable with `ToSocketAddrs`.
    pub fn target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for BsAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CsConfig {
    pub bind_ip: IpAddr,
    /// Port shared by the control and session planes. `0` picks one.
    pub port: u16,
    /// Directory the durable snapshots live in.
    pub data_dir: PathBuf,
}

impl Default for CsConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: crate::DEFAULT_CS_PORT,
            data_dir: PathBuf::from("."),
        }
    }
}

pub(crate) struct CsState {
    /// `(host, port) → use_count`; bumped whenever the BS gains a directory.
    pub registry: Store<BsAddr, u32>,
    pub users: Store<Username, Password>,
    /// `(user, dir) → BS`, sticky for the life of the directory.
    pub placements: Store<(Username, String), BsAddr>,
}

impl CsState {
    fn load(data_dir: &Path) -> crate::Result<Self> {
        Ok(Self {
            registry: Store::load(data_dir.join(KNOWN_BS_SAVEFILE))?,
            users: Store::load(data_dir.join(VALID_USERS_SAVEFILE))?,
            placements: Store::load(data_dir.join(DIRS_LOCATION_SAVEFILE))?,
        })
    }

    /// Picks the least-used registered BS and bumps its use-count; ties go
    /// to iteration order. `None` when the registry is empty.
    pub async fn pick_least_used(&self) -> crate::Result<Option<BsAddr>> {
        if self.registry.read(|m| m.is_empty()).await {
            return Ok(None);
        }
        self.registry
            .mutate(|m| {
                let chosen = m
                    .iter()
                    .min_by_key(|(_, count)| **count)
                    .map(|(addr, _)| addr.clone());
                if let Some(addr) = &chosen {
                    if let Some(count) = m.get_mut(addr) {
                        *count += 1;
                    }
                }
                chosen
            })
            .await
    }

    /// Removes the user's credentials unless a placement still exists.
    ///
    /// The placement lock is held across the credentials removal so a
    /// concurrent `BCK` cannot slip a new placement underneath the delete.
    pub async fn delete_user_if_unplaced(&self, user: &Username) -> crate::Result<bool> {
        let placements = self.placements.guard().await;
        if placements.keys().any(|(owner, _)| owner == user) {
            return Ok(false);
        }
        self.users.remove(user).await?;
        Ok(true)
    }

    async fn snapshot_all(&self) -> crate::Result<()> {
        self.registry.snapshot().await?;
        self.users.snapshot().await?;
        self.placements.snapshot().await
    }
}

/// A bound central server, not yet serving.
pub struct CsServer {
    state: Arc<CsState>,
    control: backr_transport::DatagramServer,
    listener: TcpListener,
}

impl CsServer {
    /// Binds both planes on the configured port and restores the snapshots.
    pub async fn bind(config: &CsConfig) -> crate::Result<Self> {
        let control =
            backr_transport::DatagramServer::bind((config.bind_ip, config.port)).await?;
        let port = control.local_addr()?.port();
        let listener = TcpListener::bind((config.bind_ip, port)).await?;
        let state = Arc::new(CsState::load(&config.data_dir)?);
        Ok(Self {
            state,
            control,
            listener,
        })
    }

    /// The session-plane address (the control plane shares the port).
    pub fn local_addr(&self) -> crate::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves both planes until `shutdown` is cancelled, then drains the
    /// in-flight sessions and snapshots all three maps.
    pub async fn run(self, shutdown: CancellationToken) -> crate::Result<()> {
        let CsServer {
            state,
            control,
            listener,
        } = self;

        let control_task = tokio::spawn(control::run(control, state.clone(), shutdown.clone()));

        let session_state = state.clone();
        supervisor::accept_loop(listener, shutdown, move |stream, peer| {
            session::serve(stream, peer, session_state.clone())
        })
        .await;

        let _ = control_task.await;
        state.snapshot_all().await?;
        log::info!("central server stopped");
        Ok(())
    }
}
