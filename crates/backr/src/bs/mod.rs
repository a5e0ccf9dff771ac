//! Backup Server role.
//!
//! A BS holds user files in a two-level `<root>/<user>/<dir>/<file>` tree
//! and mirrors the credentials of the users whose directories it hosts. The
//! datagram loop ([`control`]) serves provisioning orders from the CS; the
//! stream plane ([`session`]) moves file bytes directly to and from
//! clients. The server registers itself with the CS at startup and
//! unregisters on shutdown.

pub(crate) mod control;
pub(crate) mod session;

use crate::store::Store;
use crate::{Error, supervisor};
use backr_proto::msg::RegistryRequest;
use backr_proto::{Password, Status, Username, parse_status_reply};
use backr_transport::DatagramClient;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const USERS_SAVEFILE: &str = "bs_known_users.json";

#[derive(Debug, Clone)]
pub struct BsConfig {
    pub bind_ip: IpAddr,
    /// Port shared by the control and session planes. `0` picks one.
    pub port: u16,
    pub cs_host: String,
    pub cs_port: u16,
    /// Address announced to the CS; derived from the route towards the CS
    /// when unset.
    pub advertise_ip: Option<IpAddr>,
    /// Root of the user directory tree (and of the snapshot file).
    pub root: PathBuf,
}

impl Default for BsConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: crate::DEFAULT_BS_PORT,
            cs_host: Ipv4Addr::LOCALHOST.to_string(),
            cs_port: crate::DEFAULT_CS_PORT,
            advertise_ip: None,
            root: PathBuf::from("."),
        }
    }
}

pub(crate) struct BsState {
    /// Users provisioned on this BS, a subset of the CS's credentials.
    pub users: Store<Username, Password>,
    pub root: PathBuf,
}

impl BsState {
    pub fn user_dir(&self, user: &Username) -> PathBuf {
        self.root.join(user.as_str())
    }
}

/// A bound backup server, not yet serving nor registered.
pub struct BsServer {
    state: Arc<BsState>,
    control: backr_transport::DatagramServer,
    listener: TcpListener,
    cs_target: (String, u16),
    advertised_host: String,
    advertised_port: u16,
}

impl BsServer {
    pub async fn bind(config: &BsConfig) -> crate::Result<Self> {
        std::fs::create_dir_all(&config.root)?;
        let control =
            backr_transport::DatagramServer::bind((config.bind_ip, config.port)).await?;
        let port = control.local_addr()?.port();
        let listener = TcpListener::bind((config.bind_ip, port)).await?;

        let advertised_ip = match config.advertise_ip {
            Some(ip) => ip,
            None => supervisor::local_ip_towards(&config.cs_host, config.cs_port)?,
        };
        let state = Arc::new(BsState {
            users: Store::load(config.root.join(USERS_SAVEFILE))?,
            root: config.root.clone(),
        });
        Ok(Self {
            state,
            control,
            listener,
            cs_target: (config.cs_host.clone(), config.cs_port),
            advertised_host: advertised_ip.to_string(),
            advertised_port: port,
        })
    }

    pub fn local_addr(&self) -> crate::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Announces this BS to the CS. Startup is aborted when the CS is
    /// unreachable or refuses the registration.
    pub async fn register(&self) -> crate::Result<()> {
        let request = RegistryRequest::Register {
            host: self.advertised_host.clone(),
            port: self.advertised_port,
        };
        let client = DatagramClient::connect((self.cs_target.0.as_str(), self.cs_target.1)).await?;
        let raw = client.exchange(&request.encode()).await?;
        match parse_status_reply(&raw, "RGR")? {
            Status::Ok => {
                log::info!(
                    "registered with central server as {}:{}",
                    self.advertised_host,
                    self.advertised_port
                );
                Ok(())
            }
            refused => Err(Error::Registration(refused)),
        }
    }

    async fn unregister(
        cs_target: &(String, u16),
        host: &str,
        port: u16,
    ) -> crate::Result<Status> {
        let request = RegistryRequest::Unregister {
            host: host.to_owned(),
            port,
        };
        let client = DatagramClient::connect((cs_target.0.as_str(), cs_target.1)).await?;
        let raw = client.exchange(&request.encode()).await?;
        Ok(parse_status_reply(&raw, "UAR")?)
    }

    /// Serves both planes until `shutdown` is cancelled. The `UNR` goes out
    /// as soon as the signal arrives, while in-flight sessions drain.
    pub async fn run(self, shutdown: CancellationToken) -> crate::Result<()> {
        let BsServer {
            state,
            control,
            listener,
            cs_target,
            advertised_host,
            advertised_port,
        } = self;

        let control_task = tokio::spawn(control::run(control, state.clone(), shutdown.clone()));

        let session_state = state.clone();
        let sessions = supervisor::accept_loop(listener, shutdown.clone(), move |stream, peer| {
            session::serve(stream, peer, session_state.clone())
        });

        let unregistration = async {
            shutdown.cancelled().await;
            match Self::unregister(&cs_target, &advertised_host, advertised_port).await {
                Ok(Status::Ok) => log::info!("unregistered from central server"),
                Ok(refused) => log::warn!("central server answered UNR with {refused}"),
                Err(e) => log::warn!("could not unregister from central server: {e}"),
            }
        };

        let ((), ()) = tokio::join!(sessions, unregistration);

        let _ = control_task.await;
        state.users.snapshot().await?;
        log::info!("backup server stopped");
        Ok(())
    }
}
