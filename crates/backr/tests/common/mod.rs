//! Helpers spinning up real servers on loopback ports for the end-to-end
//! tests. Each server gets its own temporary directory for snapshots and
//! user trees; dropping the handles at the end of a test tears everything
//! down with the runtime.

#![allow(dead_code)] // each test binary uses its own subset

use backr::{BsConfig, BsServer, CancellationToken, Client, CsConfig, CsServer};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub struct TestCs {
    pub addr: SocketAddr,
    pub data_dir: TempDir,
    pub shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<backr::Result<()>>,
}

impl TestCs {
    pub fn client(&self) -> Client {
        Client::new("127.0.0.1", self.addr.port())
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

pub async fn spawn_cs() -> TestCs {
    let data_dir = tempfile::tempdir().unwrap();
    let config = CsConfig {
        bind_ip: LOCALHOST,
        port: 0,
        data_dir: data_dir.path().to_owned(),
    };
    let server = CsServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    TestCs {
        addr,
        data_dir,
        shutdown,
        handle,
    }
}

pub struct TestBs {
    pub addr: SocketAddr,
    pub root: TempDir,
    pub shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<backr::Result<()>>,
}

impl TestBs {
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

pub async fn spawn_bs(cs: &TestCs) -> TestBs {
    let root = tempfile::tempdir().unwrap();
    let config = BsConfig {
        bind_ip: LOCALHOST,
        port: 0,
        cs_host: "127.0.0.1".to_owned(),
        cs_port: cs.addr.port(),
        advertise_ip: Some(LOCALHOST),
        root: root.path().to_owned(),
    };
    let server = BsServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    server.register().await.unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    TestBs {
        addr,
        root,
        shutdown,
        handle,
    }
}

/// A client already logged in as `user`.
pub async fn login(cs: &TestCs, user: &str, pass: &str) -> Client {
    let mut client = cs.client();
    client.login(user, pass).await.unwrap();
    client
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Modification time in whole seconds since the epoch, the resolution the
/// wire format carries.
pub fn mtime_secs(path: &Path) -> u64 {
    std::fs::metadata(path)
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
