//! Datagram (UDP) side of the transport: a connected request/response
//! client bounded by a deadline, and a minimal bound server.

use crate::{DEFAULT_TIMEOUT, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{ToSocketAddrs, UdpSocket};

/// Largest datagram either side will send or accept.
pub const MAX_DATAGRAM: usize = 2048;

/// Connected UDP socket for one-shot request/response exchanges.
///
/// Exceeding the deadline is fatal to the caller; there are no retries at
/// this layer.
pub struct DatagramClient {
    socket: UdpSocket,
    deadline: Duration,
}

impl DatagramClient {
    /// Connects with the default 5 second deadline.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        Self::connect_with(addr, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with<A: ToSocketAddrs>(
        addr: A,
        deadline: Duration,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        Ok(Self { socket, deadline })
    }

    /// Sends one request datagram and awaits a single reply.
    pub async fn exchange(&self, request: &str) -> Result<String, TransportError> {
        self.socket.send(request.as_bytes()).await?;
        let mut buf = [0u8; MAX_DATAGRAM];
        let len = tokio::time::timeout(self.deadline, self.socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)??;
        std::str::from_utf8(&buf[..len])
            .map(str::to_owned)
            .map_err(|_| TransportError::NotUtf8)
    }

    /// The local address this client sends from.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

/// Bound UDP socket serving a single-task control plane.
///
/// Receives block indefinitely; replies go back to whichever peer sent the
/// request.
pub struct DatagramServer {
    socket: UdpSocket,
}

impl DatagramServer {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receives one datagram, decoded leniently; token parsing downstream
    /// turns garbage into a protocol-level error reply.
    pub async fn recv_from(&self) -> Result<(String, SocketAddr), TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, peer) = self.socket.recv_from(&mut buf).await?;
        Ok((String::from_utf8_lossy(&buf[..len]).into_owned(), peer))
    }

    pub async fn send_to(&self, reply: &str, peer: SocketAddr) -> Result<(), TransportError> {
        self.socket.send_to(reply.as_bytes(), peer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exchange_round_trips() {
        let server = DatagramServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let (msg, peer) = server.recv_from().await.unwrap();
            server.send_to(&format!("echo {msg}"), peer).await.unwrap();
        });

        let client = DatagramClient::connect(addr).await.unwrap();
        let reply = client.exchange("ping\n").await.unwrap();
        assert_eq!(reply, "echo ping\n");
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let server = DatagramServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = DatagramClient::connect_with(addr, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(
            client.exchange("ping\n").await,
            Err(TransportError::Timeout)
        ));
    }
}
