//! UDP datagram transport.
//!
//! Best-effort send and receive with no delivery guarantee, no retry, and
//! no ordering across datagrams. The receive path takes an optional
//! timeout so callers can interleave shutdown checks with blocking reads.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind UDP socket to {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A bound UDP socket.
pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    /// Bind a UDP socket to the given local address.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self { socket })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram to the target endpoint. Best-effort: a successful
    /// return means the datagram was handed to the kernel, nothing more.
    pub async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, TransportError> {
        Ok(self.socket.send_to(buf, target).await?)
    }

    /// Receive one datagram.
    ///
    /// With `timeout = Some(d)`, waits at most `d` and returns `Ok(None)`
    /// when nothing arrived. With `timeout = None`, blocks until a
    /// datagram arrives.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<(usize, SocketAddr)>, TransportError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.socket.recv_from(buf)).await {
                Ok(received) => Ok(Some(received?)),
                Err(_elapsed) => Ok(None),
            },
            None => Ok(Some(self.socket.recv_from(buf).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback() -> Transport {
        Transport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind failed")
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let a = loopback().await;
        let b = loopback().await;
        let b_addr = b.local_addr().expect("local_addr failed");

        let sent = a.send_to(b"ping", b_addr).await.expect("send failed");
        assert_eq!(sent, 4);

        let mut buf = [0u8; 64];
        let (n, from) = b
            .recv_from(&mut buf, Some(Duration::from_secs(1)))
            .await
            .expect("recv failed")
            .expect("timed out");
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a.local_addr().expect("local_addr failed"));
    }

    #[tokio::test]
    async fn test_recv_timeout_returns_none() {
        let socket = loopback().await;
        let mut buf = [0u8; 64];
        let received = socket
            .recv_from(&mut buf, Some(Duration::from_millis(50)))
            .await
            .expect("recv failed");
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let first = loopback().await;
        let addr = first.local_addr().expect("local_addr failed");

        // Second bind to the same port must fail with the Bind variant.
        match Transport::bind(addr).await {
            Err(TransportError::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }
}
