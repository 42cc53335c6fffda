//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! whole 512-byte protocol frames instead of raw streams.  All protocol
//! logic lives elsewhere; this module owns only byte I/O.
//!
//! Receive errors distinguish OS-level failures (fatal to the caller) from
//! undecodable datagrams (discarded by the caller with a log line); sending
//! never fails for protocol reasons because every frame is fixed-size.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError, PACKET_SIZE};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    Io(std::io::Error),
    /// The received datagram could not be decoded as a valid packet.
    Packet(PacketError),
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "socket I/O error: {e}"),
            Self::Packet(e) => write!(f, "packet decode error: {e}"),
        }
    }
}

impl std::error::Error for SocketError {}

impl From<std::io::Error> for SocketError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<PacketError> for SocketError {
    fn from(e: PacketError) -> Self {
        Self::Packet(e)
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, frame-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `packet` and send it as a single UDP datagram to `dest`.
    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        self.send_frame(&packet.encode(), dest).await
    }

    /// Send already-encoded frame bytes to `dest`.
    ///
    /// The send side uses this for data frames whose bytes have been through
    /// the fault injector and must go out exactly as mutated.
    pub async fn send_frame(
        &self,
        wire: &[u8; PACKET_SIZE],
        dest: SocketAddr,
    ) -> Result<(), SocketError> {
        self.inner.send_to(wire, dest).await?;
        Ok(())
    }

    /// Receive the next datagram and decode it into a [`Packet`].
    ///
    /// Returns `(packet, sender_address)`.  Datagrams that fail to decode are
    /// returned as `Err` — the caller decides whether to retry.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = [0u8; PACKET_SIZE];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let packet = Packet::decode(&buf[..n])?;
        Ok((packet, addr))
    }

    /// [`recv_from`](Self::recv_from) with a bounded wait.
    ///
    /// Returns `Ok(None)` when `wait` elapses with no datagram, turning the
    /// caller's poll loop into timeout-and-retry instead of an open-ended
    /// block.
    pub async fn recv_timeout(
        &self,
        wait: Duration,
    ) -> Result<Option<(Packet, SocketAddr)>, SocketError> {
        match tokio::time::timeout(wait, self.recv_from()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    async fn loopback_pair() -> (Socket, Socket) {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn frames_round_trip_between_two_sockets() {
        let (a, b) = loopback_pair().await;
        let sent = Packet::data(PacketType::Trn, 4, b"over the wire");
        a.send_to(&sent, b.local_addr).await.unwrap();

        let (received, from) = b.recv_from().await.unwrap();
        assert_eq!(received, sent);
        assert_eq!(from, a.local_addr);
    }

    #[tokio::test]
    async fn recv_timeout_returns_none_on_a_silent_socket() {
        let (_a, b) = loopback_pair().await;
        let got = b.recv_timeout(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn undecodable_datagram_surfaces_as_a_packet_error() {
        let (a, b) = loopback_pair().await;
        let mut junk = Packet::control(PacketType::Ack, 0).encode();
        junk[0] = 0xFF;
        a.send_frame(&junk, b.local_addr).await.unwrap();

        match b.recv_from().await {
            Err(SocketError::Packet(PacketError::UnknownType(0xFF))) => {}
            other => panic!("expected an unknown-type decode error, got {other:?}"),
        }
    }
}
