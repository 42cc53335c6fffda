//! Client role: request one file and receive it.
//!
//! A client is short-lived: it sends a single GET, drives a [`Receiver`]
//! until the sentinel frame closes the stream, writes every accepted chunk
//! to the output file in order, then sends the success marker and exits.
//!
//! The GET itself is never retried.  If it (or the whole server) goes
//! missing, the receive loop runs out of its consecutive-timeout budget and
//! the transfer fails with [`ClientError::ServerDead`] — the operator
//! simply runs the client again.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::packet::{Packet, PacketType, SUCCESS_MARKER};
use crate::receiver::{ReceiveAction, Receiver};
use crate::socket::{Socket, SocketError};
use crate::state::ClientState;
use crate::timer::TransferConfig;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Ways a client transfer can fail.
#[derive(Debug)]
pub enum ClientError {
    /// Socket-level failure (bind, send, receive).
    Socket(SocketError),
    /// The output file could not be created or written.
    Io(std::io::Error),
    /// The consecutive receive-timeout budget ran out.
    ServerDead,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(e) => write!(f, "socket failure: {e}"),
            Self::Io(e) => write!(f, "output file error: {e}"),
            Self::ServerDead => write!(f, "server not responding"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<SocketError> for ClientError {
    fn from(e: SocketError) -> Self {
        Self::Socket(e)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Transfer report
// ---------------------------------------------------------------------------

/// What a completed transfer delivered, for the caller's final log line.
#[derive(Debug, Clone, Copy)]
pub struct TransferReport {
    /// Payload bytes written to the output file.
    pub bytes: usize,
}

// ---------------------------------------------------------------------------
// Client run loop
// ---------------------------------------------------------------------------

/// Request `file` from `server` and write it to `output`.
pub async fn run(
    server: SocketAddr,
    bind: SocketAddr,
    file: &str,
    output: &Path,
    config: TransferConfig,
) -> Result<TransferReport, ClientError> {
    let socket = Socket::bind(bind).await?;
    log::info!("[client] bound {}", socket.local_addr);

    let request = Packet::data(PacketType::Get, 0, file.as_bytes());
    socket.send_to(&request, server).await?;
    log::info!("[client] → GET \"{file}\" to {server}");

    let mut sink = tokio::fs::File::create(output).await?;
    let mut receiver = Receiver::new(config.dead_threshold);
    let mut state = ClientState::AwaitingPacket;

    while state == ClientState::AwaitingPacket {
        let (packet, from) = match socket.recv_timeout(config.receive_timeout).await {
            Ok(Some(received)) => received,
            Ok(None) => {
                log::warn!("[client] server not responding");
                if receiver.record_timeout() {
                    log::error!("[client] giving up on \"{file}\"");
                    return Err(ClientError::ServerDead);
                }
                continue;
            }
            Err(SocketError::Packet(err)) => {
                log::debug!("[client] discarding undecodable datagram: {err}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if from != server {
            log::debug!("[client] dropping datagram from unexpected peer {from}");
            continue;
        }

        match receiver.on_packet(&packet) {
            ReceiveAction::Deliver { ack } => {
                log::debug!(
                    "[client] ← TRN seq={} len={} {:?}",
                    packet.sequence,
                    packet.length,
                    preview(&packet.payload)
                );
                sink.write_all(&packet.payload).await?;
                send_control(&socket, PacketType::Ack, ack, server).await?;
            }
            ReceiveAction::Finalize { ack } => {
                sink.flush().await?;
                log::info!(
                    "[client] ← end of stream: {} byte(s) written to {}",
                    receiver.bytes_delivered(),
                    output.display()
                );
                send_control(&socket, PacketType::Ack, ack, server).await?;
                state = ClientState::Closing;
            }
            ReceiveAction::Reject { nak } => {
                log::warn!("[client] ← damaged frame seq={}", packet.sequence);
                send_control(&socket, PacketType::Nak, nak, server).await?;
            }
            ReceiveAction::Resync { ack } => {
                log::debug!(
                    "[client] ← out-of-order frame seq={} (expecting {ack} next)",
                    packet.sequence
                );
                send_control(&socket, PacketType::Ack, ack, server).await?;
            }
            ReceiveAction::Ignore => {
                log::debug!("[client] ← {} discarded", packet.kind);
            }
        }
    }

    // The transfer is complete; tell the server so it can close the session.
    let marker = Packet::data(PacketType::Get, 0, SUCCESS_MARKER);
    socket.send_to(&marker, server).await?;
    log::info!("[client] → success marker");

    Ok(TransferReport {
        bytes: receiver.bytes_delivered(),
    })
}

/// Send one zero-length control frame.
async fn send_control(
    socket: &Socket,
    kind: PacketType,
    sequence: u8,
    dest: SocketAddr,
) -> Result<(), SocketError> {
    log::debug!("[client] → {kind} seq={sequence}");
    socket.send_to(&Packet::control(kind, sequence), dest).await
}

/// First bytes of a chunk for the debug log, lossily decoded.
fn preview(payload: &[u8]) -> String {
    let n = payload.len().min(48);
    String::from_utf8_lossy(&payload[..n]).into_owned()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_capped_at_forty_eight_bytes() {
        let long = vec![b'a'; 200];
        assert_eq!(preview(&long).len(), 48);
        assert_eq!(preview(b"short"), "short");
    }

    #[test]
    fn preview_survives_binary_data() {
        let got = preview(&[0xFF, 0xFE, b'o', b'k']);
        assert!(got.ends_with("ok"));
    }
}
