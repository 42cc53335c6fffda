//! Server role: accept transfer requests and push files.
//!
//! The [`Server`] owns one socket for its whole lifetime and serves one
//! client at a time:
//!
//! ```text
//!  Idle ──GET "name"──▶ TransferInProgress ──done/aborted──▶ Idle
//!            │                  │
//!            │                  ├─ drive WindowSender (gremlin, timers, ACK/NAK)
//!            └─ reject bad      └─ closing handshake (success marker)
//!               requests
//! ```
//!
//! Only socket-level failures escape [`Server::run`]; everything that can go
//! wrong with a single transfer (unreadable file, unresponsive client,
//! exhausted retransmission budget) is logged and returns the loop to idle,
//! ready for the next request.

use std::net::SocketAddr;

use crate::gremlin::{Gremlin, GremlinConfig};
use crate::packet::{Packet, PacketType, PACKET_SIZE, SEQ_SPACE, SUCCESS_MARKER, WINDOW_SIZE};
use crate::sender::{SenderState, TimeoutEvent, TransmitKind, WindowSender};
use crate::sequence::TransferSequence;
use crate::socket::{Socket, SocketError};
use crate::state::ServerState;
use crate::timer::{TransferConfig, TransferTimer};

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Long-running server session controller.
pub struct Server {
    /// Current request-loop state.
    pub state: ServerState,
    socket: Socket,
    gremlin: Gremlin,
    config: TransferConfig,
}

impl Server {
    /// Bind the server socket.  The gremlin lives as long as the process so
    /// its RNG stream is continuous across transfers.
    pub async fn bind(
        addr: SocketAddr,
        gremlin: GremlinConfig,
        config: TransferConfig,
    ) -> Result<Self, SocketError> {
        let socket = Socket::bind(addr).await?;
        Ok(Server {
            state: ServerState::Idle,
            socket,
            gremlin: Gremlin::new(gremlin),
            config,
        })
    }

    /// Address the server is actually bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Serve requests forever.  Returns only on a fatal socket error.
    pub async fn run(&mut self) -> Result<(), SocketError> {
        log::info!(
            "[server] listening on {} (window {WINDOW_SIZE}, {PACKET_SIZE}-byte frames)",
            self.socket.local_addr
        );
        loop {
            log::info!("[server] waiting for client connection");
            let (name, client) = self.await_request().await?;
            self.serve_file(&name, client).await?;
        }
    }

    // -----------------------------------------------------------------------
    // Idle state: request intake
    // -----------------------------------------------------------------------

    /// Block until a valid GET request arrives; invalid traffic is logged
    /// and dropped without leaving the idle state.
    async fn await_request(&mut self) -> Result<(String, SocketAddr), SocketError> {
        loop {
            let (packet, from) = match self.socket.recv_from().await {
                Ok(received) => received,
                Err(SocketError::Packet(err)) => {
                    log::debug!("[server] discarding undecodable datagram: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };

            if packet.kind != PacketType::Get {
                log::debug!("[server] ignoring {} from {from} while idle", packet.kind);
                continue;
            }

            match request_filename(&packet) {
                Ok(name) => {
                    log::info!("[server] transfer of \"{name}\" requested by {from}");
                    return Ok((name, from));
                }
                Err(reason) => {
                    log::warn!("[server] rejecting request from {from}: {reason}");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transfer state
    // -----------------------------------------------------------------------

    /// Run one transfer end to end and return to idle.
    ///
    /// Per-transfer failures are consumed here; only socket errors propagate.
    async fn serve_file(&mut self, name: &str, client: SocketAddr) -> Result<(), SocketError> {
        if self.state != ServerState::Idle {
            log::warn!(
                "[server] rejecting \"{name}\" from {client}: session is {}",
                self.state
            );
            return Ok(());
        }

        let mut file = match tokio::fs::File::open(name).await {
            Ok(file) => file,
            Err(err) => {
                log::warn!("[server] rejecting \"{name}\": {err}");
                return Ok(());
            }
        };
        let sequence = match TransferSequence::from_reader(&mut file).await {
            Ok(sequence) => sequence,
            Err(err) => {
                log::warn!("[server] rejecting \"{name}\": {err}");
                return Ok(());
            }
        };

        log::info!(
            "[server] sending \"{name}\" to {client}: {} byte(s) in {} frame(s)",
            sequence.total_bytes(),
            sequence.frame_count()
        );
        self.state = ServerState::TransferInProgress;

        let mut sender = WindowSender::new(sequence, self.config.clone());
        let outcome = self.drive_sender(&mut sender, client).await?;

        match outcome {
            SenderState::Done => {
                log::info!("[server] \"{name}\" fully acknowledged");
                self.closing_handshake(client).await?;
            }
            SenderState::Aborted => {
                log::error!(
                    "[server] transfer of \"{name}\" abandoned at frame {} of {}: client not responding",
                    sender.window_base,
                    sender.total_frames()
                );
            }
            other => unreachable!("drive_sender returned while {other:?}"),
        }

        self.state = ServerState::Idle;
        Ok(())
    }

    /// Pump the window sender until it finishes: transmit everything that is
    /// wire-ready, let the timers fire go-back-N, and feed back ACK/NAK
    /// traffic from the client.
    async fn drive_sender(
        &mut self,
        sender: &mut WindowSender,
        client: SocketAddr,
    ) -> Result<SenderState, SocketError> {
        loop {
            while let Some(transmit) = sender.next_transmit(&mut self.gremlin) {
                self.socket.send_frame(&transmit.wire, client).await?;
                let seq = (transmit.index % SEQ_SPACE as usize) as u8;
                match transmit.kind {
                    TransmitKind::Fresh => log::debug!(
                        "[server] → TRN seq={seq} (frame {} of {})",
                        transmit.index + 1,
                        sender.total_frames()
                    ),
                    TransmitKind::Retransmit => log::debug!("[server] → TRN seq={seq} (resend)"),
                    TransmitKind::DelayedFlush => {
                        log::debug!("[server] → TRN seq={seq} (released after delay)")
                    }
                }
            }

            if sender.is_finished() {
                return Ok(sender.state());
            }

            match sender.check_timeout() {
                Some(TimeoutEvent::WindowReset) => {
                    log::warn!(
                        "[server] ack timeout — resending window from frame {}",
                        sender.window_base
                    );
                    continue;
                }
                Some(TimeoutEvent::Aborted) => continue,
                None => {}
            }

            let wait = sender
                .wait_hint()
                .unwrap_or(self.config.receive_timeout)
                .min(self.config.receive_timeout);

            match self.socket.recv_timeout(wait).await {
                Ok(Some((packet, from))) if from == client => match packet.kind {
                    PacketType::Ack => {
                        let expected = ((sender.window_base + 1) % SEQ_SPACE as usize) as u8;
                        if sender.on_ack(packet.sequence) {
                            log::debug!(
                                "[server] ← ACK seq={} ({} of {} frames confirmed)",
                                packet.sequence,
                                sender.window_base,
                                sender.total_frames()
                            );
                        } else {
                            log::debug!(
                                "[server] ← stale ACK seq={} (expecting {expected})",
                                packet.sequence
                            );
                        }
                    }
                    PacketType::Nak => {
                        log::warn!(
                            "[server] ← NAK seq={} — resending window without waiting",
                            packet.sequence
                        );
                        sender.on_nak();
                    }
                    other => {
                        log::debug!("[server] ignoring {other} during an active transfer")
                    }
                },
                Ok(Some((_, from))) => {
                    log::debug!("[server] dropping datagram from unexpected peer {from}");
                }
                Ok(None) => {} // quiet socket; the timers decide what happens next
                Err(SocketError::Packet(err)) => {
                    log::debug!("[server] discarding undecodable datagram: {err}");
                }
                Err(err) => return Err(err),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Closing handshake
    // -----------------------------------------------------------------------

    /// Send the success marker and give the client a bounded window to echo
    /// it back.  A missing echo is logged, not an error: the transfer itself
    /// already completed.
    async fn closing_handshake(&mut self, client: SocketAddr) -> Result<(), SocketError> {
        let marker = Packet::data(PacketType::Get, 0, SUCCESS_MARKER);
        self.socket.send_to(&marker, client).await?;
        log::debug!("[server] → success marker");

        let timer = TransferTimer::start();
        while !timer.timeout(self.config.closing_timeout) {
            let wait = timer.remaining(self.config.closing_timeout);
            match self.socket.recv_timeout(wait).await {
                Ok(Some((packet, from))) if from == client && packet.kind == PacketType::Get => {
                    log::info!("[server] session closed by client");
                    return Ok(());
                }
                Ok(Some(_)) => continue, // late ACKs and strays
                Ok(None) => break,
                Err(SocketError::Packet(err)) => {
                    log::debug!("[server] discarding undecodable datagram: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        log::warn!("[server] client never echoed the success marker; returning to idle");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

/// Extract and validate the requested filename from a GET payload.
///
/// The payload is read up to the first NUL byte.  Empty names, the reserved
/// success marker, and non-UTF-8 names are refused.
fn request_filename(packet: &Packet) -> Result<String, &'static str> {
    let raw = match packet.payload.iter().position(|&b| b == 0) {
        Some(nul) => &packet.payload[..nul],
        None => &packet.payload[..],
    };

    if raw.is_empty() {
        return Err("empty filename");
    }
    if raw == SUCCESS_MARKER {
        return Err("filename matches the reserved success marker");
    }
    match std::str::from_utf8(raw) {
        Ok(name) => Ok(name.to_owned()),
        Err(_) => Err("filename is not valid UTF-8"),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn get(payload: &[u8]) -> Packet {
        Packet::data(PacketType::Get, 0, payload)
    }

    #[test]
    fn filename_reads_up_to_the_first_nul() {
        let mut payload = b"notes.txt".to_vec();
        payload.push(0);
        payload.extend_from_slice(b"trailing junk");
        assert_eq!(request_filename(&get(&payload)).unwrap(), "notes.txt");
    }

    #[test]
    fn filename_without_nul_uses_the_whole_payload() {
        assert_eq!(request_filename(&get(b"data.bin")).unwrap(), "data.bin");
    }

    #[test]
    fn empty_filename_is_refused() {
        assert!(request_filename(&get(b"")).is_err());
        assert!(request_filename(&get(&[0, 0, 0])).is_err());
    }

    #[test]
    fn success_marker_is_not_a_filename() {
        assert!(request_filename(&get(SUCCESS_MARKER)).is_err());
    }

    #[test]
    fn non_utf8_filename_is_refused() {
        assert!(request_filename(&get(&[0xFF, 0xFE, b'a'])).is_err());
    }

    #[tokio::test]
    async fn serving_requires_an_idle_session() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("gated.bin");
        std::fs::write(&path, b"gated payload").expect("stage payload");
        let name = path.to_str().expect("utf-8 temp path").to_owned();

        let config = TransferConfig {
            retransmit_timeout: Duration::from_millis(10),
            max_retries: 1,
            receive_timeout: Duration::from_millis(20),
            ..TransferConfig::default()
        };
        let mut server = Server::bind(
            "127.0.0.1:0".parse().unwrap(),
            GremlinConfig::default(),
            config,
        )
        .await
        .expect("bind server");
        assert_eq!(server.state, ServerState::Idle, "fresh sessions start idle");

        let spy = Socket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind spy");

        // A busy session must refuse to start a second transfer.
        server.state = ServerState::TransferInProgress;
        server
            .serve_file(&name, spy.local_addr)
            .await
            .expect("a refusal is not an error");
        let quiet = spy
            .recv_timeout(Duration::from_millis(50))
            .await
            .expect("socket failure");
        assert!(quiet.is_none(), "gated serve still sent {quiet:?}");

        // Back in idle the same request goes out on the wire; the spy never
        // ACKs, so the transfer aborts and the session returns to idle.
        server.state = ServerState::Idle;
        server
            .serve_file(&name, spy.local_addr)
            .await
            .expect("serve failed");
        let (frame, _) = spy
            .recv_timeout(Duration::from_millis(200))
            .await
            .expect("socket failure")
            .expect("no frame reached the wire");
        assert_eq!(frame.kind, PacketType::Trn);
        assert_eq!(frame.sequence, 0);
        assert_eq!(server.state, ServerState::Idle);
    }
}
