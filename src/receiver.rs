//! Receive-side state machine for an inbound file transfer.
//!
//! [`Receiver`] implements the strict in-order discipline the go-back-N
//! sender relies on:
//!
//! - Only the frame carrying exactly the next expected wire sequence is
//!   accepted; its payload is handed to the caller for the output sink.
//! - A damaged in-order frame is answered with a NAK so the sender rewinds
//!   without waiting for its retransmission timer.
//! - Duplicates and out-of-order frames are answered by repeating the
//!   current ACK, which resynchronizes a sender still resending an old
//!   window.
//! - The zero-length sentinel frame completes the transfer.
//!
//! The machine returns a [`ReceiveAction`] telling the caller what to put
//! on the wire and what to do with the payload; it never touches the socket
//! or the output file itself ([`crate::client`] owns that loop).

use crate::packet::{Packet, PacketType, SEQ_SPACE};

// ---------------------------------------------------------------------------
// ReceiveAction
// ---------------------------------------------------------------------------

/// What the drive loop must do in response to one inbound frame.
///
/// `ack`/`nak` carry the wire sequence to place in the outgoing control
/// frame: an ACK always names the **next** sequence the receiver expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveAction {
    /// In-order, intact data frame: write its payload to the sink, then
    /// send `ACK(ack)`.
    Deliver { ack: u8 },
    /// The sentinel arrived: finalize the sink, send `ACK(ack)`, and move
    /// to the closing handshake.
    Finalize { ack: u8 },
    /// In-order frame with a checksum mismatch: send `NAK(nak)`, deliver
    /// nothing.
    Reject { nak: u8 },
    /// Duplicate or out-of-order frame: repeat `ACK(ack)` so a sender stuck
    /// on an old window catches up.
    Resync { ack: u8 },
    /// Not a data frame (stray ACK/NAK/GET): drop it.
    Ignore,
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Receive-side state for one transfer.
#[derive(Debug)]
pub struct Receiver {
    /// Wire sequence of the next frame to accept, in `[0, 32)`.
    expected: u8,

    /// Set once the sentinel has been accepted.
    complete: bool,

    /// Payload bytes delivered to the sink so far.
    bytes_delivered: usize,

    /// Receive timeouts since the last inbound packet.
    consecutive_timeouts: u32,

    /// Timeout budget before the peer is declared dead.
    dead_threshold: u32,
}

impl Receiver {
    pub fn new(dead_threshold: u32) -> Self {
        Receiver {
            expected: 0,
            complete: false,
            bytes_delivered: 0,
            consecutive_timeouts: 0,
            dead_threshold,
        }
    }

    /// Wire sequence the receiver will accept next.
    pub fn expected_sequence(&self) -> u8 {
        self.expected
    }

    /// `true` once the sentinel frame has been accepted.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn bytes_delivered(&self) -> usize {
        self.bytes_delivered
    }

    /// Classify one inbound frame and advance the state accordingly.
    ///
    /// Any arrival, even one that only earns an [`ReceiveAction::Ignore`],
    /// proves the peer is alive and clears the timeout counter.
    pub fn on_packet(&mut self, packet: &Packet) -> ReceiveAction {
        self.consecutive_timeouts = 0;

        if packet.kind != PacketType::Trn {
            return ReceiveAction::Ignore;
        }
        if packet.sequence != self.expected {
            return ReceiveAction::Resync { ack: self.expected };
        }
        if !packet.verify() {
            return ReceiveAction::Reject { nak: self.expected };
        }

        self.expected = (self.expected + 1) % SEQ_SPACE;
        if packet.is_sentinel() {
            self.complete = true;
            ReceiveAction::Finalize { ack: self.expected }
        } else {
            self.bytes_delivered += packet.length as usize;
            ReceiveAction::Deliver { ack: self.expected }
        }
    }

    /// Record one expired receive wait.
    ///
    /// Returns `true` when the consecutive-timeout budget is exhausted and
    /// the transfer must be abandoned.
    pub fn record_timeout(&mut self) -> bool {
        self.consecutive_timeouts += 1;
        self.consecutive_timeouts > self.dead_threshold
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn data(seq: u8, payload: &[u8]) -> Packet {
        Packet::data(PacketType::Trn, seq, payload)
    }

    #[test]
    fn initial_state() {
        let r = Receiver::new(15);
        assert_eq!(r.expected_sequence(), 0);
        assert!(!r.is_complete());
        assert_eq!(r.bytes_delivered(), 0);
    }

    #[test]
    fn in_order_frame_delivers_and_acks_the_next_sequence() {
        let mut r = Receiver::new(15);
        let action = r.on_packet(&data(0, b"hello"));
        assert_eq!(action, ReceiveAction::Deliver { ack: 1 });
        assert_eq!(r.expected_sequence(), 1);
        assert_eq!(r.bytes_delivered(), 5);
    }

    #[test]
    fn sentinel_finalizes_the_transfer() {
        let mut r = Receiver::new(15);
        assert_eq!(r.on_packet(&data(0, b"abc")), ReceiveAction::Deliver { ack: 1 });

        let sentinel = Packet::control(PacketType::Trn, 1);
        assert_eq!(r.on_packet(&sentinel), ReceiveAction::Finalize { ack: 2 });
        assert!(r.is_complete());
        assert_eq!(r.bytes_delivered(), 3, "the sentinel delivers no bytes");
    }

    #[test]
    fn damaged_frame_is_nakked_without_advancing() {
        let mut r = Receiver::new(15);
        let mut frame = data(0, b"payload");
        frame.checksum = frame.checksum.wrapping_add(1);

        assert_eq!(r.on_packet(&frame), ReceiveAction::Reject { nak: 0 });
        assert_eq!(r.expected_sequence(), 0);
        assert_eq!(r.bytes_delivered(), 0);
    }

    #[test]
    fn duplicate_frame_is_reacked() {
        let mut r = Receiver::new(15);
        let frame = data(0, b"once");
        assert_eq!(r.on_packet(&frame), ReceiveAction::Deliver { ack: 1 });

        // The sender resends the same frame after a timeout.
        assert_eq!(r.on_packet(&frame), ReceiveAction::Resync { ack: 1 });
        assert_eq!(r.bytes_delivered(), 4, "duplicate must not deliver twice");
    }

    #[test]
    fn out_of_order_frame_is_reacked_even_when_damaged() {
        let mut r = Receiver::new(15);
        let mut frame = data(3, b"future");
        frame.checksum = !frame.checksum;

        // Sequence is checked before the checksum.
        assert_eq!(r.on_packet(&frame), ReceiveAction::Resync { ack: 0 });
    }

    #[test]
    fn non_data_frames_are_ignored() {
        let mut r = Receiver::new(15);
        for kind in [PacketType::Ack, PacketType::Nak, PacketType::Get] {
            assert_eq!(r.on_packet(&Packet::control(kind, 0)), ReceiveAction::Ignore);
        }
        assert_eq!(r.expected_sequence(), 0);
    }

    #[test]
    fn expected_sequence_wraps_modulo_thirty_two() {
        let mut r = Receiver::new(15);
        for i in 0..40_usize {
            let seq = (i % SEQ_SPACE as usize) as u8;
            assert_eq!(
                r.on_packet(&data(seq, b"x")),
                ReceiveAction::Deliver {
                    ack: ((i + 1) % SEQ_SPACE as usize) as u8
                }
            );
        }
        assert_eq!(r.expected_sequence(), 8);
        assert_eq!(r.bytes_delivered(), 40);
    }

    #[test]
    fn timeout_budget_exhausts_after_the_threshold() {
        let mut r = Receiver::new(3);
        assert!(!r.record_timeout());
        assert!(!r.record_timeout());
        assert!(!r.record_timeout());
        assert!(r.record_timeout(), "the fourth consecutive timeout aborts");
    }

    #[test]
    fn any_arrival_resets_the_timeout_counter() {
        let mut r = Receiver::new(2);
        assert!(!r.record_timeout());
        assert!(!r.record_timeout());

        // Even a stray control frame proves the peer is alive.
        assert_eq!(r.on_packet(&Packet::control(PacketType::Ack, 9)), ReceiveAction::Ignore);

        assert!(!r.record_timeout());
        assert!(!r.record_timeout());
        assert!(r.record_timeout());
    }
}
