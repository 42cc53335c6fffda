//! Go-Back-N send-side state machine.
//!
//! [`WindowSender`] drives one prepared [`TransferSequence`] towards the
//! client: it decides which frame goes on the wire next, keeps a
//! retransmission timer per in-flight frame, and owns the go-back-N policy
//! (timeout or NAK rewinds `current` to the oldest unacknowledged frame).
//!
//! # Protocol contract
//!
//! - At most [`WINDOW_SIZE`] frames may be unacknowledged at once.
//! - ACKs arrive one per frame and carry the receiver's **next expected**
//!   wire sequence; only the ACK matching `(window_base + 1) % 32` slides
//!   the window.  Anything else is ignored.
//! - A NAK rewinds `current` immediately, without waiting for the timer.
//! - When the oldest in-flight frame's timer expires the whole outstanding
//!   window is resent.  Consecutive expiries without a single matching ACK
//!   are counted; past `max_retries` the transfer is abandoned.
//!
//! # Index layout
//!
//! Window bookkeeping uses **unwrapped** frame indices, which only ever
//! grow; the 5-bit wire sequence is `index % 32` and lives inside the
//! already-encoded frames.
//!
//! ```text
//!  window_base        current      high_water
//!      │                 │              │
//!  ────┼─────────────────┼──────────────┼────────▶ frame index
//!      │ ◀─ resending ──▶│ ◀── sent ──▶ │ ◀─ never transmitted
//! ```
//!
//! `current` trails `high_water` only while the window is being resent.
//!
//! Every outgoing frame passes through the [`Gremlin`] exactly once, at the
//! moment the transmit decision is made.  A `Delayed` verdict parks the
//! (possibly corrupted) wire bytes in a side queue so the window never
//! stalls on one slow frame; flushing the queue bypasses the gremlin.  This
//! module performs no socket I/O — [`crate::server`] owns the actual loop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::gremlin::{Gremlin, Verdict};
use crate::packet::{HEADER_SIZE, PACKET_SIZE, SEQ_SPACE, WINDOW_SIZE};
use crate::sequence::TransferSequence;
use crate::timer::{TransferConfig, TransferTimer};

// ---------------------------------------------------------------------------
// SenderState
// ---------------------------------------------------------------------------

/// Where the sender is in its lifecycle.  Derived from the window counters,
/// so it can never disagree with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// There is room in the window and untransmitted frames remain.
    FillingWindow,
    /// The window is full (or the sequence exhausted); only an ACK, a NAK,
    /// or a timer can make progress now.
    WaitingAck,
    /// `current` was rewound and previously-sent frames are going out again.
    Retransmitting,
    /// Every frame, sentinel included, has been acknowledged.
    Done,
    /// The consecutive-timeout budget ran out; the transfer is abandoned.
    Aborted,
}

// ---------------------------------------------------------------------------
// Transmit
// ---------------------------------------------------------------------------

/// How a [`Transmit`] came to be, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitKind {
    /// First transmission of this frame.
    Fresh,
    /// Go-back-N or NAK resend of a frame sent before.
    Retransmit,
    /// A delayed frame whose hold deadline has passed.
    DelayedFlush,
}

/// One wire-ready send decision: put `wire` on the socket, now.
///
/// The bytes already reflect the gremlin's verdict; the caller must not
/// re-encode or re-inject them.
#[derive(Debug, Clone)]
pub struct Transmit {
    /// Unwrapped index of the frame within the transfer sequence.
    pub index: usize,
    pub kind: TransmitKind,
    /// The full 512-byte frame to hand to the socket.
    pub wire: [u8; PACKET_SIZE],
}

/// Outcome of a retransmission-timer check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// The oldest in-flight frame timed out; the window will be resent.
    WindowReset,
    /// Too many consecutive timeouts; the sender is now [`SenderState::Aborted`].
    Aborted,
}

/// A frame held back by a `Delayed` verdict, waiting for its deadline.
///
/// Deadlines are `decision instant + fixed delay`, so queue order is
/// deadline order and the front entry is always the next one due.
#[derive(Debug, Clone)]
struct DelayedFrame {
    index: usize,
    deadline: Instant,
    wire: [u8; PACKET_SIZE],
}

// ---------------------------------------------------------------------------
// WindowSender
// ---------------------------------------------------------------------------

/// Go-back-N send-side state for one transfer.
#[derive(Debug)]
pub struct WindowSender {
    sequence: TransferSequence,

    /// Index of the oldest unacknowledged frame (left window edge).
    pub window_base: usize,

    /// Index of the next frame to transmit.  Rewound to `window_base` by a
    /// timeout or NAK; otherwise trails at most [`WINDOW_SIZE`] behind it.
    pub current: usize,

    /// One past the newest frame ever transmitted.
    high_water: usize,

    /// `timers[k]` belongs to frame `window_base + k`; the front timer is
    /// the only one consulted for the go-back-N decision.
    timers: VecDeque<TransferTimer>,

    /// Frames parked by a `Delayed` verdict, front = earliest deadline.
    delayed: VecDeque<DelayedFrame>,

    /// Timer expiries since the last matching ACK.
    consecutive_timeouts: u32,

    aborted: bool,
    config: TransferConfig,
}

impl WindowSender {
    pub fn new(sequence: TransferSequence, config: TransferConfig) -> Self {
        WindowSender {
            sequence,
            window_base: 0,
            current: 0,
            high_water: 0,
            timers: VecDeque::with_capacity(WINDOW_SIZE),
            delayed: VecDeque::new(),
            consecutive_timeouts: 0,
            aborted: false,
            config,
        }
    }

    /// Total number of frames in the sequence, sentinel included.
    pub fn total_frames(&self) -> usize {
        self.sequence.frame_count()
    }

    /// Number of transmitted-but-unacknowledged frames.
    pub fn in_flight(&self) -> usize {
        self.high_water - self.window_base
    }

    pub fn state(&self) -> SenderState {
        if self.aborted {
            SenderState::Aborted
        } else if self.window_base == self.total_frames() {
            SenderState::Done
        } else if self.current < self.high_water {
            SenderState::Retransmitting
        } else if self.can_transmit() {
            SenderState::FillingWindow
        } else {
            SenderState::WaitingAck
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state(), SenderState::Done | SenderState::Aborted)
    }

    fn can_transmit(&self) -> bool {
        self.current < self.window_base + WINDOW_SIZE && self.current < self.total_frames()
    }

    fn delayed_due(&self) -> bool {
        self.delayed
            .front()
            .is_some_and(|d| d.deadline <= Instant::now())
    }

    /// Start (or restart, on a resend) the retransmission timer for `index`.
    fn arm_timer(&mut self, index: usize) {
        let slot = index - self.window_base;
        if slot == self.timers.len() {
            self.timers.push_back(TransferTimer::start());
        } else {
            self.timers[slot].restart();
        }
    }

    /// Produce the next frame to put on the wire, or `None` when the sender
    /// can only wait (window full, sequence exhausted, or nothing due).
    ///
    /// Fresh and resent frames roll the gremlin here; `Lost` frames consume
    /// their transmit slot and timer without ever being returned, which is
    /// exactly how loss manifests to the rest of the machine — as a timeout.
    /// Call repeatedly until `None` before sleeping.
    pub fn next_transmit(&mut self, gremlin: &mut Gremlin) -> Option<Transmit> {
        loop {
            if self.is_finished() {
                return None;
            }

            // Delayed frames due now take priority over new transmissions.
            if self.delayed_due() {
                let held = self.delayed.pop_front().expect("delayed_due checked front");
                return Some(Transmit {
                    index: held.index,
                    kind: TransmitKind::DelayedFlush,
                    wire: held.wire,
                });
            }

            if !self.can_transmit() {
                return None;
            }

            let index = self.current;
            let fresh = index == self.high_water;
            let frame = self
                .sequence
                .frame(index)
                .expect("current is bounded by the frame count");
            let payload_len = frame.length as usize;
            let mut wire = frame.encode();

            let verdict = gremlin.inject(&mut wire[HEADER_SIZE..HEADER_SIZE + payload_len]);

            self.arm_timer(index);
            self.current += 1;
            if fresh {
                self.high_water = self.current;
            }

            match verdict {
                Verdict::Fine => {
                    let kind = if fresh {
                        TransmitKind::Fresh
                    } else {
                        TransmitKind::Retransmit
                    };
                    return Some(Transmit { index, kind, wire });
                }
                Verdict::Lost => continue,
                Verdict::Delayed => {
                    self.delayed.push_back(DelayedFrame {
                        index,
                        deadline: Instant::now() + gremlin.delay(),
                        wire,
                    });
                    continue;
                }
            }
        }
    }

    /// Process an inbound ACK carrying the receiver's next expected wire
    /// sequence.  Returns `true` when the window slid.
    pub fn on_ack(&mut self, sequence: u8) -> bool {
        if self.timers.is_empty() || self.is_finished() {
            return false;
        }
        let expected = ((self.window_base + 1) % SEQ_SPACE as usize) as u8;
        if sequence != expected {
            return false;
        }

        self.window_base += 1;
        self.timers.pop_front();
        self.consecutive_timeouts = 0;
        // ACKs from an earlier flight can overtake a rewound `current`.
        if self.current < self.window_base {
            self.current = self.window_base;
        }
        true
    }

    /// Process an inbound NAK: rewind immediately instead of waiting for the
    /// retransmission timer, since the receiver already told us a frame
    /// arrived damaged.
    pub fn on_nak(&mut self) {
        if !self.is_finished() {
            self.current = self.window_base;
        }
    }

    /// Fire the go-back-N policy if the oldest in-flight timer has expired.
    ///
    /// Pending transmissions always win: while a frame can still be sent
    /// (or a delayed frame is due) this returns `None`, mirroring the
    /// send-before-timeout priority of the main loop.  Each resend re-arms
    /// its own timer, so one expiry produces exactly one reset.
    pub fn check_timeout(&mut self) -> Option<TimeoutEvent> {
        if self.is_finished() || self.delayed_due() || self.can_transmit() {
            return None;
        }
        let oldest = self.timers.front()?;
        if !oldest.timeout(self.config.retransmit_timeout) {
            return None;
        }

        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts > self.config.max_retries {
            self.aborted = true;
            return Some(TimeoutEvent::Aborted);
        }
        self.current = self.window_base;
        Some(TimeoutEvent::WindowReset)
    }

    /// How long the caller may sleep before this sender could act again:
    /// time until the oldest retransmission timer expires or the next
    /// delayed frame comes due, whichever is sooner.  `None` when nothing
    /// is pending (e.g. before the first transmit).
    pub fn wait_hint(&self) -> Option<Duration> {
        let timer = self
            .timers
            .front()
            .map(|t| t.remaining(self.config.retransmit_timeout));
        let held = self
            .delayed
            .front()
            .map(|d| d.deadline.saturating_duration_since(Instant::now()));
        match (timer, held) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
