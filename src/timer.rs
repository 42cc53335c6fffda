//! Elapsed-time measurement and protocol timeout tunables.
//!
//! Reliable delivery requires that unacknowledged frames are re-sent if no
//! ACK arrives within a bounded time, and that neither side waits on a dead
//! peer forever.  This module provides:
//! - [`TransferTimer`] — a one-shot monotonic timer with an elapsed-time
//!   predicate.  The sender keeps one per in-flight frame; the server keeps
//!   one for the closing handshake.
//! - [`TransferConfig`] — every timeout threshold and retry budget in one
//!   place, with protocol defaults.
//!
//! There is no exponential back-off here: the protocol retransmits the whole
//! outstanding window on a fixed per-packet timeout (go-back-N) and gives up
//! after a fixed number of consecutive timeouts.

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// TransferConfig
// ---------------------------------------------------------------------------

/// Adjustable timeout thresholds and retry budgets.
///
/// Shared by both roles; each field is read by exactly one loop.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// How long a sent frame may remain unacknowledged before the sender
    /// retransmits the outstanding window (per-packet timer threshold).
    pub retransmit_timeout: Duration,
    /// Consecutive window timeouts tolerated before the sender aborts.
    pub max_retries: u32,
    /// Upper bound on one receive poll; elapsing is not an error, it drives
    /// the retry path.
    pub receive_timeout: Duration,
    /// Consecutive receive timeouts tolerated before the receiver declares
    /// the peer dead and aborts.
    pub dead_threshold: u32,
    /// How long the server waits for the client's closing echo before
    /// returning to idle regardless.
    pub closing_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout: Duration::from_millis(100),
            max_retries: 6,
            receive_timeout: Duration::from_millis(250),
            dead_threshold: 15,
            closing_timeout: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// TransferTimer
// ---------------------------------------------------------------------------

/// A one-shot timer over the monotonic clock.
///
/// Records its start instant on construction (or [`restart`]); the
/// [`timeout`] predicate reports whether more than `threshold` has elapsed
/// since then.
///
/// [`restart`]: TransferTimer::restart
/// [`timeout`]: TransferTimer::timeout
#[derive(Debug, Clone, Copy)]
pub struct TransferTimer {
    started: Instant,
}

impl TransferTimer {
    /// Start a new timer at the current instant.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Reset the start instant to now.
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// Time elapsed since the timer was (re)started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `true` once more than `threshold` has elapsed.
    pub fn timeout(&self, threshold: Duration) -> bool {
        self.elapsed() > threshold
    }

    /// Time left until [`timeout`] would turn true, saturating at zero.
    ///
    /// Lets a poll loop sleep exactly as long as it is allowed to.
    ///
    /// [`timeout`]: TransferTimer::timeout
    pub fn remaining(&self, threshold: Duration) -> Duration {
        threshold.saturating_sub(self.elapsed())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
