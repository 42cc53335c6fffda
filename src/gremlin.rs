//! Probabilistic fault injection for outgoing data packets.
//!
//! A transfer over loopback never exercises the retransmission machinery,
//! so the server routes every data packet it is about to send through the
//! gremlin first.  The gremlin rolls three independent percentages and
//! decides whether the packet goes out untouched, gets some of its payload
//! bytes flipped, is silently dropped, or is held back and sent late.
//!
//! Corruption happens in place on the encoded frame's payload region, after
//! the checksum was computed, which is exactly what makes the receiver's
//! verification trip.  Loss and delay are reported back to the caller as a
//! [`Verdict`] so the send loop can skip or queue the frame; the gremlin
//! itself never touches the socket.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the fault injector.
///
/// The chance fields are percentages; anything above 100 behaves as 100.
/// All chances default to zero, which turns the gremlin into a pass-through.
#[derive(Debug, Clone)]
pub struct GremlinConfig {
    /// Percent chance that a packet's payload is corrupted in place.
    pub corrupt_chance: u8,
    /// Percent chance that a packet is dropped without a trace.
    pub loss_chance: u8,
    /// Percent chance that a packet is held back instead of sent now.
    pub delay_chance: u8,
    /// How long a delayed packet is held before it is finally sent.
    pub delay: Duration,
    /// Fixed RNG seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GremlinConfig {
    fn default() -> Self {
        GremlinConfig {
            corrupt_chance: 0,
            loss_chance: 0,
            delay_chance: 0,
            delay: Duration::from_millis(50),
            seed: None,
        }
    }
}

impl GremlinConfig {
    fn clamped(mut self) -> Self {
        self.corrupt_chance = self.corrupt_chance.min(100);
        self.loss_chance = self.loss_chance.min(100);
        self.delay_chance = self.delay_chance.min(100);
        self
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// What the send loop should do with a packet after the gremlin saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Send the packet now.  Its payload may have been corrupted in place.
    Fine,
    /// Do not send the packet at all.
    Lost,
    /// Hold the packet and send it after [`GremlinConfig::delay`].
    Delayed,
}

// ---------------------------------------------------------------------------
// Gremlin
// ---------------------------------------------------------------------------

/// The fault injector itself.  One instance lives for the whole server
/// process so the RNG stream is continuous across transfers.
pub struct Gremlin {
    config: GremlinConfig,
    rng: StdRng,
}

impl Gremlin {
    pub fn new(config: GremlinConfig) -> Self {
        let config = config.clamped();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Gremlin { config, rng }
    }

    /// Hold time for packets that came back [`Verdict::Delayed`].
    pub fn delay(&self) -> Duration {
        self.config.delay
    }

    /// Roll the dice for one outgoing packet.
    ///
    /// `payload` is the payload region of the already-encoded frame, so a
    /// corruption verdict mutates the bytes that will actually hit the wire.
    /// Loss wins over everything else; corruption and delay compose, so a
    /// packet can be both mangled and late.
    pub fn inject(&mut self, payload: &mut [u8]) -> Verdict {
        let loss_roll: u8 = self.rng.random_range(0..100);
        let corrupt_roll: u8 = self.rng.random_range(0..100);
        let delay_roll: u8 = self.rng.random_range(0..100);

        if loss_roll < self.config.loss_chance {
            log::debug!("[gremlin] packet lost");
            return Verdict::Lost;
        }

        if corrupt_roll < self.config.corrupt_chance {
            self.corrupt(payload);
        }

        if delay_roll < self.config.delay_chance {
            log::debug!("[gremlin] packet delayed by {:?}", self.config.delay);
            return Verdict::Delayed;
        }

        Verdict::Fine
    }

    /// Flip one to three payload bytes at distinct offsets.
    ///
    /// Severity is weighted towards light damage: roughly 70% of corruptions
    /// touch a single byte, 20% touch two, 10% touch three.  Each hit byte is
    /// bitwise complemented, which is guaranteed to change it.
    fn corrupt(&mut self, payload: &mut [u8]) {
        if payload.is_empty() {
            // Nothing to damage in a zero-length frame.
            return;
        }

        let severity: u8 = self.rng.random_range(0..100);
        let flips = if severity < 70 {
            1
        } else if severity < 90 {
            2
        } else {
            3
        };
        let flips = flips.min(payload.len());

        let mut hit: Vec<usize> = Vec::with_capacity(flips);
        while hit.len() < flips {
            let offset = self.rng.random_range(0..payload.len());
            if !hit.contains(&offset) {
                payload[offset] = !payload[offset];
                hit.push(offset);
            }
        }

        log::debug!("[gremlin] corrupted {} byte(s) at {:?}", hit.len(), hit);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
