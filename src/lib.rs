//! `udp-ft` — reliable file transfer over UDP with a sliding window.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  TRN frames  ┌──────────┐
//!  │  Server  │─────────────▶│  Client  │
//!  └────┬─────┘              └─────┬────┘
//!       │      ACKs / NAKs         │
//!       │◀─────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │  WindowSender / Receiver          │
//!  │  (pure protocol state machines)   │
//!  └────┬──────────────────────────────┘
//!       │ encoded 512-byte frames
//!  ┌────▼──────┐    ┌───────────┐
//!  │  Socket   │◀───│  Gremlin  │  (loss / corruption / delay injector)
//!  └───────────┘    └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]    — wire format (encode / decode, checksum)
//! - [`sequence`]  — slicing a file into numbered frames
//! - [`sender`]    — outbound sliding-window state machine
//! - [`receiver`]  — inbound in-order delivery state machine
//! - [`gremlin`]   — fault injection on outbound data frames
//! - [`server`]    — session loop: accept a request, push the file
//! - [`client`]    — session loop: request a file, write it out
//! - [`state`]     — finite-state-machine types
//! - [`timer`]     — retransmit and liveness timers
//! - [`socket`]    — async UDP socket abstraction

pub mod client;
pub mod gremlin;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod sequence;
pub mod server;
pub mod socket;
pub mod state;
pub mod timer;
