//! Session finite-state machine (FSM) types.
//!
//! This module defines the per-role session states; transitions live in
//! [`crate::server`] and [`crate::client`] respectively.  Keeping the state
//! types in their own module makes it easy to add guard logic or tracing
//! without touching session plumbing.

/// States of the server's request loop.
///
/// ```text
/// Idle ──valid GET──▶ TransferInProgress ──done / aborted──▶ Idle
/// ```
///
/// While a transfer is in progress no new request is accepted; stray GETs
/// are logged and dropped by the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for a transfer request; initial state.
    Idle,
    /// A transfer sequence is being pushed to one client.
    TransferInProgress,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// States of the client's receive loop.
///
/// ```text
/// AwaitingPacket ──sentinel accepted──▶ Closing ──success marker sent──▶ exit
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Receiving data frames; initial state.
    AwaitingPacket,
    /// Sentinel accepted; exchanging the closing success marker.
    Closing,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::AwaitingPacket
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
