//! WebSocket gateway
//!
//! This module contains the per-connection protocol engine that binds live
//! connections to persistent sessions. It is structured into submodules:
//!
//! - `protocol`: the outbound envelope format and inbound frame
//!   classification.
//! - `session`: the WebSocket connection lifecycle, from upgrade to
//!   binding release.
//! - `turn`: the persist-consolidate-persist pipeline for one chat turn.

pub mod protocol;
pub mod session;
pub mod turn;

pub use session::ws_handler;
