//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared
//! resources: the session store, the connection registry, and the turn
//! consolidator. One instance is created at startup and passed to all
//! handlers; nothing here is ambient or global.

use crate::config::Config;
use crate::db::Db;
use crate::registry::ConnectionRegistry;
use avatar_core::EventConsolidator;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers.
pub struct AppState {
    pub db: Arc<Db>,
    pub registry: ConnectionRegistry,
    pub consolidator: EventConsolidator,
    pub config: Arc<Config>,
}
