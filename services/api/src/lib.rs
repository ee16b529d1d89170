//! Avatar API Library Crate
//!
//! This library contains all the core logic for the conversational session
//! gateway: the application state, the persistent session store, the REST
//! management surface, the WebSocket gateway, and routing. The `api` binary
//! is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
