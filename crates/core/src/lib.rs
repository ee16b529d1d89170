//! Avatar Core
//!
//! Transport-free agent plumbing for the conversational gateway: the
//! `AgentRunner` abstraction over an external, streaming LLM agent, and the
//! `EventConsolidator` that reduces one turn's event stream into a single
//! deterministic reply.

pub mod consolidate;
pub mod runner;

pub use consolidate::{ConsolidatedReply, EventConsolidator};
pub use runner::{AgentRunner, TurnEvent, TurnStream};
