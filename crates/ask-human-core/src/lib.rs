//! ask-human-core — post a question to Slack and wait for a human reply.
//!
//! The crate is split the same way the tool runs: `config` resolves who and
//! where, `slack` talks to the Web API, `socket` holds the live Socket Mode
//! connection, `engine` picks the one reply that belongs to our thread, and
//! `session` strings them together for a single `ask` invocation.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod frames;
pub mod session;
pub mod slack;
pub mod socket;
pub mod types;

pub use error::{AskError, StreamError};
pub use types::{Reply, Thread, WaitOutcome};
