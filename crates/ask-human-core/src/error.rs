//! Error taxonomy for an `ask` invocation.
//!
//! A timeout is not in here: it is [`WaitOutcome::TimedOut`](crate::types::WaitOutcome),
//! an ordinary result.

use thiserror::Error;

use crate::config::ConfigError;
use crate::slack::SlackError;

/// Failures of the Socket Mode event stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The WebSocket could not be opened.
    #[error("failed to connect to Socket Mode: {0}")]
    Connect(String),

    /// Connected, but Slack never sent `hello`.
    #[error("Socket Mode connection never became ready: {0}")]
    NotReady(String),

    /// The connection dropped or Slack asked us to disconnect.
    #[error("Socket Mode connection lost: {0}")]
    Disconnected(String),

    /// The event channel closed without a reason (background task gone).
    #[error("Socket Mode event stream closed")]
    Closed,
}

/// Fatal errors for one `ask` invocation.
#[derive(Debug, Error)]
pub enum AskError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("failed to resolve {what}: {source}")]
    Resolution {
        what: String,
        #[source]
        source: SlackError,
    },

    #[error("failed to post {what}: {source}")]
    Publish {
        what: String,
        #[source]
        source: SlackError,
    },

    #[error("error waiting for reply: {0}")]
    StreamFailure(#[from] StreamError),
}

impl AskError {
    pub fn resolution(what: impl Into<String>, source: SlackError) -> Self {
        Self::Resolution {
            what: what.into(),
            source,
        }
    }

    pub fn publish(what: impl Into<String>, source: SlackError) -> Self {
        Self::Publish {
            what: what.into(),
            source,
        }
    }
}
