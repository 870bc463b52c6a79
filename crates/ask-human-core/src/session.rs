//! Session orchestration — resolve, post, wait, report. One question per run.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{ConfigError, Settings};
use crate::engine::{deadline_after, EventSource, ReplyFilter, ReplyWait};
use crate::error::AskError;
use crate::events::SessionEvent;
use crate::slack::{ChatApi, SlackClient};
use crate::socket::{SocketModeStream, READY_TIMEOUT};
use crate::types::{Thread, WaitOutcome};

pub const TIMEOUT_STATUS: &str = "⏱️ Timed out waiting for response.";

/// One `ask` as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub question: String,
    /// Root message for a new thread. Required unless `thread_ts` is set.
    pub title: Option<String>,
    /// `@username` or `@displayname` to notify.
    pub mention: Option<String>,
    /// Continue an existing thread instead of starting one.
    pub thread_ts: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AskRequest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.question.trim().is_empty() {
            return Err(ConfigError::InvalidRequest(
                "--question must not be empty".to_string(),
            ));
        }
        if present(&self.thread_ts).is_none() && present(&self.title).is_none() {
            return Err(ConfigError::InvalidRequest(
                "--title is required when --thread-ts is not specified".to_string(),
            ));
        }
        if let Some(mention) = present(&self.mention) {
            if self.mention_handle().is_none() {
                return Err(ConfigError::InvalidRequest(format!(
                    "mention must start with @ (e.g., @hogelog), got '{}'",
                    mention
                )));
            }
        }
        Ok(())
    }

    fn mention_handle(&self) -> Option<&str> {
        present(&self.mention)?
            .strip_prefix('@')
            .filter(|handle| !handle.is_empty())
    }
}

/// What happened, for the frontend to print.
#[derive(Debug, Clone)]
pub struct AskReport {
    pub channel_id: String,
    pub thread_ts: String,
    /// ts of the `📝` title message, when this run started the thread.
    pub title_ts: Option<String>,
    pub outcome: WaitOutcome,
    /// `@name` of the reply author, or their raw id when lookup failed.
    pub author_label: Option<String>,
    /// Set when the final status message could not be posted.
    pub status_error: Option<String>,
}

pub struct Session<A> {
    api: A,
    channel: String,
    timeout: Duration,
    filter: ReplyFilter,
    event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl<A: ChatApi> Session<A> {
    pub fn new(api: A, channel: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api,
            channel: channel.into(),
            timeout,
            filter: ReplyFilter::default(),
            event_tx: None,
        }
    }

    pub fn with_filter(mut self, filter: ReplyFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Progress events go to `tx`; the channel closes when the session is dropped.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    async fn post(
        &self,
        what: &str,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, AskError> {
        self.api
            .post_message(channel_id, text, thread_ts)
            .await
            .map_err(|e| AskError::publish(what, e))
    }

    /// Run one question against an already-connected event source.
    pub async fn ask<S>(&self, request: &AskRequest, source: &mut S) -> Result<AskReport, AskError>
    where
        S: EventSource + ?Sized,
    {
        request.validate()?;

        let self_user_id = self
            .api
            .self_user_id()
            .await
            .map_err(|e| AskError::resolution("bot user id", e))?;

        let channel_id = self
            .api
            .resolve_channel(&self.channel)
            .await
            .map_err(|e| AskError::resolution(format!("channel {}", self.channel), e))?;

        let mention_id = match request.mention_handle() {
            Some(handle) => Some(
                self.api
                    .resolve_user(handle)
                    .await
                    .map_err(|e| AskError::resolution(format!("user @{}", handle), e))?,
            ),
            None => None,
        };

        let (thread_ts, title_ts) = match present(&request.thread_ts) {
            Some(ts) => (ts.to_string(), None),
            None => {
                let title = present(&request.title).unwrap_or_default();
                let ts = self
                    .post("title message", &channel_id, &format!("📝 {}", title), None)
                    .await?;
                info!(ts = %ts, "Started thread");
                self.emit(SessionEvent::ThreadStarted { ts: ts.clone() });
                (ts.clone(), Some(ts))
            }
        };

        let question = match &mention_id {
            Some(id) => format!("<@{}> {}", id, request.question),
            None => request.question.clone(),
        };
        let question_ts = self
            .post("instruction message", &channel_id, &question, Some(thread_ts.as_str()))
            .await?;
        self.emit(SessionEvent::QuestionPosted { ts: question_ts });

        let thread = Thread::new(channel_id.clone(), thread_ts.clone());
        self.emit(SessionEvent::Waiting {
            timeout_secs: self.timeout.as_secs(),
        });
        // The budget starts now, after resolution and posting.
        let deadline = deadline_after(self.timeout);
        let outcome = ReplyWait::new(&thread, &self_user_id, &self.filter)
            .wait(deadline, source)
            .await?;

        let (status, author_label) = match &outcome {
            WaitOutcome::Reply(reply) => {
                let label = match self.api.user_label(&reply.user).await {
                    Ok(label) => label,
                    Err(e) => {
                        warn!("User lookup for {} failed: {}", reply.user, e);
                        reply.user.clone()
                    }
                };
                (format!("✅ Response received from {}", label), Some(label))
            }
            WaitOutcome::TimedOut => (TIMEOUT_STATUS.to_string(), None),
        };

        // The outcome is already in hand; a failed status post only warrants a warning.
        let status_error = match self
            .api
            .post_message(&channel_id, &status, Some(thread_ts.as_str()))
            .await
        {
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to post response status: {}", e);
                Some(e.to_string())
            }
        };

        Ok(AskReport {
            channel_id,
            thread_ts,
            title_ts,
            outcome,
            author_label,
            status_error,
        })
    }
}

/// Connect to Slack for real and run one question. The Socket Mode stream is
/// always shut down before returning.
pub async fn run_ask(
    settings: &Settings,
    request: &AskRequest,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
) -> Result<AskReport, AskError> {
    request.validate()?;

    let client = SlackClient::new(settings.bot_token.clone())
        .map_err(|e| AskError::resolution("Slack client", e))?;
    let url = client
        .open_socket_url(&settings.app_token)
        .await
        .map_err(|e| crate::error::StreamError::Connect(e.to_string()))?;
    let mut stream = SocketModeStream::connect(&url, READY_TIMEOUT).await?;

    let mut session = Session::new(client, settings.channel.clone(), settings.timeout);
    if let Some(tx) = events {
        session = session.with_events(tx);
    }

    let result = session.ask(request, &mut stream).await;
    stream.shutdown().await;
    result
}
