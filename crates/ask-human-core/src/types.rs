//! Core types — threads, inbound events, replies, wait outcomes.

use chrono::{DateTime, Utc};

// ── Thread ──

/// A conversation rooted at one message: `(channel id, root message ts)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub channel_id: String,
    pub thread_ts: String,
}

impl Thread {
    pub fn new(channel_id: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_ts: thread_ts.into(),
        }
    }
}

// ── Inbound events ──

/// A `message` event from the Events API. Empty strings stand for absent fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub ts: String,
    /// Root of the thread this message belongs to; empty for top-level posts.
    pub thread_ts: String,
    pub subtype: Option<String>,
    pub bot_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(MessageEvent),
    /// Any other envelope (reactions, slash commands, interactivity...).
    Other { kind: String },
}

/// One Socket Mode delivery. `envelope_id` is what gets acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub envelope_id: Option<String>,
    pub event: InboundEvent,
}

// ── Reply / outcome ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub user: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: String,
}

impl From<&MessageEvent> for Reply {
    fn from(msg: &MessageEvent) -> Self {
        Self {
            user: msg.user.clone(),
            text: msg.text.clone(),
            ts: msg.ts.clone(),
            thread_ts: msg.thread_ts.clone(),
        }
    }
}

impl Reply {
    /// When the reply was posted, from its Slack `ts`.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        parse_slack_ts(&self.ts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Reply(Reply),
    TimedOut,
}

impl WaitOutcome {
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            WaitOutcome::Reply(r) => Some(r),
            WaitOutcome::TimedOut => None,
        }
    }
}

/// Slack timestamps look like `"1700000000.000100"`: unix seconds, a dot, a
/// per-channel sequence. Only the seconds carry wall-clock meaning.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, seq) = ts.split_once('.')?;
    if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slack_ts() {
        let t = parse_slack_ts("1700000000.000100").unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_slack_ts_rejects_garbage() {
        assert!(parse_slack_ts("").is_none());
        assert!(parse_slack_ts("1700000000").is_none());
        assert!(parse_slack_ts("abc.123").is_none());
        assert!(parse_slack_ts("1700000000.").is_none());
        assert!(parse_slack_ts("1.2.3").is_none());
    }

    #[test]
    fn test_reply_projection_keeps_fields() {
        let msg = MessageEvent {
            channel: "C1".into(),
            user: "U3".into(),
            text: "hello".into(),
            ts: "1000.0002".into(),
            thread_ts: "1000.0001".into(),
            subtype: None,
            bot_id: None,
        };
        let reply = Reply::from(&msg);
        assert_eq!(reply.user, "U3");
        assert_eq!(reply.text, "hello");
        assert_eq!(reply.ts, "1000.0002");
        assert_eq!(reply.thread_ts, "1000.0001");
    }
}
