//! Socket Mode wire frames — parse text frames into hello, disconnect, or
//! an acknowledgeable envelope.
//!
//! Slack wraps every delivery as
//! `{"type": "events_api", "envelope_id": "...", "payload": {"event": {...}}}`.
//! Control frames (`hello`, `disconnect`) carry no envelope id.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{Envelope, InboundEvent, MessageEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First frame on a fresh connection; the socket is ready for events.
    Hello,
    /// Slack is about to close this connection.
    Disconnect { reason: String },
    Envelope(Envelope),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEvent {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    ts: String,
    #[serde(default)]
    thread_ts: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let frame = match raw.kind.as_str() {
            "hello" => Frame::Hello,
            "disconnect" => Frame::Disconnect {
                reason: raw.reason.unwrap_or_else(|| "unspecified".to_string()),
            },
            "events_api" => Frame::Envelope(Envelope {
                envelope_id: raw.envelope_id,
                event: events_api_event(raw.payload)?,
            }),
            other => Frame::Envelope(Envelope {
                envelope_id: raw.envelope_id,
                event: InboundEvent::Other {
                    kind: other.to_string(),
                },
            }),
        };
        Ok(frame)
    }
}

/// Best-effort envelope id from a frame `parse` rejected, so it can still be acked.
pub fn salvage_envelope_id(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .get("envelope_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn events_api_event(payload: Option<Value>) -> Result<InboundEvent, serde_json::Error> {
    let inner = payload
        .and_then(|mut p| p.get_mut("event").map(Value::take))
        .unwrap_or(Value::Null);
    if inner.is_null() {
        return Ok(InboundEvent::Other {
            kind: "events_api".to_string(),
        });
    }

    // Only messages are decoded; other events may carry objects in
    // `channel` or `user` (channel_created, user_change, ...).
    let kind = inner.get("type").and_then(Value::as_str).unwrap_or_default();
    if kind != "message" {
        return Ok(InboundEvent::Other {
            kind: format!("events_api:{}", kind),
        });
    }

    let ev: RawEvent = serde_json::from_value(inner)?;

    Ok(InboundEvent::Message(MessageEvent {
        channel: ev.channel,
        user: ev.user,
        text: ev.text,
        ts: ev.ts,
        thread_ts: ev.thread_ts,
        subtype: ev.subtype,
        bot_id: ev.bot_id,
    }))
}
