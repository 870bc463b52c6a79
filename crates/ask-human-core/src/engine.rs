//! Reply-wait engine — race the event stream against a deadline and return
//! the first message that belongs to our thread.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::StreamError;
use crate::types::{Envelope, InboundEvent, MessageEvent, Reply, Thread, WaitOutcome};

/// Message subtypes that never count as a human reply.
pub const DEFAULT_EXCLUDED_SUBTYPES: &[&str] = &[
    "bot_message",
    "message_changed",
    "message_deleted",
    "channel_join",
    "channel_leave",
];

/// Longest wait a deadline is allowed to express. Larger budgets are clamped.
pub const MAX_WAIT: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline `budget` from now, clamped to [`MAX_WAIT`] so huge timeouts
/// cannot overflow the clock.
pub fn deadline_after(budget: Duration) -> Instant {
    Instant::now() + budget.min(MAX_WAIT)
}

/// A live, ordered feed of Socket Mode deliveries.
#[async_trait]
pub trait EventSource: Send {
    /// Next delivery in arrival order. `Ok(None)` means the stream ended.
    ///
    /// Must be cancel-safe: the engine drops this future when the deadline
    /// wins the race, and no delivery may be lost when that happens.
    async fn next_event(&mut self) -> Result<Option<Envelope>, StreamError>;

    /// Acknowledge a delivery so Slack does not redeliver it.
    async fn ack(&mut self, envelope_id: &str) -> Result<(), StreamError>;
}

// ── Correlation filter ──

#[derive(Debug, Clone)]
pub struct ReplyFilter {
    excluded_subtypes: HashSet<String>,
    /// Also reject anything posted through an app (`bot_id` set).
    exclude_app_posts: bool,
}

impl Default for ReplyFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_SUBTYPES.iter().copied())
    }
}

impl ReplyFilter {
    pub fn new<I, S>(excluded_subtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded_subtypes: excluded_subtypes.into_iter().map(Into::into).collect(),
            exclude_app_posts: false,
        }
    }

    /// Ignore posts made by other apps and integrations, not just `bot_message`s.
    pub fn excluding_app_posts(mut self) -> Self {
        self.exclude_app_posts = true;
        self
    }

    pub fn excludes_subtype(&self, subtype: &str) -> bool {
        self.excluded_subtypes.contains(subtype)
    }

    /// Does `msg` reply to `thread` from someone other than `self_user_id`?
    pub fn matches(&self, thread: &Thread, self_user_id: &str, msg: &MessageEvent) -> bool {
        if msg.channel != thread.channel_id {
            return false;
        }
        // A top-level post has no thread_ts and must never match.
        if msg.thread_ts.is_empty() || msg.thread_ts != thread.thread_ts {
            return false;
        }
        if msg.user.is_empty() || msg.user == self_user_id {
            return false;
        }
        if self.exclude_app_posts && msg.bot_id.is_some() {
            return false;
        }
        match msg.subtype.as_deref() {
            Some(subtype) => !self.excludes_subtype(subtype),
            None => true,
        }
    }
}

// ── Wait loop ──

/// One pending question: which thread, who we are, what counts as a reply.
#[derive(Debug, Clone)]
pub struct ReplyWait<'a> {
    thread: &'a Thread,
    self_user_id: &'a str,
    filter: &'a ReplyFilter,
}

impl<'a> ReplyWait<'a> {
    pub fn new(thread: &'a Thread, self_user_id: &'a str, filter: &'a ReplyFilter) -> Self {
        Self {
            thread,
            self_user_id,
            filter,
        }
    }

    /// Block until a qualifying reply arrives or `deadline` passes.
    ///
    /// Every delivery taken off the stream is acknowledged, matched or not.
    /// A stream that ends before either condition is an error, never a timeout.
    pub async fn wait<S>(&self, deadline: Instant, source: &mut S) -> Result<WaitOutcome, StreamError>
    where
        S: EventSource + ?Sized,
    {
        if Instant::now() >= deadline {
            info!("Deadline already passed, not waiting");
            return Ok(WaitOutcome::TimedOut);
        }

        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            let envelope = tokio::select! {
                biased;
                _ = &mut expiry => {
                    info!(thread_ts = %self.thread.thread_ts, "No reply before deadline");
                    return Ok(WaitOutcome::TimedOut);
                }
                next = source.next_event() => match next? {
                    Some(envelope) => envelope,
                    None => return Err(StreamError::Closed),
                },
            };

            let reply = self.evaluate(&envelope.event);

            if let Some(id) = envelope.envelope_id.as_deref() {
                source.ack(id).await?;
            }

            if let Some(reply) = reply {
                info!(user = %reply.user, ts = %reply.ts, "Reply received");
                return Ok(WaitOutcome::Reply(reply));
            }
        }
    }

    fn evaluate(&self, event: &InboundEvent) -> Option<Reply> {
        match event {
            InboundEvent::Message(msg) if self.filter.matches(self.thread, self.self_user_id, msg) => {
                Some(Reply::from(msg))
            }
            InboundEvent::Message(msg) => {
                debug!(
                    channel = %msg.channel,
                    thread_ts = %msg.thread_ts,
                    user = %msg.user,
                    subtype = ?msg.subtype,
                    "Ignoring unrelated message"
                );
                None
            }
            InboundEvent::Other { kind } => {
                debug!(kind = %kind, "Ignoring non-message event");
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::{message, ScriptedSource};
    use super::*;

    const THREAD_TS: &str = "1000.0001";

    fn thread() -> Thread {
        Thread::new("C1", THREAD_TS)
    }

    fn in_secs(secs: u64) -> Instant {
        Instant::now() + Duration::from_secs(secs)
    }

    fn noise() -> Vec<Envelope> {
        vec![
            message("a", "C2", THREAD_TS, "U1", "wrong channel"),
            message("b", "C1", "", "U2", "top level"),
            message("c", "C1", THREAD_TS, "BOT", "our own post"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_match_after_noise() {
        let mut events = noise();
        events.push(message("d", "C1", THREAD_TS, "U3", "hello"));
        let mut source = ScriptedSource::quiet_after(events);

        let filter = ReplyFilter::default();
        let thread = thread();
        let outcome = ReplyWait::new(&thread, "BOT", &filter)
            .wait(in_secs(60), &mut source)
            .await
            .unwrap();

        let reply = outcome.reply().expect("expected a reply");
        assert_eq!(reply.user, "U3");
        assert_eq!(reply.text, "hello");
        assert_eq!(reply.ts, "2000.d");
        assert_eq!(source.acked, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_noise_then_silence_times_out() {
        let mut source = ScriptedSource::quiet_after(noise());
        let filter = ReplyFilter::default();
        let thread = thread();

        let start = Instant::now();
        let outcome = ReplyWait::new(&thread, "BOT", &filter)
            .wait(in_secs(30), &mut source)
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
        assert_eq!(source.acked.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_match_wins() {
        let mut source = ScriptedSource::quiet_after(vec![
            message("e1", "C1", THREAD_TS, "U1", "first"),
            message("e2", "C1", THREAD_TS, "U2", "second"),
        ]);
        let filter = ReplyFilter::default();
        let thread = thread();

        let outcome = ReplyWait::new(&thread, "BOT", &filter)
            .wait(in_secs(60), &mut source)
            .await
            .unwrap();

        assert_eq!(outcome.reply().unwrap().text, "first");
        assert_eq!(source.consumed, 1);
        assert_eq!(source.pending.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_consumes_nothing() {
        let mut source =
            ScriptedSource::quiet_after(vec![message("x", "C1", THREAD_TS, "U1", "late")]);
        let filter = ReplyFilter::default();
        let thread = thread();

        let outcome = ReplyWait::new(&thread, "BOT", &filter)
            .wait(Instant::now(), &mut source)
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(source.consumed, 0);
        assert!(source.acked.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_thread_in_same_channel_is_ignored() {
        let mut source = ScriptedSource::quiet_after(vec![
            message("o", "C1", "999.0001", "U1", "other thread"),
            message("m", "C1", THREAD_TS, "U1", "ours"),
        ]);
        let filter = ReplyFilter::default();
        let thread = thread();

        let outcome = ReplyWait::new(&thread, "BOT", &filter)
            .wait(in_secs(60), &mut source)
            .await
            .unwrap();

        assert_eq!(outcome.reply().unwrap().text, "ours");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_is_not_a_timeout() {
        let mut source = ScriptedSource::closing_after(noise());
        let filter = ReplyFilter::default();
        let thread = thread();

        let result = ReplyWait::new(&thread, "BOT", &filter)
            .wait(in_secs(60), &mut source)
            .await;

        assert!(matches!(result, Err(StreamError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_failure_propagates() {
        let mut source = ScriptedSource::quiet_after(Vec::new());
        source
            .pending
            .push_back(Err(StreamError::Disconnected("link_disabled".into())));
        let filter = ReplyFilter::default();
        let thread = thread();

        let result = ReplyWait::new(&thread, "BOT", &filter)
            .wait(in_secs(60), &mut source)
            .await;

        assert!(matches!(result, Err(StreamError::Disconnected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_message_events_are_acked_and_skipped() {
        let mut source = ScriptedSource::quiet_after(vec![
            Envelope {
                envelope_id: Some("r".into()),
                event: InboundEvent::Other {
                    kind: "events_api:reaction_added".into(),
                },
            },
            Envelope {
                envelope_id: None,
                event: InboundEvent::Other {
                    kind: "events_api".into(),
                },
            },
            message("m", "C1", THREAD_TS, "U1", "ok"),
        ]);
        let filter = ReplyFilter::default();
        let thread = thread();

        let outcome = ReplyWait::new(&thread, "BOT", &filter)
            .wait(in_secs(60), &mut source)
            .await
            .unwrap();

        assert!(outcome.reply().is_some());
        assert_eq!(source.acked, vec!["r", "m"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_clamps_huge_budgets() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_secs(30)), now + Duration::from_secs(30));
        assert_eq!(deadline_after(Duration::MAX), now + MAX_WAIT);
        assert_eq!(deadline_after(Duration::from_secs(u64::MAX)), now + MAX_WAIT);
    }

    #[test]
    fn test_filter_self_exclusion() {
        let filter = ReplyFilter::default();
        let thread = thread();
        let msg = MessageEvent {
            channel: "C1".into(),
            user: "BOT".into(),
            thread_ts: THREAD_TS.into(),
            ..Default::default()
        };
        assert!(!filter.matches(&thread, "BOT", &msg));
    }

    #[test]
    fn test_filter_excluded_subtypes() {
        let filter = ReplyFilter::default();
        let thread = thread();
        let mut msg = MessageEvent {
            channel: "C1".into(),
            user: "U1".into(),
            thread_ts: THREAD_TS.into(),
            subtype: Some("bot_message".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&thread, "BOT", &msg));

        msg.subtype = Some("thread_broadcast".into());
        assert!(filter.matches(&thread, "BOT", &msg));
    }

    #[test]
    fn test_filter_custom_exclusion_set() {
        let filter = ReplyFilter::new(["thread_broadcast"]);
        let thread = thread();
        let mut msg = MessageEvent {
            channel: "C1".into(),
            user: "U1".into(),
            thread_ts: THREAD_TS.into(),
            subtype: Some("thread_broadcast".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&thread, "BOT", &msg));

        msg.subtype = Some("bot_message".into());
        assert!(filter.matches(&thread, "BOT", &msg));
    }

    #[test]
    fn test_filter_app_posts_opt_in() {
        let thread = thread();
        let msg = MessageEvent {
            channel: "C1".into(),
            user: "U9".into(),
            thread_ts: THREAD_TS.into(),
            bot_id: Some("B9".into()),
            ..Default::default()
        };
        assert!(ReplyFilter::default().matches(&thread, "BOT", &msg));
        assert!(!ReplyFilter::default()
            .excluding_app_posts()
            .matches(&thread, "BOT", &msg));
    }

    #[test]
    fn test_filter_requires_author() {
        let filter = ReplyFilter::default();
        let thread = thread();
        let msg = MessageEvent {
            channel: "C1".into(),
            thread_ts: THREAD_TS.into(),
            ..Default::default()
        };
        assert!(!filter.matches(&thread, "BOT", &msg));
    }
}
