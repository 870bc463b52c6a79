//! `ask` command — resolve settings, run the session, print the outcome.

use anyhow::Result;
use clap::Args;
use tokio::sync::mpsc;
use tracing::debug;

use ask_human_core::config::{default_config_path, Config, Overrides, Settings};
use ask_human_core::events::SessionEvent;
use ask_human_core::session::{run_ask, AskReport, AskRequest};
use ask_human_core::WaitOutcome;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Question content
    #[arg(long)]
    pub question: String,

    /// Title for current session (required when --thread-ts is not specified)
    #[arg(long, required_unless_present = "thread_ts")]
    pub title: Option<String>,

    /// User to notify - @username or @displayname (e.g., @hogelog)
    #[arg(long)]
    pub mention: Option<String>,

    /// Channel to post to
    #[arg(long)]
    pub channel: Option<String>,

    /// Thread timestamp for replies
    #[arg(long)]
    pub thread_ts: Option<String>,

    /// Timeout in seconds (0 means use default from config)
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn run(args: AskArgs) -> Result<()> {
    let request = AskRequest {
        question: args.question,
        title: args.title,
        mention: args.mention,
        thread_ts: args.thread_ts,
    };
    request.validate()?;

    let config = Config::load(&default_config_path()?)?;
    let settings = Settings::resolve(
        &config,
        &Overrides {
            channel: args.channel,
            timeout_secs: args.timeout,
        },
    )?;
    debug!(?settings, "Resolved settings");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = render_event(&event) {
                println!("{}", line);
            }
        }
    });

    let result = run_ask(&settings, &request, Some(tx)).await;
    // The sender is gone with the session; let the printer drain first.
    let _ = printer.await;

    print!("{}", render_report(&result?));
    Ok(())
}

fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::ThreadStarted { ts } => {
            Some(format!("Message posted successfully. Timestamp: {}", ts))
        }
        SessionEvent::QuestionPosted { .. } => None,
        SessionEvent::Waiting { timeout_secs } => Some(format!(
            "Waiting for reply (timeout: {} seconds)...",
            timeout_secs
        )),
    }
}

fn render_report(report: &AskReport) -> String {
    let mut out = String::new();
    match &report.outcome {
        WaitOutcome::TimedOut => out.push_str("Timeout: No reply received.\n"),
        WaitOutcome::Reply(reply) => {
            let from = report.author_label.as_deref().unwrap_or(&reply.user);
            let when = reply
                .posted_at()
                .map(|t| {
                    t.with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                })
                .unwrap_or_else(|| reply.ts.clone());
            out.push_str("\nReply received:\n");
            out.push_str(&format!("From: {}\n", from));
            out.push_str(&format!("Text: {}\n", reply.text));
            out.push_str(&format!("Thread TS: {}\n", reply.thread_ts));
            out.push_str(&format!("Timestamp: {}\n", when));
        }
    }
    if let Some(err) = &report.status_error {
        out.push_str(&format!("Warning: Failed to post response status: {}\n", err));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ask_human_core::Reply;

    fn report(outcome: WaitOutcome) -> AskReport {
        AskReport {
            channel_id: "C1".into(),
            thread_ts: "1700000000.000100".into(),
            title_ts: None,
            outcome,
            author_label: Some("@jane".into()),
            status_error: None,
        }
    }

    fn reply(ts: &str) -> Reply {
        Reply {
            user: "U3".into(),
            text: "looks good".into(),
            ts: ts.into(),
            thread_ts: "1700000000.000100".into(),
        }
    }

    #[test]
    fn test_render_timeout() {
        assert_eq!(
            render_report(&report(WaitOutcome::TimedOut)),
            "Timeout: No reply received.\n"
        );
    }

    #[test]
    fn test_render_reply() {
        let out = render_report(&report(WaitOutcome::Reply(reply("1700000100.000200"))));
        assert!(out.contains("Reply received:"));
        assert!(out.contains("From: @jane\n"));
        assert!(out.contains("Text: looks good\n"));
        assert!(out.contains("Thread TS: 1700000000.000100\n"));
        assert!(out.contains("Timestamp: 2023-11-1"));
        assert!(!out.contains("Warning"));
    }

    #[test]
    fn test_render_unparsable_ts_falls_back_to_raw() {
        let out = render_report(&report(WaitOutcome::Reply(reply("garbage"))));
        assert!(out.contains("Timestamp: garbage\n"));
    }

    #[test]
    fn test_render_status_warning() {
        let mut r = report(WaitOutcome::TimedOut);
        r.status_error = Some("chat.postMessage: not_in_channel".into());
        let out = render_report(&r);
        assert!(out.ends_with("Warning: Failed to post response status: chat.postMessage: not_in_channel\n"));
    }

    #[test]
    fn test_render_events() {
        assert_eq!(
            render_event(&SessionEvent::ThreadStarted { ts: "1.2".into() }).as_deref(),
            Some("Message posted successfully. Timestamp: 1.2")
        );
        assert!(render_event(&SessionEvent::QuestionPosted { ts: "1.3".into() }).is_none());
        assert_eq!(
            render_event(&SessionEvent::Waiting { timeout_secs: 300 }).as_deref(),
            Some("Waiting for reply (timeout: 300 seconds)...")
        );
    }
}
