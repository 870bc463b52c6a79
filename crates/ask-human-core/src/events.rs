//! SessionEvent — progress notices sent from a running session to the frontend.

/// Milestones of an `ask`, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The title message was posted and became the thread root.
    ThreadStarted { ts: String },

    /// The question is in the thread.
    QuestionPosted { ts: String },

    /// The deadline clock has started.
    Waiting { timeout_secs: u64 },
}
