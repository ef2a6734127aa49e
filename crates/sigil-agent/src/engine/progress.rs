// ============================================
// File: crates/sigil-agent/src/engine/progress.rs
// ============================================
//! # Progress Reporting
//!
//! Stage updates for a UI. They never influence the protocol and carry
//! no way to stop it; cancellation goes through [`super::RunToken`].

use tokio::sync::mpsc;

/// Number of stages a prover run reports.
pub const TOTAL_STAGES: u8 = 5;

/// One stage update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 1-based stage index
    pub stage: u8,
    /// Total number of stages
    pub total: u8,
    /// Human-readable description
    pub description: &'static str,
}

impl Progress {
    pub(crate) const fn stage(stage: u8, description: &'static str) -> Self {
        Self {
            stage,
            total: TOTAL_STAGES,
            description,
        }
    }
}

/// Receives stage updates from the protocol task.
pub trait ProgressSink: Send + Sync {
    /// Called once per stage, on the protocol task.
    fn on_progress(&self, progress: Progress);
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: Progress) {}
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn on_progress(&self, progress: Progress) {
        self(progress);
    }
}

/// Forwards updates into a Tokio channel for another task to consume.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<Progress>,
}

impl ChannelProgress {
    /// Creates the sink and its receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Progress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, progress: Progress) {
        // Receiver gone means nobody is watching.
        let _ = self.tx.send(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_progress() {
        let (sink, mut rx) = ChannelProgress::new();
        sink.on_progress(Progress::stage(1, "one"));
        sink.on_progress(Progress::stage(2, "two"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stage, 1);
        assert_eq!(first.total, TOTAL_STAGES);
        assert_eq!(rx.recv().await.unwrap().description, "two");

        drop(rx);
        sink.on_progress(Progress::stage(3, "ignored"));
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p.stage);
        sink.on_progress(Progress::stage(4, "x"));
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }
}
