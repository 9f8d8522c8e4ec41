//! Scheduler wake signal.
//!
//! A wake is a nudge asking the cron executor to poll its store now rather
//! than on its next regular tick. Sending one never blocks and never fails:
//! a missed wake only means the job runs on the next tick instead.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sink for wake requests.
pub trait WakeSignal: Send + Sync {
    /// Ask the scheduler to poll immediately. Fire-and-forget.
    fn request_immediate_poll(&self, reason: &str);
}

/// A wake request as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    pub reason: String,
}

/// [`WakeSignal`] backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelWake {
    tx: mpsc::UnboundedSender<WakeRequest>,
}

impl WakeSignal for ChannelWake {
    fn request_immediate_poll(&self, reason: &str) {
        let request = WakeRequest {
            reason: reason.to_owned(),
        };
        if self.tx.send(request).is_err() {
            warn!(reason, "scheduler wake channel closed; job will run on next tick");
        } else {
            debug!(reason, "scheduler wake requested");
        }
    }
}

/// Create a wake sender and the receiver the scheduler listens on.
#[must_use]
pub fn wake_channel() -> (ChannelWake, mpsc::UnboundedReceiver<WakeRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelWake { tx }, rx)
}

/// [`WakeSignal`] for deployments where the executor polls on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWake;

impl WakeSignal for NoopWake {
    fn request_immediate_poll(&self, reason: &str) {
        debug!(reason, "no scheduler wake sink configured");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn wake_is_delivered_with_reason() {
        let (wake, mut rx) = wake_channel();
        wake.request_immediate_poll("memory-consolidation:s1");
        let request = rx.try_recv().unwrap();
        assert_eq!(request.reason, "memory-consolidation:s1");
    }

    #[test]
    fn closed_receiver_does_not_panic() {
        let (wake, rx) = wake_channel();
        drop(rx);
        wake.request_immediate_poll("late");
    }

    #[test]
    fn noop_wake_accepts_requests() {
        NoopWake.request_immediate_poll("ignored");
    }
}
