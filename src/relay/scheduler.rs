use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{MailRelay, PollOutcome, RelayError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How the scheduler waits after an empty poll.
#[async_trait(?Send)]
pub trait Pause {
    async fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait(?Send)]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub polls: usize,
    pub idle_polls: usize,
    pub messages_relayed: usize,
}

impl PollStats {
    fn record(&mut self, outcome: PollOutcome) {
        self.polls += 1;
        match outcome {
            PollOutcome::Idle => self.idle_polls += 1,
            PollOutcome::Processed(count) => self.messages_relayed += count,
        }
    }
}

/// Drives `MailRelay::poll_once` repeatedly. Only an empty poll is followed by a pause;
/// a productive poll is followed straight away by the next one.
#[derive(Debug, Clone)]
pub struct PollScheduler<P = TokioPause> {
    interval: Duration,
    pause: P,
}

impl PollScheduler<TokioPause> {
    pub fn new(interval: Duration) -> Self {
        Self::with_pause(interval, TokioPause)
    }
}

impl Default for PollScheduler<TokioPause> {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl<P: Pause> PollScheduler<P> {
    pub fn with_pause(interval: Duration, pause: P) -> Self {
        Self { interval, pause }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls until `stop` returns true for an outcome or a poll fails.
    pub async fn run_until<F>(&self, relay: &MailRelay<'_>, mut stop: F) -> Result<PollStats, RelayError>
    where
        F: FnMut(PollOutcome) -> bool,
    {
        let mut stats = PollStats::default();
        loop {
            let outcome = relay.poll_once().await?;
            stats.record(outcome);
            if stop(outcome) {
                return Ok(stats);
            }

            if outcome == PollOutcome::Idle {
                debug!(interval_secs = self.interval.as_secs(), "waiting before next poll");
                self.pause.pause(self.interval).await;
            }
        }
    }

    /// Polls forever; returns only with the error that ended the loop.
    pub async fn run_forever(&self, relay: &MailRelay<'_>) -> Result<(), RelayError> {
        self.run_until(relay, |_| false).await.map(|_| ())
    }
}
