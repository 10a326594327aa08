//! Background poll loop: fetch a snapshot every tick and publish it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::hub::Publish;
use crate::source::{FetchError, SnapshotSource};
use crate::types::Snapshot;

/// What to do when a fetch fails after the loop is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the loop and surface the error.
    Exit,
    /// Keep serving the existing backlog and retry with exponential backoff,
    /// capped at `max_backoff`.
    Retry { max_backoff: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub on_failure: FailurePolicy,
}

/// Doubling retry delay, reset on success.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let d = self.current;
        self.current = (self.current * 2).min(self.max);
        d
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Run the loop on the current task until the hub closes or a fatal error.
///
/// Returns `Ok(())` once the sink is closed, whether or not fetches are
/// currently failing.
pub async fn run_poller<S, P>(source: S, sink: P, cfg: PollConfig) -> Result<(), FetchError>
where
    S: SnapshotSource,
    P: Publish<Snapshot>,
{
    let mut ticker = interval(cfg.interval);
    // A slow fetch swallows the ticks it overlapped instead of queuing them.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // interval() fires immediately; the caller already published the first snapshot.
    ticker.tick().await;

    let mut backoff = match cfg.on_failure {
        FailurePolicy::Retry { max_backoff } => Some(Backoff::new(cfg.interval, max_backoff)),
        FailurePolicy::Exit => None,
    };
    let mut failures: u32 = 0;

    loop {
        ticker.tick().await;
        if sink.is_closed() {
            info!("hub closed; stopping poller");
            return Ok(());
        }
        match source.fetch().await {
            Ok(snap) => {
                if failures > 0 {
                    info!(after = failures, "upstream recovered");
                    failures = 0;
                }
                if let Some(b) = backoff.as_mut() {
                    b.reset();
                }
                match sink.publish(snap) {
                    Ok(n) => debug!(viewers = n, "published snapshot"),
                    Err(_) => {
                        info!("hub closed; stopping poller");
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                failures += 1;
                let Some(b) = backoff.as_mut() else {
                    error!("fetch failed: {e}");
                    return Err(e);
                };
                let delay = b.next_delay();
                warn!(failures, retry_in_ms = delay.as_millis() as u64, "fetch failed: {e}");
                // The retry is the next tick; regular spacing resumes after it.
                ticker.reset_after(delay);
            }
        }
    }
}

/// Spawn [`run_poller`] onto the runtime.
pub fn spawn_poller<S, P>(source: S, sink: P, cfg: PollConfig) -> JoinHandle<Result<(), FetchError>>
where
    S: SnapshotSource + 'static,
    P: Publish<Snapshot> + Send + 'static,
{
    tokio::spawn(run_poller(source, sink, cfg))
}
