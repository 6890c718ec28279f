//! Sync triggers and the run-level retry/timeout policy.
//!
//! The pipeline itself never retries and has no internal timeouts; both
//! live here, at the trigger. Triggers are processed one at a time, so this
//! scheduler never overlaps two runs within one process.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cache::store::KvStore;
use crate::sync::pipeline::{SyncPipeline, TimerProvider};
use crate::sync::resolver::UserDirectory;

/// A reason to run the sync pipeline.
#[derive(Debug, Clone)]
pub enum Trigger {
  /// Scheduled tick at the configured interval.
  Tick,
  /// Explicit request, optionally overriding the configured domain.
  SyncRequested { domain: Option<String> },
}

/// Produces triggers from a fixed-interval timer and an external request
/// channel. The first tick fires immediately, so watch mode syncs on
/// startup.
pub struct TriggerSource {
  rx: mpsc::UnboundedReceiver<Trigger>,
}

/// Handle for queueing explicit sync requests.
#[derive(Clone)]
pub struct TriggerHandle {
  tx: mpsc::UnboundedSender<Trigger>,
}

impl TriggerHandle {
  pub fn request_sync(&self, domain: Option<String>) {
    let _ = self.tx.send(Trigger::SyncRequested { domain });
  }
}

impl TriggerSource {
  pub fn new(interval: Duration) -> (Self, TriggerHandle) {
    let (tx, rx) = mpsc::unbounded_channel();

    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        if tick_tx.send(Trigger::Tick).is_err() {
          break;
        }
      }
    });

    (Self { rx }, TriggerHandle { tx })
  }

  /// Receive the next trigger.
  pub async fn next(&mut self) -> Option<Trigger> {
    self.rx.recv().await
  }
}

/// Run the pipeline for one trigger, with a per-run deadline and a bounded
/// number of retries. Failures are logged and absorbed; the next trigger
/// always gets a fresh chance.
pub async fn run_with_retries<P, D, S>(
  pipeline: &SyncPipeline<P, D, S>,
  domain: &str,
  retries: u32,
  run_timeout: Duration,
) where
  P: TimerProvider,
  D: UserDirectory,
  S: KvStore,
{
  for attempt in 0..=retries {
    match tokio::time::timeout(run_timeout, pipeline.run(domain)).await {
      Ok(Ok(outcome)) => {
        info!(
          domain,
          timers = outcome.timers_count,
          owners = outcome.cached_users,
          attempt,
          "sync run complete"
        );
        return;
      }
      Ok(Err(err)) => warn!(domain, attempt, error = %err, "sync run failed"),
      Err(_) => warn!(domain, attempt, "sync run timed out"),
    }
  }
  error!(domain, retries, "sync run exhausted its retries");
}
