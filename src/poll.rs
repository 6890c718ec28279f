//! Client-side polling discipline for the active-timer cache.
//!
//! The cache is eventually consistent: a stop is visible upstream before the
//! invalidation marker or the next sync run lands it in the cache.
//! Consumers bridge that gap with three pieces of state — the last server
//! snapshot, a pending optimistic override, and the last mutation outcome:
//!
//! - issuing a stop applies the override immediately (the timer disappears
//!   from the local view),
//! - a failed mutation rolls the view back to the last server state,
//! - a successful mutation opens a bounded fast-poll window so the view
//!   converges with the server quickly, then polling returns to the base
//!   interval,
//! - the override is cleared once a server snapshot cached after the
//!   mutation supersedes it.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::types::CacheSnapshot;

pub const BASE_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const FAST_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const FAST_POLL_WINDOW: Duration = Duration::from_secs(30);

/// Local override applied between issuing a mutation and the cache catching
/// up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOverride {
  /// A stop was issued: hide the stopped timer from the view.
  TimerStopped {
    timer_id: u64,
    applied_at: DateTime<Utc>,
  },
}

impl PendingOverride {
  fn applied_at(&self) -> DateTime<Utc> {
    match self {
      PendingOverride::TimerStopped { applied_at, .. } => *applied_at,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
  Pending,
  Succeeded,
  Failed,
}

/// Poll state for one cache partition.
#[derive(Debug)]
pub struct TimerPoll {
  server: Option<CacheSnapshot>,
  pending: Option<PendingOverride>,
  last_outcome: Option<MutationOutcome>,
  base_interval: Duration,
  fast_interval: Duration,
  fast_window: Duration,
  fast_until: Option<Instant>,
}

impl TimerPoll {
  pub fn new() -> Self {
    Self::with_intervals(BASE_POLL_INTERVAL, FAST_POLL_INTERVAL, FAST_POLL_WINDOW)
  }

  pub fn with_intervals(base: Duration, fast: Duration, window: Duration) -> Self {
    Self {
      server: None,
      pending: None,
      last_outcome: None,
      base_interval: base,
      fast_interval: fast,
      fast_window: window,
      fast_until: None,
    }
  }

  /// The view consumers render: the last server snapshot with any pending
  /// override applied.
  pub fn view(&self) -> Option<CacheSnapshot> {
    let mut snapshot = self.server.clone()?;
    if let Some(PendingOverride::TimerStopped { timer_id, .. }) = &self.pending {
      snapshot.timers.retain(|t| t.id != *timer_id);
    }
    Some(snapshot)
  }

  /// Record a completed cache read. A snapshot cached after the pending
  /// override's application supersedes the override.
  pub fn on_read(&mut self, snapshot: Option<CacheSnapshot>) {
    if let (Some(snap), Some(pending)) = (&snapshot, &self.pending) {
      if snap.cached_at > pending.applied_at() {
        self.pending = None;
      }
    }
    self.server = snapshot;
  }

  /// Record that a stop was issued; the view hides the timer immediately.
  pub fn on_stop_issued(&mut self, timer_id: u64, applied_at: DateTime<Utc>) {
    self.pending = Some(PendingOverride::TimerStopped {
      timer_id,
      applied_at,
    });
    self.last_outcome = Some(MutationOutcome::Pending);
  }

  /// Record the mutation result. Success opens the fast-poll window;
  /// failure rolls the view back to the last observed server state.
  pub fn on_stop_result(&mut self, ok: bool, now: Instant) {
    if ok {
      self.last_outcome = Some(MutationOutcome::Succeeded);
      self.fast_until = Some(now + self.fast_window);
    } else {
      self.last_outcome = Some(MutationOutcome::Failed);
      self.pending = None;
    }
  }

  /// How long to wait before the next cache read.
  pub fn next_poll_delay(&self, now: Instant) -> Duration {
    match self.fast_until {
      Some(until) if now < until => self.fast_interval,
      _ => self.base_interval,
    }
  }

  pub fn last_outcome(&self) -> Option<MutationOutcome> {
    self.last_outcome
  }

  pub fn server_snapshot(&self) -> Option<&CacheSnapshot> {
    self.server.as_ref()
  }

  pub fn has_pending_override(&self) -> bool {
    self.pending.is_some()
  }
}

impl Default for TimerPoll {
  fn default() -> Self {
    Self::new()
  }
}
