//! Active-timer snapshot cache: partitioned writes, TTL-bounded reads, and
//! stop-marker invalidation.
//!
//! Each partition key holds one whole snapshot that is replaced atomically
//! per write; there is never a partial timer list visible mid-write. The
//! stop path writes a short-lived `Stopped` marker instead of a bare
//! delete, so a sync run that fetched pre-stop data cannot resurrect a
//! stopped timer for longer than the marker's TTL.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::store::KvStore;
use crate::error::CacheError;
use crate::types::{CacheSnapshot, Timer, ALL_OWNERS};

const TIMER_KEY_PREFIX: &str = "clockwork:timers:";

/// Stored cache value: a full snapshot, or a stop marker left by the
/// invalidation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TimerCacheEntry {
  Snapshot(CacheSnapshot),
  Stopped { stopped_at: DateTime<Utc> },
}

/// Counters from one write pass, for run logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
  /// Owner partitions that landed (the "all" partition is not counted)
  pub owners_cached: usize,
  /// Timers in the "all" snapshot, 0 if that write failed or was suppressed
  pub timers_cached: usize,
}

pub struct TimerCache<S> {
  store: Arc<S>,
  snapshot_ttl: Duration,
  stop_marker_ttl: Duration,
}

impl<S: KvStore> TimerCache<S> {
  pub fn new(store: Arc<S>, snapshot_ttl: Duration, stop_marker_ttl: Duration) -> Self {
    Self {
      store,
      snapshot_ttl,
      stop_marker_ttl,
    }
  }

  fn key(owner: &str) -> String {
    format!("{TIMER_KEY_PREFIX}{owner}")
  }

  /// Read the current snapshot for a partition. Absent, expired and
  /// stop-marked partitions all read as "no data".
  pub async fn read(&self, owner: &str) -> Result<Option<CacheSnapshot>, CacheError> {
    let Some(raw) = self.store.get(&Self::key(owner)).await? else {
      return Ok(None);
    };

    match serde_json::from_slice::<TimerCacheEntry>(&raw)? {
      TimerCacheEntry::Snapshot(snapshot) => Ok(Some(snapshot)),
      TimerCacheEntry::Stopped { .. } => Ok(None),
    }
  }

  /// Partition `timers` by owner and write one snapshot per owner plus the
  /// "all" partition, concurrently. Timers without an owner reference
  /// appear only in "all". A failed partition write is logged and skipped;
  /// the remaining partitions still land.
  ///
  /// `cached_at` is the moment the upstream fetch resolved and is stamped
  /// into every snapshot. `fetch_started` is compared against stop markers:
  /// a marker newer than it means the data in hand may predate the stop,
  /// and that partition is skipped.
  pub async fn write_snapshots(
    &self,
    timers: &[Timer],
    cached_at: DateTime<Utc>,
    fetch_started: DateTime<Utc>,
  ) -> WriteStats {
    let mut by_owner: HashMap<&str, Vec<Timer>> = HashMap::new();
    for timer in timers {
      if !timer.running_for.is_empty() {
        by_owner
          .entry(timer.running_for.as_str())
          .or_default()
          .push(timer.clone());
      }
    }

    let mut partitions: Vec<(String, Vec<Timer>)> = by_owner
      .into_iter()
      .map(|(owner, owned)| (owner.to_string(), owned))
      .collect();
    partitions.push((ALL_OWNERS.to_string(), timers.to_vec()));

    let writes = partitions.into_iter().map(|(owner, partition)| async move {
      let written = self
        .write_partition(&owner, partition, cached_at, fetch_started)
        .await;
      (owner, written)
    });

    let mut stats = WriteStats {
      owners_cached: 0,
      timers_cached: 0,
    };
    for (owner, written) in join_all(writes).await {
      let Some(count) = written else { continue };
      if owner == ALL_OWNERS {
        stats.timers_cached = count;
      } else {
        stats.owners_cached += 1;
      }
    }
    stats
  }

  /// Returns the number of timers written, or None when the write failed
  /// or was suppressed by a newer stop marker.
  async fn write_partition(
    &self,
    owner: &str,
    timers: Vec<Timer>,
    cached_at: DateTime<Utc>,
    fetch_started: DateTime<Utc>,
  ) -> Option<usize> {
    match self
      .try_write_partition(owner, timers, cached_at, fetch_started)
      .await
    {
      Ok(written) => written,
      Err(err) => {
        warn!(owner, error = %err, "partition write failed");
        None
      }
    }
  }

  async fn try_write_partition(
    &self,
    owner: &str,
    timers: Vec<Timer>,
    cached_at: DateTime<Utc>,
    fetch_started: DateTime<Utc>,
  ) -> Result<Option<usize>, CacheError> {
    let key = Self::key(owner);

    if let Some(raw) = self.store.get(&key).await? {
      if let Ok(TimerCacheEntry::Stopped { stopped_at }) = serde_json::from_slice(&raw) {
        if stopped_at > fetch_started {
          debug!(owner, "skipping partition write: newer stop marker present");
          return Ok(None);
        }
      }
    }

    let count = timers.len();
    let entry = TimerCacheEntry::Snapshot(CacheSnapshot {
      timers,
      cached_at,
      owner_key: owner.to_string(),
    });
    let payload = serde_json::to_vec(&entry)?;
    self.store.put(&key, &payload, self.snapshot_ttl).await?;

    Ok(Some(count))
  }

  /// Write stop markers for the "all" partition and, when known, the acting
  /// owner's partition. Best effort: failures are logged, never returned,
  /// since the upstream stop has already succeeded.
  pub async fn mark_stopped(&self, owner: Option<&str>) {
    let stopped_at = Utc::now();

    let mut owners = vec![ALL_OWNERS];
    if let Some(owner) = owner.filter(|o| !o.is_empty()) {
      owners.push(owner);
    }

    let markers = owners.into_iter().map(|owner| async move {
      if let Err(err) = self.write_marker(owner, stopped_at).await {
        warn!(owner, error = %err, "failed to invalidate timer partition");
      }
    });
    join_all(markers).await;
  }

  async fn write_marker(&self, owner: &str, stopped_at: DateTime<Utc>) -> Result<(), CacheError> {
    let payload = serde_json::to_vec(&TimerCacheEntry::Stopped { stopped_at })?;
    self
      .store
      .put(&Self::key(owner), &payload, self.stop_marker_ttl)
      .await
  }
}

impl<S> Clone for TimerCache<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      snapshot_ttl: self.snapshot_ttl,
      stop_marker_ttl: self.stop_marker_ttl,
    }
  }
}
