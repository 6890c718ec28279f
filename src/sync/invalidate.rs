//! Stop-side invalidation: make the cache reflect a stop before the next
//! scheduled sync would.

use tracing::{info, warn};

use crate::cache::store::KvStore;
use crate::cache::timers::TimerCache;
use crate::error::StopTimerError;
use crate::sync::pipeline::TimerProvider;

/// Stop a timer upstream, then invalidate the affected cache partitions.
///
/// The upstream stop is the source of truth: once it succeeds this returns
/// Ok even if invalidation fails — a failed invalidation only delays when
/// readers observe the stop, and the snapshot TTL still bounds that.
pub async fn stop_and_invalidate<P: TimerProvider, S: KvStore>(
  provider: &P,
  cache: &TimerCache<S>,
  domain: &str,
  timer_id: u64,
  account_id: Option<&str>,
) -> Result<(), StopTimerError> {
  let token = provider.acquire_token(domain).await?;
  provider.stop_timer(&token, domain, timer_id).await?;
  info!(timer_id, "timer stopped upstream");

  cache.mark_stopped(account_id).await;
  if account_id.is_none() {
    warn!(timer_id, "no accountId supplied; only the global partition was invalidated");
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::store::SqliteStore;
  use crate::error::{CredentialExchangeError, UpstreamFetchError};
  use crate::types::{ActiveTimers, IssueRef, Timer, ALL_OWNERS};
  use async_trait::async_trait;
  use chrono::{Duration, Utc};
  use std::sync::Arc;

  fn timer(id: u64, owner: &str) -> Timer {
    Timer {
      id,
      started_at: "2024-03-01T09:00:00.000Z".to_string(),
      finished_at: None,
      comment: None,
      running_for: owner.to_string(),
      till_now: 60,
      worklog_count: 0,
      issue: IssueRef {
        key: format!("KAN-{id}"),
        id: 10000 + id,
      },
      author: None,
    }
  }

  struct FakeProvider {
    stop_fails: bool,
  }

  #[async_trait]
  impl TimerProvider for FakeProvider {
    async fn acquire_token(&self, _domain: &str) -> Result<String, CredentialExchangeError> {
      Ok("jwt-token".to_string())
    }

    async fn active_timers(
      &self,
      _token: &str,
      _domain: &str,
    ) -> Result<ActiveTimers, UpstreamFetchError> {
      Ok(ActiveTimers {
        timers: Vec::new(),
        total: 0,
      })
    }

    async fn stop_timer(
      &self,
      _token: &str,
      _domain: &str,
      _timer_id: u64,
    ) -> Result<(), UpstreamFetchError> {
      if self.stop_fails {
        return Err(UpstreamFetchError::Status {
          status: 422,
          body: "timer already stopped".to_string(),
        });
      }
      Ok(())
    }
  }

  fn seeded_cache() -> TimerCache<SqliteStore> {
    TimerCache::new(
      Arc::new(SqliteStore::in_memory().unwrap()),
      Duration::seconds(600),
      Duration::seconds(30),
    )
  }

  #[tokio::test]
  async fn successful_stop_invalidates_both_partitions() {
    let cache = seeded_cache();
    let now = Utc::now();
    cache
      .write_snapshots(&[timer(1, "u1"), timer(2, "u2")], now, now)
      .await;

    let provider = FakeProvider { stop_fails: false };
    stop_and_invalidate(&provider, &cache, "example.atlassian.net", 1, Some("u1"))
      .await
      .unwrap();

    assert!(cache.read("u1").await.unwrap().is_none());
    assert!(cache.read(ALL_OWNERS).await.unwrap().is_none());
    // Unrelated partitions are untouched.
    assert!(cache.read("u2").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn upstream_failure_leaves_the_cache_alone() {
    let cache = seeded_cache();
    let now = Utc::now();
    cache.write_snapshots(&[timer(1, "u1")], now, now).await;

    let provider = FakeProvider { stop_fails: true };
    let err = stop_and_invalidate(&provider, &cache, "example.atlassian.net", 1, Some("u1"))
      .await
      .unwrap_err();

    assert!(matches!(err, StopTimerError::Upstream(_)));
    assert!(cache.read("u1").await.unwrap().is_some());
    assert!(cache.read(ALL_OWNERS).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn stop_without_account_id_invalidates_the_global_partition() {
    let cache = seeded_cache();
    let now = Utc::now();
    cache.write_snapshots(&[timer(1, "u1")], now, now).await;

    let provider = FakeProvider { stop_fails: false };
    stop_and_invalidate(&provider, &cache, "example.atlassian.net", 1, None)
      .await
      .unwrap();

    assert!(cache.read(ALL_OWNERS).await.unwrap().is_none());
    assert!(cache.read("u1").await.unwrap().is_some());
  }
}
