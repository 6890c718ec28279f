//! The sync run: exchange credentials, fetch timers, resolve authors, write
//! partitioned snapshots.
//!
//! One run is one logical task. Credential and fetch failures abort it with
//! no cache writes; identity and per-partition write failures degrade and
//! are logged. The run itself never retries — retry and overlap control
//! belong to the trigger (see [`crate::sched`]). Two runs of this pipeline
//! are not serialized against each other by the core.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::cache::store::KvStore;
use crate::cache::timers::TimerCache;
use crate::error::{CredentialExchangeError, SyncError, UpstreamFetchError};
use crate::sync::resolver::{AuthorResolver, UserDirectory};
use crate::types::{ActiveTimers, SyncOutcome};

/// Upstream timer service seam: token exchange, active-timer listing, stop.
/// Implemented by the Clockwork Report client; substituted in tests.
#[async_trait]
pub trait TimerProvider: Send + Sync {
  /// Exchange the session credential for a short-lived bearer token.
  async fn acquire_token(&self, domain: &str) -> Result<String, CredentialExchangeError>;

  /// Fetch the complete set of currently-active timers, across all pages.
  async fn active_timers(
    &self,
    token: &str,
    domain: &str,
  ) -> Result<ActiveTimers, UpstreamFetchError>;

  /// Stop a running timer upstream.
  async fn stop_timer(
    &self,
    token: &str,
    domain: &str,
    timer_id: u64,
  ) -> Result<(), UpstreamFetchError>;
}

pub struct SyncPipeline<P, D, S> {
  provider: P,
  resolver: AuthorResolver<D, S>,
  timers: TimerCache<S>,
}

impl<P, D, S> SyncPipeline<P, D, S>
where
  P: TimerProvider,
  D: UserDirectory,
  S: KvStore,
{
  pub fn new(provider: P, resolver: AuthorResolver<D, S>, timers: TimerCache<S>) -> Self {
    Self {
      provider,
      resolver,
      timers,
    }
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  pub fn timer_cache(&self) -> &TimerCache<S> {
    &self.timers
  }

  /// Run one full sync for `domain`.
  pub async fn run(&self, domain: &str) -> Result<SyncOutcome, SyncError> {
    info!(domain, "starting active-timer sync");

    let token = self.provider.acquire_token(domain).await?;
    debug!(domain, "token acquired");

    let fetch_started = Utc::now();
    let fetched = self.provider.active_timers(&token, domain).await?;
    let cached_at = Utc::now();
    info!(domain, total = fetched.total, "fetched active timers");

    let enriched = self.resolver.resolve_authors(fetched.timers).await;

    let stats = self
      .timers
      .write_snapshots(&enriched, cached_at, fetch_started)
      .await;
    info!(
      domain,
      owners = stats.owners_cached,
      timers = stats.timers_cached,
      "cached timer snapshots"
    );

    Ok(SyncOutcome {
      success: true,
      jira_domain: domain.to_string(),
      timers_count: fetched.total,
      cached_users: stats.owners_cached,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::store::SqliteStore;
  use crate::cache::users::UserCache;
  use crate::error::IdentityResolutionError;
  use crate::types::{IssueRef, Timer, TimerUser, ALL_OWNERS};
  use chrono::Duration;
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

  enum FakeProvider {
    Timers(Vec<Timer>),
    RejectToken,
    FailFetch,
  }

  #[async_trait]
  impl TimerProvider for FakeProvider {
    async fn acquire_token(&self, domain: &str) -> Result<String, CredentialExchangeError> {
      match self {
        FakeProvider::RejectToken => Err(CredentialExchangeError::Rejected {
          domain: domain.to_string(),
          status: 401,
          body: "session expired".to_string(),
        }),
        _ => Ok("jwt-token".to_string()),
      }
    }

    async fn active_timers(
      &self,
      _token: &str,
      _domain: &str,
    ) -> Result<ActiveTimers, UpstreamFetchError> {
      match self {
        FakeProvider::Timers(timers) => Ok(ActiveTimers {
          timers: timers.clone(),
          total: timers.len() as u64,
        }),
        _ => Err(UpstreamFetchError::Status {
          status: 502,
          body: "bad gateway".to_string(),
        }),
      }
    }

    async fn stop_timer(
      &self,
      _token: &str,
      _domain: &str,
      _timer_id: u64,
    ) -> Result<(), UpstreamFetchError> {
      Ok(())
    }
  }

  struct FailingDirectory;

  #[async_trait]
  impl UserDirectory for FailingDirectory {
    async fn bulk_users(
      &self,
      _account_ids: &[String],
    ) -> Result<Vec<TimerUser>, IdentityResolutionError> {
      Err(IdentityResolutionError::Status {
        status: 500,
        body: "boom".to_string(),
      })
    }
  }

  struct EmptyDirectory;

  #[async_trait]
  impl UserDirectory for EmptyDirectory {
    async fn bulk_users(
      &self,
      _account_ids: &[String],
    ) -> Result<Vec<TimerUser>, IdentityResolutionError> {
      Ok(Vec::new())
    }
  }

  fn pipeline<D: UserDirectory>(
    provider: FakeProvider,
    directory: D,
  ) -> SyncPipeline<FakeProvider, D, SqliteStore> {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let resolver = AuthorResolver::new(
      directory,
      UserCache::new(Arc::clone(&store), Duration::days(2)),
    );
    let timers = TimerCache::new(store, Duration::seconds(600), Duration::seconds(30));
    SyncPipeline::new(provider, resolver, timers)
  }

  #[tokio::test]
  async fn successful_run_reports_the_outcome_and_writes_partitions() {
    let timers = vec![timer(1, "u1"), timer(2, "u1"), timer(3, "u2")];
    let pipeline = pipeline(FakeProvider::Timers(timers), EmptyDirectory);

    let outcome = pipeline.run("example.atlassian.net").await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.jira_domain, "example.atlassian.net");
    assert_eq!(outcome.timers_count, 3);
    assert_eq!(outcome.cached_users, 2);

    let all = pipeline.timer_cache().read(ALL_OWNERS).await.unwrap().unwrap();
    assert_eq!(all.timers.len(), 3);
  }

  #[tokio::test]
  async fn rerunning_with_unchanged_upstream_is_idempotent() {
    let timers = vec![timer(1, "u1"), timer(2, "u2")];
    let pipeline = pipeline(FakeProvider::Timers(timers), EmptyDirectory);

    pipeline.run("example.atlassian.net").await.unwrap();
    let first_all = pipeline.timer_cache().read(ALL_OWNERS).await.unwrap().unwrap();
    let first_u1 = pipeline.timer_cache().read("u1").await.unwrap().unwrap();

    pipeline.run("example.atlassian.net").await.unwrap();
    let second_all = pipeline.timer_cache().read(ALL_OWNERS).await.unwrap().unwrap();
    let second_u1 = pipeline.timer_cache().read("u1").await.unwrap().unwrap();

    // Semantically equal: same timers, same partitioning. Only cached_at
    // may move.
    assert_eq!(second_all.timers, first_all.timers);
    assert_eq!(second_all.owner_key, first_all.owner_key);
    assert_eq!(second_u1.timers, first_u1.timers);
  }

  #[tokio::test]
  async fn credential_failure_aborts_with_no_writes() {
    let pipeline = pipeline(FakeProvider::RejectToken, EmptyDirectory);

    let err = pipeline.run("example.atlassian.net").await.unwrap_err();
    assert!(matches!(err, SyncError::Credential(_)));
    assert!(pipeline.timer_cache().read(ALL_OWNERS).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn fetch_failure_aborts_with_no_writes() {
    let pipeline = pipeline(FakeProvider::FailFetch, EmptyDirectory);

    let err = pipeline.run("example.atlassian.net").await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(_)));
    assert!(pipeline.timer_cache().read(ALL_OWNERS).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn identity_failure_degrades_but_the_run_completes() {
    let timers = vec![timer(1, "u1"), timer(2, "u2")];
    let pipeline = pipeline(FakeProvider::Timers(timers), FailingDirectory);

    let outcome = pipeline.run("example.atlassian.net").await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.cached_users, 2);

    let all = pipeline.timer_cache().read(ALL_OWNERS).await.unwrap().unwrap();
    assert_eq!(all.timers.len(), 2);
    assert!(all.timers.iter().all(|t| t.author.is_none()));
  }
}
