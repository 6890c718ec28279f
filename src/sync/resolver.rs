//! Cache-first author resolution for fetched timers.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::cache::store::KvStore;
use crate::cache::users::UserCache;
use crate::error::IdentityResolutionError;
use crate::types::{Timer, TimerUser};

/// Remote lookup for timer owners. Implemented by the Jira directory
/// client; substituted in tests.
#[async_trait]
pub trait UserDirectory: Send + Sync {
  async fn bulk_users(
    &self,
    account_ids: &[String],
  ) -> Result<Vec<TimerUser>, IdentityResolutionError>;
}

pub struct AuthorResolver<D, S> {
  directory: D,
  cache: UserCache<S>,
}

impl<D: UserDirectory, S: KvStore> AuthorResolver<D, S> {
  pub fn new(directory: D, cache: UserCache<S>) -> Self {
    Self { directory, cache }
  }

  /// Enrich timers with resolved author records.
  ///
  /// Owner references are deduplicated, looked up in the identity cache
  /// concurrently, and the misses resolved through one chunked bulk fetch
  /// whose results are written back to the cache. Owners that resolve
  /// nowhere degrade to a partial record (or none at all); resolution never
  /// fails the sync run.
  pub async fn resolve_authors(&self, timers: Vec<Timer>) -> Vec<Timer> {
    let account_ids = distinct_owners(&timers);

    let lookups = account_ids.iter().map(|id| self.cache.get(id));
    let cached = join_all(lookups).await;

    let mut resolved: HashMap<String, TimerUser> = HashMap::new();
    let mut misses: Vec<String> = Vec::new();
    for (id, result) in account_ids.into_iter().zip(cached) {
      match result {
        Ok(Some(user)) => {
          resolved.insert(id, user);
        }
        Ok(None) => misses.push(id),
        Err(err) => {
          warn!(account_id = %id, error = %err, "identity cache read failed");
          misses.push(id);
        }
      }
    }

    if !misses.is_empty() {
      debug!(misses = misses.len(), "bulk-resolving identity cache misses");
      match self.directory.bulk_users(&misses).await {
        Ok(users) => {
          for user in users {
            if let Err(err) = self.cache.put(&user).await {
              warn!(account_id = %user.account_id, error = %err, "identity cache write failed");
            }
            resolved.insert(user.account_id.clone(), user);
          }
        }
        Err(err) => {
          warn!(missing = misses.len(), error = %err, "bulk user resolution failed");
        }
      }
    }

    timers
      .into_iter()
      .map(|timer| enrich(timer, &resolved))
      .collect()
  }
}

/// Distinct non-empty owner references, in first-appearance order.
fn distinct_owners(timers: &[Timer]) -> Vec<String> {
  let mut seen = HashSet::new();
  timers
    .iter()
    .filter(|t| !t.running_for.is_empty())
    .filter(|t| seen.insert(t.running_for.clone()))
    .map(|t| t.running_for.clone())
    .collect()
}

/// Pick the best author record for a timer: an upstream-embedded author
/// that already has an email wins, then the resolved record, then whatever
/// partial record the upstream embedded. An author left without an email is
/// logged as not fully resolved.
fn enrich(mut timer: Timer, resolved: &HashMap<String, TimerUser>) -> Timer {
  let embedded = timer.author.take();
  let from_cache = resolved.get(&timer.running_for).cloned();

  let author = match embedded {
    Some(a) if a.has_email() => Some(a),
    embedded => from_cache.or(embedded),
  };

  if author.as_ref().is_none_or(|a| !a.has_email()) {
    warn!(
      timer_id = timer.id,
      running_for = %timer.running_for,
      "timer author not fully resolved"
    );
  }

  timer.author = author;
  timer
}
