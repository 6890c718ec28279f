//! Identity record cache.
//!
//! Identity churn is low (the same people run timers repeatedly), so these
//! entries live far longer than timer snapshots — two days by default.

use chrono::Duration;
use std::sync::Arc;

use crate::cache::store::KvStore;
use crate::error::CacheError;
use crate::types::TimerUser;

const USER_KEY_PREFIX: &str = "jira:user:";

pub struct UserCache<S> {
  store: Arc<S>,
  ttl: Duration,
}

impl<S: KvStore> UserCache<S> {
  pub fn new(store: Arc<S>, ttl: Duration) -> Self {
    Self { store, ttl }
  }

  fn key(account_id: &str) -> String {
    format!("{USER_KEY_PREFIX}{account_id}")
  }

  pub async fn get(&self, account_id: &str) -> Result<Option<TimerUser>, CacheError> {
    let Some(raw) = self.store.get(&Self::key(account_id)).await? else {
      return Ok(None);
    };
    Ok(Some(serde_json::from_slice(&raw)?))
  }

  /// Store a resolved user. A record without an email never replaces one
  /// that has it — resolution quality must not regress while an entry is
  /// live.
  pub async fn put(&self, user: &TimerUser) -> Result<(), CacheError> {
    if !user.has_email() {
      if let Some(existing) = self.get(&user.account_id).await? {
        if existing.has_email() {
          return Ok(());
        }
      }
    }

    let payload = serde_json::to_vec(user)?;
    self
      .store
      .put(&Self::key(&user.account_id), &payload, self.ttl)
      .await
  }
}

impl<S> Clone for UserCache<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      ttl: self.ttl,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::store::SqliteStore;

  fn user(account_id: &str, email: Option<&str>) -> TimerUser {
    TimerUser {
      account_id: account_id.to_string(),
      email_address: email.map(String::from),
      display_name: Some("Ada Lovelace".to_string()),
      avatar_url: None,
    }
  }

  fn cache() -> UserCache<SqliteStore> {
    UserCache::new(
      Arc::new(SqliteStore::in_memory().unwrap()),
      Duration::days(2),
    )
  }

  #[tokio::test]
  async fn put_get_round_trip() {
    let cache = cache();
    let ada = user("acc-1", Some("ada@example.com"));

    cache.put(&ada).await.unwrap();
    assert_eq!(cache.get("acc-1").await.unwrap(), Some(ada));
  }

  #[tokio::test]
  async fn missing_user_reads_as_none() {
    let cache = cache();
    assert_eq!(cache.get("acc-404").await.unwrap(), None);
  }

  #[tokio::test]
  async fn partial_record_never_replaces_a_resolved_one() {
    let cache = cache();
    let resolved = user("acc-1", Some("ada@example.com"));

    cache.put(&resolved).await.unwrap();
    cache.put(&user("acc-1", None)).await.unwrap();
    cache.put(&user("acc-1", Some(""))).await.unwrap();

    assert_eq!(cache.get("acc-1").await.unwrap(), Some(resolved));
  }

  #[tokio::test]
  async fn resolved_record_upgrades_a_partial_one() {
    let cache = cache();

    cache.put(&user("acc-1", None)).await.unwrap();
    let resolved = user("acc-1", Some("ada@example.com"));
    cache.put(&resolved).await.unwrap();

    assert_eq!(cache.get("acc-1").await.unwrap(), Some(resolved));
  }

  #[tokio::test]
  async fn partial_record_is_still_stored_when_nothing_better_exists() {
    let cache = cache();

    cache.put(&user("acc-1", None)).await.unwrap();

    let stored = cache.get("acc-1").await.unwrap().unwrap();
    assert!(!stored.has_email());
    assert_eq!(stored.display_name.as_deref(), Some("Ada Lovelace"));
  }

  #[tokio::test]
  async fn expired_records_read_as_none() {
    let cache = UserCache::new(
      Arc::new(SqliteStore::in_memory().unwrap()),
      Duration::seconds(0),
    );

    cache
      .put(&user("acc-1", Some("ada@example.com")))
      .await
      .unwrap();

    assert_eq!(cache.get("acc-1").await.unwrap(), None);
  }
}
