//! Domain types shared across the sync pipeline and the cache.
//!
//! These are separate from the raw API types: everything here has already
//! been validated at an upstream boundary. All of them round-trip through
//! JSON losslessly — nullable fields serialize as explicit `null`, since
//! cache consumers branch on null-ness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partition key covering every active timer regardless of owner.
pub const ALL_OWNERS: &str = "all";

/// Reference to the Jira issue a timer is running against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
  pub key: String,
  pub id: u64,
}

/// A resolved (or partially resolved) Jira user.
///
/// A record without an email address counts as unresolved: it may be
/// displayed, but it must never replace a resolved record in the identity
/// cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUser {
  pub account_id: String,
  pub email_address: Option<String>,
  pub display_name: Option<String>,
  pub avatar_url: Option<String>,
}

impl TimerUser {
  /// Whether this record carries a usable email address.
  pub fn has_email(&self) -> bool {
    self.email_address.as_deref().is_some_and(|e| !e.is_empty())
  }
}

/// One running (or just-stopped) Clockwork timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
  pub id: u64,
  pub started_at: String,
  pub finished_at: Option<String>,
  pub comment: Option<String>,
  /// accountId of the user the timer is running for. Empty when the
  /// upstream record carries no owner.
  pub running_for: String,
  /// Seconds elapsed as of the snapshot. Never recomputed by the cache;
  /// see [`Timer::elapsed_as_of`].
  pub till_now: u64,
  pub worklog_count: u32,
  pub issue: IssueRef,
  pub author: Option<TimerUser>,
}

impl Timer {
  /// Live elapsed seconds: the snapshot value plus the time since the
  /// snapshot was taken. `till_now` on its own is only meaningful together
  /// with the snapshot's `cached_at`.
  pub fn elapsed_as_of(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let drift = (now - cached_at).num_seconds().max(0) as u64;
    self.till_now + drift
  }
}

/// The full set of active timers as reported by the upstream, across all
/// result pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTimers {
  pub timers: Vec<Timer>,
  /// Total reported by the upstream; may exceed `timers.len()` when
  /// malformed entries were skipped at the boundary.
  pub total: u64,
}

/// One fully-replaced cache value for a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
  pub timers: Vec<Timer>,
  /// The moment the upstream fetch resolved, not the write time.
  pub cached_at: DateTime<Utc>,
  pub owner_key: String,
}

/// Result of one sync run, for logging and the trigger's retry policy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
  pub success: bool,
  pub jira_domain: String,
  pub timers_count: u64,
  pub cached_users: usize,
}
