//! Serde-deserializable types matching the Clockwork servlet and Report API
//! responses.
//!
//! These are separate from domain types so malformed upstream data gets
//! rejected (or skipped) at the boundary instead of flowing inward.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::types::{IssueRef, Timer, TimerUser};

// ============================================================================
// Token exchange servlet
// ============================================================================

/// Servlet response for the cookie-to-token exchange. Everything except
/// `contextJwt` is noise, but the other keys are kept for diagnostics when
/// the token is missing.
#[derive(Debug, Deserialize)]
pub struct ServletTokenResponse {
  #[serde(rename = "contextJwt")]
  pub context_jwt: Option<String>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, serde_json::Value>,
}

// ============================================================================
// Report API: timers.json
// ============================================================================

/// One page of the active-timer listing. Individual timer entries stay raw
/// JSON here; the client converts them one by one so a single malformed
/// entry doesn't poison the whole page.
#[derive(Debug, Deserialize)]
pub struct RawTimersPage {
  #[serde(default)]
  pub timers: Vec<serde_json::Value>,
  #[serde(default)]
  pub total: u64,
  #[serde(rename = "isLast", default)]
  pub is_last: bool,
  #[serde(default)]
  pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct RawIssueRef {
  pub key: String,
  pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct RawTimerAuthor {
  #[serde(rename = "accountId")]
  pub account_id: String,
  #[serde(rename = "displayName", default)]
  pub display_name: Option<String>,
  #[serde(rename = "emailAddress", default)]
  pub email_address: Option<String>,
  #[serde(rename = "avatarUrl", default)]
  pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawTimer {
  pub id: u64,
  pub started_at: String,
  #[serde(default)]
  pub finished_at: Option<String>,
  #[serde(default)]
  pub comment: Option<String>,
  #[serde(default)]
  pub running_for: String,
  pub till_now: u64,
  #[serde(default)]
  pub worklog_count: u32,
  pub issue: RawIssueRef,
  #[serde(default)]
  pub author: Option<RawTimerAuthor>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<RawTimerAuthor> for TimerUser {
  fn from(raw: RawTimerAuthor) -> Self {
    TimerUser {
      account_id: raw.account_id,
      email_address: raw.email_address,
      display_name: raw.display_name,
      avatar_url: raw.avatar_url,
    }
  }
}

impl RawTimer {
  pub fn into_domain(self) -> Timer {
    Timer {
      id: self.id,
      started_at: self.started_at,
      finished_at: self.finished_at,
      comment: self.comment,
      running_for: self.running_for,
      till_now: self.till_now,
      worklog_count: self.worklog_count,
      issue: IssueRef {
        key: self.issue.key,
        id: self.issue.id,
      },
      author: self.author.map(TimerUser::from),
    }
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extract a human-readable error from a stop-timer failure payload.
/// The Report API varies between:
/// - `{"error_message": "..."}`
/// - `{"message": "..."}`
/// - `{"messages": [{"title": "...", "body": "..."}]}`
/// - plain text / empty body
pub fn extract_stop_error(body: &str, fallback: &str) -> String {
  let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
    return fallback.to_string();
  };

  for key in ["error_message", "message"] {
    if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
      if !s.trim().is_empty() {
        return s.to_string();
      }
    }
  }

  if let Some(first) = value
    .get("messages")
    .and_then(|v| v.as_array())
    .and_then(|a| a.first())
  {
    for key in ["body", "title"] {
      if let Some(s) = first.get(key).and_then(|v| v.as_str()) {
        if !s.trim().is_empty() {
          return s.to_string();
        }
      }
    }
  }

  fallback.to_string()
}
