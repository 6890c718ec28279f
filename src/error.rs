//! Error taxonomy for the sync pipeline.
//!
//! Run-fatal errors (credential exchange, timer fetch) abort a sync run and
//! surface to the trigger for its retry policy. Everything else is isolated:
//! identity failures degrade a single owner, cache failures affect a single
//! partition, and invalidation failures are logged and swallowed because the
//! upstream stop already succeeded.

use thiserror::Error;

/// Failure to exchange a Jira session cookie for a Clockwork JWT.
#[derive(Debug, Error)]
pub enum CredentialExchangeError {
  /// The servlet answered with a non-success status; the session cookie is
  /// expired or rejected.
  #[error("token exchange rejected by {domain} ({status}): {body}")]
  Rejected {
    domain: String,
    status: u16,
    body: String,
  },

  /// The servlet answered 2xx but the payload carried no token.
  #[error("contextJwt missing from servlet response ({detail})")]
  MissingToken { detail: String },

  #[error("token exchange transport failure: {0}")]
  Transport(#[from] reqwest::Error),
}

/// Non-success response or transport failure from the Clockwork Report API.
#[derive(Debug, Error)]
pub enum UpstreamFetchError {
  #[error("Clockwork Report API returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Clockwork Report API transport failure: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("malformed Clockwork Report payload: {0}")]
  Decode(#[from] serde_json::Error),
}

/// Failure to resolve identities via the Jira directory. Never fatal for a
/// run; the affected owners degrade to partial or missing records.
#[derive(Debug, Error)]
pub enum IdentityResolutionError {
  #[error("Jira user API returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Jira user API transport failure: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("malformed Jira user payload: {0}")]
  Decode(#[from] serde_json::Error),
}

/// Cache store failure. Writes are isolated per partition, reads surface as
/// "no data" at the edges, and the invalidation path logs these without
/// escalating.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache store error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("cache store io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("cache serialization error: {0}")]
  Serde(#[from] serde_json::Error),

  #[error("cache store lock poisoned")]
  Poisoned,
}

/// Run-fatal composition: only the credential exchange and the timer fetch
/// abort a sync run. Identity and cache-write failures never appear here.
#[derive(Debug, Error)]
pub enum SyncError {
  #[error(transparent)]
  Credential(#[from] CredentialExchangeError),

  #[error(transparent)]
  Fetch(#[from] UpstreamFetchError),
}

/// Failure to stop a timer upstream. Cache invalidation afterwards is best
/// effort and never produces this.
#[derive(Debug, Error)]
pub enum StopTimerError {
  #[error(transparent)]
  Credential(#[from] CredentialExchangeError),

  #[error(transparent)]
  Upstream(#[from] UpstreamFetchError),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fetch_error_carries_status_and_body() {
    let err = UpstreamFetchError::Status {
      status: 503,
      body: "maintenance".to_string(),
    };
    assert_eq!(
      err.to_string(),
      "Clockwork Report API returned 503: maintenance"
    );
  }

  #[test]
  fn sync_error_is_transparent_over_the_cause() {
    let err = SyncError::Credential(CredentialExchangeError::MissingToken {
      detail: "keys: ok, license".to_string(),
    });
    assert_eq!(
      err.to_string(),
      "contextJwt missing from servlet response (keys: ok, license)"
    );
  }
}
