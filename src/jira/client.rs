//! Jira Cloud user API client.

use async_trait::async_trait;
use reqwest::header;

use crate::error::IdentityResolutionError;
use crate::jira::api_types::RawBulkUsersResponse;
use crate::sync::resolver::UserDirectory;
use crate::types::TimerUser;

/// Upstream page limit for `/user/bulk`.
pub const USER_BULK_CHUNK: usize = 50;

/// Basic-auth client for the Jira Cloud REST API (v3).
#[derive(Clone)]
pub struct DirectoryClient {
  http: reqwest::Client,
  domain: String,
  email: String,
  api_token: String,
}

impl DirectoryClient {
  pub fn new(http: reqwest::Client, domain: String, email: String, api_token: String) -> Self {
    Self {
      http,
      domain,
      email,
      api_token,
    }
  }

  async fn bulk_users_chunk(
    &self,
    account_ids: &[String],
  ) -> Result<Vec<TimerUser>, IdentityResolutionError> {
    let url = format!("https://{}/rest/api/3/user/bulk", self.domain);
    let mut query: Vec<(&str, &str)> = vec![("maxResults", "50")];
    query.extend(account_ids.iter().map(|id| ("accountId", id.as_str())));

    let res = self
      .http
      .get(&url)
      .query(&query)
      .basic_auth(&self.email, Some(&self.api_token))
      .header(header::ACCEPT, "application/json")
      .send()
      .await?;

    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
      return Err(IdentityResolutionError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let parsed: RawBulkUsersResponse = serde_json::from_str(&body)?;
    Ok(parsed.values.into_iter().map(TimerUser::from).collect())
  }
}

#[async_trait]
impl UserDirectory for DirectoryClient {
  /// Resolve a set of accountIds through `/user/bulk`, chunked to the
  /// upstream page limit. One chunk failing fails the whole batch.
  async fn bulk_users(
    &self,
    account_ids: &[String],
  ) -> Result<Vec<TimerUser>, IdentityResolutionError> {
    let mut users = Vec::with_capacity(account_ids.len());
    for chunk in account_ids.chunks(USER_BULK_CHUNK) {
      users.extend(self.bulk_users_chunk(chunk).await?);
    }
    Ok(users)
  }
}
