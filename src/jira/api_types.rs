//! Serde-deserializable types matching the Jira Cloud user API.

use serde::Deserialize;

use crate::types::TimerUser;

#[derive(Debug, Deserialize)]
pub struct RawAvatarUrls {
  #[serde(rename = "48x48", default)]
  pub x48: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawJiraUser {
  #[serde(rename = "accountId")]
  pub account_id: String,
  // Jira hides emails for privacy-restricted accounts
  #[serde(rename = "emailAddress", default)]
  pub email_address: Option<String>,
  #[serde(rename = "displayName", default)]
  pub display_name: Option<String>,
  #[serde(rename = "avatarUrls", default)]
  pub avatar_urls: Option<RawAvatarUrls>,
}

#[derive(Debug, Deserialize)]
pub struct RawBulkUsersResponse {
  #[serde(default)]
  pub values: Vec<RawJiraUser>,
}

impl From<RawJiraUser> for TimerUser {
  fn from(raw: RawJiraUser) -> Self {
    TimerUser {
      account_id: raw.account_id,
      email_address: raw.email_address,
      display_name: raw.display_name,
      avatar_url: raw.avatar_urls.and_then(|a| a.x48),
    }
  }
}
