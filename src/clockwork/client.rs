//! Clockwork Report API client: active-timer listing and timer stop.

use async_trait::async_trait;
use reqwest::header;
use tracing::{debug, warn};

use crate::clockwork::api_types::{extract_stop_error, RawTimer, RawTimersPage};
use crate::clockwork::token;
use crate::error::{CredentialExchangeError, UpstreamFetchError};
use crate::sync::pipeline::TimerProvider;
use crate::types::ActiveTimers;

pub const REPORT_BASE: &str = "https://app.clockwork.report";

/// Client for the Clockwork Report API. Authenticates every call with a JWT
/// obtained through the Jira servlet exchange.
#[derive(Clone)]
pub struct ReportClient {
  http: reqwest::Client,
  session_cookie: String,
}

impl ReportClient {
  pub fn new(http: reqwest::Client, session_cookie: String) -> Self {
    Self {
      http,
      session_cookie,
    }
  }

  async fn timers_page(
    &self,
    token: &str,
    domain: &str,
    page: u32,
  ) -> Result<RawTimersPage, UpstreamFetchError> {
    let url = format!("{REPORT_BASE}/timers.json");

    let res = self
      .http
      .get(&url)
      .query(&[
        ("page", page.to_string()),
        ("xdm_e", format!("https://{domain}")),
      ])
      .header(header::AUTHORIZATION, format!("JWT {token}"))
      .header(header::ACCEPT, "application/json")
      .send()
      .await?;

    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
      return Err(UpstreamFetchError::Status {
        status: status.as_u16(),
        body,
      });
    }

    Ok(serde_json::from_str(&body)?)
  }
}

#[async_trait]
impl TimerProvider for ReportClient {
  async fn acquire_token(&self, domain: &str) -> Result<String, CredentialExchangeError> {
    token::exchange_session_cookie(&self.http, domain, &self.session_cookie).await
  }

  /// Fetch every page of currently-active timers.
  ///
  /// Pages until the API flags the last page or the fetched count reaches
  /// the reported total. Stopping earlier would serve an incomplete global
  /// snapshot to every consumer.
  async fn active_timers(
    &self,
    token: &str,
    domain: &str,
  ) -> Result<ActiveTimers, UpstreamFetchError> {
    let mut timers = Vec::new();
    let mut fetched = 0u64;
    let mut page = 1u32;

    loop {
      let raw = self.timers_page(token, domain, page).await?;
      let total = raw.total;
      let page_len = raw.timers.len() as u64;
      debug!(page = raw.page, count = page_len, total, "fetched timer page");

      for value in raw.timers {
        match serde_json::from_value::<RawTimer>(value) {
          Ok(timer) => timers.push(timer.into_domain()),
          Err(err) => warn!(page, error = %err, "skipping malformed timer entry"),
        }
      }
      fetched += page_len;

      if raw.is_last || fetched >= total || page_len == 0 {
        return Ok(ActiveTimers { timers, total });
      }
      page += 1;
    }
  }

  /// Stop a running timer. The worklog payload mirrors what the Clockwork
  /// web UI sends for a plain stop.
  async fn stop_timer(
    &self,
    token: &str,
    domain: &str,
    timer_id: u64,
  ) -> Result<(), UpstreamFetchError> {
    let url = format!("{REPORT_BASE}/timers/{timer_id}/stop.json");

    let res = self
      .http
      .post(&url)
      .query(&[("xdm_e", format!("https://{domain}"))])
      .header(header::AUTHORIZATION, format!("JWT {token}"))
      .header(header::ACCEPT, "application/json, text/plain, */*")
      .header(header::ORIGIN, REPORT_BASE)
      .json(&serde_json::json!({
        "worklog": {
          "comment": null,
          "started": null,
          "time_spent_seconds": null,
          "attributes": null
        }
      }))
      .send()
      .await?;

    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
      let fallback = format!("stop timer failed ({})", status.as_u16());
      return Err(UpstreamFetchError::Status {
        status: status.as_u16(),
        body: extract_stop_error(&body, &fallback),
      });
    }

    Ok(())
  }
}
