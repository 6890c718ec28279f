//! Cookie-to-token exchange against the Jira servlet.
//!
//! The servlet turns a Jira browser-session cookie into a short-lived
//! Clockwork JWT. Tokens are never cached across runs: each sync run
//! re-exchanges, trading a little latency for never tracking token expiry.

use reqwest::header;

use crate::clockwork::api_types::ServletTokenResponse;
use crate::error::CredentialExchangeError;

/// The servlet ignores the project parameters for the JSON classifier, but
/// rejects requests without them.
const SERVLET_PATH: &str =
  "/plugins/servlet/ac/clockwork-cloud/clockwork-timers?classifier=json&project.id=10001&project.key=KAN";

/// The servlet also rejects non-browser user agents.
const BROWSER_USER_AGENT: &str =
  "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Exchange a Jira session cookie for a Clockwork JWT.
pub async fn exchange_session_cookie(
  http: &reqwest::Client,
  domain: &str,
  cookie: &str,
) -> Result<String, CredentialExchangeError> {
  let url = format!("https://{domain}{SERVLET_PATH}");

  let res = http
    .post(&url)
    .header(header::COOKIE, cookie)
    .header(header::CONTENT_TYPE, "application/json")
    .header(header::USER_AGENT, BROWSER_USER_AGENT)
    .send()
    .await?;

  let status = res.status();
  let body = res.text().await?;

  if !status.is_success() {
    return Err(CredentialExchangeError::Rejected {
      domain: domain.to_string(),
      status: status.as_u16(),
      body,
    });
  }

  // An expired session often comes back as a 200 HTML login page, so a
  // non-JSON body is a missing token, not a transport failure.
  let parsed: ServletTokenResponse = serde_json::from_str(&body)
    .map_err(|_| CredentialExchangeError::MissingToken {
      detail: "non-JSON response".to_string(),
    })?;

  match parsed.context_jwt {
    Some(jwt) if !jwt.is_empty() => Ok(jwt),
    _ => Err(CredentialExchangeError::MissingToken {
      detail: format!(
        "keys: {}",
        parsed
          .extra
          .keys()
          .cloned()
          .collect::<Vec<_>>()
          .join(", ")
      ),
    }),
  }
}
