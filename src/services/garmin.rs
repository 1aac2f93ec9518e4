// SPDX-License-Identifier: MIT

//! Garmin Connect client.
//!
//! Handles:
//! - SSO username/password login (ticket exchange for an OAuth bearer token)
//! - Session persistence so scheduled runs skip the rate-limited SSO flow
//! - Recent-activity listing for overlap filtering
//! - Multipart FIT upload
//!
//! Accounts with multi-factor authentication are not supported: the SSO
//! flow fails with an `Auth` error instead of prompting.

use crate::error::{Result, SyncError};
use crate::models::ActivityWindow;
use crate::services::sync::TargetService;
use crate::store::SessionStore;
use crate::time_utils::parse_activity_timestamp;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const SESSION_KEY: &str = "garmin";
/// How many recent Garmin activities to fetch for dedup. Generously more
/// than one scheduled interval can produce.
const LIST_LIMIT: u32 = 50;
/// Margin before token expiry when a cached session is considered stale.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 5 * 60;

/// Authenticated Garmin Connect client.
pub struct GarminClient {
    http: reqwest::Client,
    /// "garmin.com", or "garmin.cn" for the China region
    domain: String,
    sessions: SessionStore,
    token: String,
}

impl GarminClient {
    /// Authenticate, reusing a cached session when one is still valid.
    pub async fn authenticate(
        email: &str,
        password: &str,
        domain: &str,
        sessions: SessionStore,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent("com.garmin.android.apps.connectmobile")
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if let Some(token) = load_cached_token(&sessions) {
            tracing::info!("Reusing cached Garmin session");
            return Ok(Self {
                http,
                domain: domain.to_string(),
                sessions,
                token,
            });
        }

        let token = sso_login(&http, email, password, domain).await?;

        let cached = CachedSession {
            access_token: token.clone(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        if let Ok(blob) = serde_json::to_string(&cached) {
            if let Err(e) = sessions.save(SESSION_KEY, &blob) {
                tracing::warn!(error = %e, "Failed to persist Garmin session");
            }
        }

        tracing::info!("Authenticated with Garmin Connect");
        Ok(Self {
            http,
            domain: domain.to_string(),
            sessions,
            token,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("https://connectapi.{}{}", self.domain, path)
    }

    /// Drop the cached session after the API rejects the token.
    fn invalidate_session(&self) {
        if let Err(e) = self.sessions.clear(SESSION_KEY) {
            tracing::warn!(error = %e, "Failed to clear Garmin session cache");
        }
    }
}

impl TargetService for GarminClient {
    /// Recent Garmin activities as time windows, filtered to those ending
    /// after `since`.
    async fn list_windows(&self, since: DateTime<Utc>) -> Result<Vec<ActivityWindow>> {
        let url = self.api_url("/activitylist-service/activities/search/activities");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("start", 0u32), ("limit", LIST_LIMIT)])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("Garmin activity list: {}", e)))?;

        if response.status().as_u16() == 401 {
            self.invalidate_session();
            return Err(SyncError::Auth("Garmin session expired".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("HTTP {}: {}", status, body)));
        }

        let activities: Vec<GarminActivity> = response
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("JSON parse error: {}", e)))?;

        let mut windows = Vec::new();
        for activity in activities {
            let Some(start) = parse_activity_timestamp(&activity.start_time_gmt) else {
                tracing::warn!(start_time = %activity.start_time_gmt,
                    "Unparseable Garmin activity start time, skipping window");
                continue;
            };
            let end = start + Duration::seconds(activity.duration.unwrap_or(0.0) as i64);
            if end < since {
                continue;
            }
            windows.push(ActivityWindow::new(start, end, "garmin"));
        }
        Ok(windows)
    }

    /// Upload a spoofed FIT file via the upload service.
    async fn upload_fit(&self, fit_data: Vec<u8>) -> Result<()> {
        let url = self.api_url("/upload-service/upload/.fit");
        let part = reqwest::multipart::Part::bytes(fit_data)
            .file_name("activity.fit")
            .mime_str("application/octet-stream")
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("multipart: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("Garmin upload: {}", e)))?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => Ok(()),
            401 => {
                self.invalidate_session();
                Err(SyncError::Auth("Garmin session expired".to_string()))
            }
            // Garmin answers 409 when it recognizes the file as already
            // uploaded; that is success for our purposes.
            409 => {
                tracing::info!("Garmin reports file already uploaded");
                Ok(())
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SyncError::UploadRejected(format!(
                    "HTTP {}: {}",
                    status, body
                )))
            }
        }
    }
}

/// Run the SSO flow: submit credentials, extract the service ticket, and
/// exchange it for an OAuth bearer token.
async fn sso_login(
    http: &reqwest::Client,
    email: &str,
    password: &str,
    domain: &str,
) -> Result<String> {
    let sso_url = format!("https://sso.{}/sso/signin", domain);
    let embed_url = format!("https://sso.{}/sso/embed", domain);

    // Prime the SSO cookies.
    http.get(&sso_url)
        .query(&[
            ("id", "gauth-widget"),
            ("embedWidget", "true"),
            ("gauthHost", embed_url.as_str()),
        ])
        .send()
        .await
        .map_err(|e| SyncError::Network(format!("Garmin SSO init: {}", e)))?;

    let response = http
        .post(&sso_url)
        .query(&[
            ("id", "gauth-widget"),
            ("embedWidget", "true"),
            ("gauthHost", embed_url.as_str()),
        ])
        .form(&[
            ("username", email),
            ("password", password),
            ("embed", "true"),
        ])
        .send()
        .await
        .map_err(|e| SyncError::Network(format!("Garmin SSO login: {}", e)))?;

    let status = response.status();
    let page = response
        .text()
        .await
        .map_err(|e| SyncError::Network(format!("Garmin SSO response: {}", e)))?;

    if status.as_u16() == 429 {
        return Err(SyncError::Network("Garmin SSO rate limited".to_string()));
    }
    if page.contains("MFA") || page.contains("mfa-setup") {
        return Err(SyncError::Auth(
            "Garmin accounts with multi-factor authentication are not supported".to_string(),
        ));
    }

    let ticket = extract_ticket(&page).ok_or_else(|| {
        SyncError::Auth("Garmin rejected credentials (no service ticket in response)".to_string())
    })?;

    // Exchange the ticket for an OAuth bearer token.
    let exchange_url = format!(
        "https://connectapi.{}/oauth-service/oauth/exchange/user/2.0",
        domain
    );
    let response = http
        .post(&exchange_url)
        .form(&[("ticket", ticket)])
        .send()
        .await
        .map_err(|e| SyncError::Network(format!("Garmin token exchange: {}", e)))?;

    if !response.status().is_success() {
        return Err(SyncError::Auth(format!(
            "Garmin token exchange failed: HTTP {}",
            response.status()
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| SyncError::Network(format!("Garmin token parse: {}", e)))?;
    Ok(token.access_token)
}

/// Pull the service ticket out of the login response page.
fn extract_ticket(page: &str) -> Option<&str> {
    let start = page.find("ticket=")? + "ticket=".len();
    let rest = &page[start..];
    let end = rest
        .find(|c: char| c == '"' || c == '\'' || c == '&' || c == ')')
        .unwrap_or(rest.len());
    let ticket = &rest[..end];
    (!ticket.is_empty()).then_some(ticket)
}

/// Read a cached token if it is still comfortably unexpired.
fn load_cached_token(sessions: &SessionStore) -> Option<String> {
    let blob = sessions.load(SESSION_KEY).ok()??;
    let cached: CachedSession = serde_json::from_str(&blob).ok()?;
    let margin = Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS);
    (Utc::now() + margin < cached.expires_at).then_some(cached.access_token)
}

/// Session blob persisted between runs.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Activity summary from the Garmin list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminActivity {
    #[serde(rename = "startTimeGMT")]
    start_time_gmt: String,
    /// Elapsed seconds
    duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ticket_from_embed_url() {
        let page = r#"var response_url = "https://connect.garmin.com/modern?ticket=ST-012345-abcdef-cas";"#;
        assert_eq!(extract_ticket(page), Some("ST-012345-abcdef-cas"));
    }

    #[test]
    fn test_extract_ticket_missing() {
        assert_eq!(extract_ticket("<html>locked out</html>"), None);
        assert_eq!(extract_ticket("ticket="), None);
    }

    #[test]
    fn test_garmin_activity_deserializes_list_payload() {
        let json = r#"{
            "activityId": 123,
            "startTimeGMT": "2024-11-20 01:30:00",
            "duration": 3600.5
        }"#;
        let activity: GarminActivity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.start_time_gmt, "2024-11-20 01:30:00");
        assert_eq!(activity.duration, Some(3600.5));
    }

    #[test]
    fn test_cached_session_round_trip() {
        let session = CachedSession {
            access_token: "tok".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let blob = serde_json::to_string(&session).unwrap();
        let back: CachedSession = serde_json::from_str(&blob).unwrap();
        assert_eq!(back.access_token, "tok");
    }
}
