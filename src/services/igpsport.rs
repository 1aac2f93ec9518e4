// SPDX-License-Identifier: MIT

//! iGPSport web API client.
//!
//! Handles:
//! - Username/password login for a bearer token
//! - Paged activity listing (newest first)
//! - Per-activity detail (precise start time and duration)
//! - FIT file download from the returned OSS URL
//!
//! Every endpoint wraps its payload in `{code, message, data}`; code 0 is
//! success.

use crate::error::{Result, SyncError};
use crate::models::SourceActivity;
use crate::services::sync::SourceService;
use crate::time_utils::parse_activity_timestamp;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

const BASE_URL: &str = "https://prod.zh.igpsport.com/service";
const PAGE_SIZE: u32 = 20;
/// Listing stops after this many pages; a scheduled job never falls this
/// far behind.
const MAX_PAGES: u32 = 10;

/// Authenticated iGPSport API client.
pub struct IgpsportClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl IgpsportClient {
    /// Log in and return an authenticated client.
    pub async fn login(username: &str, password: &str) -> Result<Self> {
        Self::login_at(BASE_URL.to_string(), username, password).await
    }

    async fn login_at(base_url: String, username: &str, password: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let url = format!("{}/auth/account/login", base_url);
        let body = serde_json::json!({
            "username": username,
            "password": password,
            "appId": "igpsport-web",
        });

        let response = http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("iGPSport login request: {}", e)))?;

        if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            return Err(SyncError::Auth("iGPSport rejected credentials".to_string()));
        }

        let envelope: Envelope<LoginData> = parse_envelope(response).await?;
        let message = envelope.message_or("iGPSport login failed");
        let data = envelope.data.ok_or(SyncError::Auth(message))?;

        tracing::info!("Logged in to iGPSport");
        Ok(Self {
            http,
            base_url,
            token: data.access_token,
        })
    }

    /// One page of the activity list, newest first.
    async fn activity_page(&self, page_no: u32) -> Result<Vec<ActivityRow>> {
        let url = format!(
            "{}/web-gateway/web-analyze/activity/queryMyActivity",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("pageNo", page_no.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
                ("reqType", "0".to_string()),
                ("sort", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("iGPSport activity list: {}", e)))?;

        let envelope: Envelope<ActivityPage> = parse_envelope(response).await?;
        Ok(envelope.data.map(|d| d.rows).unwrap_or_default())
    }

    /// Detail for one ride: precise start time and total elapsed seconds.
    async fn activity_detail(&self, ride_id: u64) -> Result<ActivityDetail> {
        let url = format!(
            "{}/web-gateway/web-analyze/activity/queryActivityDetail/{}",
            self.base_url, ride_id
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("iGPSport activity detail: {}", e)))?;

        let envelope: Envelope<ActivityDetail> = parse_envelope(response).await?;
        let message = envelope.message_or("empty activity detail response");
        envelope.data.ok_or(SyncError::Network(message))
    }
}

impl SourceService for IgpsportClient {
    /// List activities with start time after `since`, walking pages until
    /// an older row shows up (the list is newest-first).
    async fn list_activities(&self, since: DateTime<Utc>) -> Result<Vec<SourceActivity>> {
        let mut result = Vec::new();

        'pages: for page_no in 1..=MAX_PAGES {
            let rows = self.activity_page(page_no).await?;
            if rows.is_empty() {
                break;
            }

            for row in rows {
                // List rows carry a date-only start time; compare at day
                // granularity and let the detail call refine it.
                let Some(row_start) = parse_activity_timestamp(&row.start_time) else {
                    tracing::warn!(ride_id = row.ride_id, start_time = %row.start_time,
                        "Unparseable start time in activity list, skipping row");
                    continue;
                };
                if row_start.date_naive() < since.date_naive() {
                    break 'pages;
                }

                let detail = self.activity_detail(row.ride_id).await?;
                let Some(start) = parse_activity_timestamp(&detail.start_time) else {
                    tracing::warn!(ride_id = row.ride_id,
                        "Unparseable start time in activity detail, skipping");
                    continue;
                };
                if start <= since {
                    continue;
                }

                let fit_url = match row.fit_oss_path {
                    Some(url) if !url.is_empty() => url,
                    _ => {
                        tracing::warn!(ride_id = row.ride_id, "Activity has no FIT file, skipping");
                        continue;
                    }
                };

                result.push(SourceActivity {
                    id: row.ride_id,
                    start,
                    end: start + Duration::seconds(detail.total_time),
                    fit_url,
                });
            }
        }

        Ok(result)
    }

    /// Download the recorded FIT file. The OSS URL is pre-signed; no auth
    /// header is needed.
    async fn download_fit(&self, activity: &SourceActivity) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(&activity.fit_url)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("FIT download: {}", e)))?;

        if !response.status().is_success() {
            return Err(SyncError::Network(format!(
                "FIT download for ride {} failed: HTTP {}",
                activity.id,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("FIT download body: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Standard iGPSport response wrapper.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i32,
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn message_or(&self, fallback: &str) -> String {
        self.message.clone().unwrap_or_else(|| fallback.to_string())
    }
}

async fn parse_envelope<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<Envelope<T>> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Network(format!("HTTP {}: {}", status, body)));
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| SyncError::Network(format!("JSON parse error: {}", e)))?;

    if envelope.code != 0 {
        return Err(SyncError::Network(format!(
            "iGPSport API error {}: {}",
            envelope.code,
            envelope.message_or("unknown"),
        )));
    }
    Ok(envelope)
}

#[derive(Debug, Deserialize)]
struct LoginData {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ActivityPage {
    #[serde(default)]
    rows: Vec<ActivityRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRow {
    ride_id: u64,
    /// Dotted date in list rows ("2024.11.20")
    start_time: String,
    fit_oss_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDetail {
    start_time: String,
    /// Total elapsed time in seconds
    #[serde(default)]
    total_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_success_payload() {
        let json = r#"{"code":0,"message":null,"data":{"access_token":"tok123"}}"#;
        let envelope: Envelope<LoginData> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.code, 0);
        assert_eq!(envelope.data.unwrap().access_token, "tok123");
    }

    #[test]
    fn test_activity_row_field_mapping() {
        let json = r#"{
            "rideId": 987654,
            "startTime": "2024.11.20",
            "fitOssPath": "https://oss.example.com/ride.fit",
            "totalDistance": 42195
        }"#;
        let row: ActivityRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.ride_id, 987654);
        assert_eq!(row.start_time, "2024.11.20");
        assert_eq!(
            row.fit_oss_path.as_deref(),
            Some("https://oss.example.com/ride.fit")
        );
    }

    #[test]
    fn test_activity_detail_defaults_missing_duration() {
        let json = r#"{"startTime": "2024-11-20T09:30:00"}"#;
        let detail: ActivityDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.total_time, 0);
    }
}
