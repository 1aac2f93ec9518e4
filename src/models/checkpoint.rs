// SPDX-License-Identifier: MIT

//! Last-sync checkpoint record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How far back the first run looks when no checkpoint exists.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Persisted watermark marking the boundary between already-synced and
/// not-yet-synced activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub last_sync_date: DateTime<Utc>,
}

impl SyncCheckpoint {
    /// Default window when no checkpoint has ever been written.
    pub fn default_since(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(DEFAULT_LOOKBACK_DAYS)
    }
}
