// SPDX-License-Identifier: MIT

//! Activity models used for discovery and overlap comparison.

use chrono::{DateTime, Utc};

/// Time window of an activity on either platform, used only for overlap
/// comparison. Constructed fresh each sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Which catalog this window came from ("igpsport", "garmin")
    pub source: &'static str,
}

impl ActivityWindow {
    /// Build a window. `start <= end` is an invariant; a zero-length ride
    /// (start == end) is valid.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, source: &'static str) -> Self {
        debug_assert!(start <= end, "activity window start after end");
        Self { start, end, source }
    }
}

/// A candidate activity discovered on the source platform.
#[derive(Debug, Clone)]
pub struct SourceActivity {
    /// iGPSport ride ID
    pub id: u64,
    /// Precise start time (from the detail endpoint)
    pub start: DateTime<Utc>,
    /// Start plus total elapsed time
    pub end: DateTime<Utc>,
    /// OSS download URL of the recorded FIT file
    pub fit_url: String,
}

impl SourceActivity {
    pub fn window(&self) -> ActivityWindow {
        ActivityWindow::new(self.start, self.end, "igpsport")
    }
}
