// SPDX-License-Identifier: MIT

//! Time-window overlap detection between the two activity catalogs.
//!
//! iGPSport and Garmin disagree about start times by up to a few minutes
//! (device clock skew, GPS fix delay), so each existing window is padded by
//! a buffer before comparison. The buffer is a policy constant, not derived
//! from either API.

use crate::models::ActivityWindow;
use chrono::Duration;

/// Padding applied to each existing window on both ends (5 minutes).
pub fn default_overlap_buffer() -> Duration {
    Duration::minutes(5)
}

/// Whether a candidate window intersects one existing window, with the
/// existing window expanded by `buffer` on both ends. Inclusive at the
/// exact buffer edge: touching counts as overlap.
pub fn overlaps(candidate: &ActivityWindow, existing: &ActivityWindow, buffer: Duration) -> bool {
    candidate.start <= existing.end + buffer && candidate.end >= existing.start - buffer
}

/// Whether any existing window makes the candidate a duplicate.
pub fn is_duplicate(
    candidate: &ActivityWindow,
    existing: &[ActivityWindow],
    buffer: Duration,
) -> bool {
    existing.iter().any(|w| overlaps(candidate, w, buffer))
}
