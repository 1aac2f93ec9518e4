// SPDX-License-Identifier: MIT

//! Data models for the sync pipeline.

pub mod activity;
pub mod checkpoint;

pub use activity::{ActivityWindow, SourceActivity};
pub use checkpoint::SyncCheckpoint;
