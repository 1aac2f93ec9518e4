// SPDX-License-Identifier: MIT

//! Services module - remote clients and the sync control loop.

pub mod garmin;
pub mod igpsport;
pub mod overlap;
pub mod sync;

pub use garmin::GarminClient;
pub use igpsport::IgpsportClient;
pub use sync::{
    CheckpointStore, RetryPolicy, SourceService, SyncOrchestrator, SyncOutcome, SyncReport,
    TargetService,
};
