// SPDX-License-Identifier: MIT

//! igpsync: sync iGPSport cycling activities to Garmin Connect.
//!
//! Downloads FIT activity files from iGPSport, rewrites the
//! device-identification messages so Garmin Connect's advanced analytics
//! accept them, and uploads the result, skipping activities that already
//! exist on Garmin based on time-window overlap.

pub mod config;
pub mod error;
pub mod fit;
pub mod models;
pub mod services;
pub mod store;
pub mod time_utils;
