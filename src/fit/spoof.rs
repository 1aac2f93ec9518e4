// SPDX-License-Identifier: MIT

//! Device identity rewriting.
//!
//! Garmin Connect gates its advanced ride analytics on the recording
//! device, so files from third-party head units are rewritten to present
//! as a Garmin unit before upload. Only file_id, device_info and
//! file_creator messages are touched.

use crate::fit::message::{base_type, kind, FitMessage, FitMessageSet};

/// file_id field numbers.
const FILE_ID_TYPE: u8 = 0;
const FILE_ID_MANUFACTURER: u8 = 1;
const FILE_ID_PRODUCT: u8 = 2;
const FILE_ID_PRODUCT_NAME: u8 = 8;

/// device_info field numbers.
const DEVICE_INFO_MANUFACTURER: u8 = 2;
const DEVICE_INFO_PRODUCT: u8 = 4;
const DEVICE_INFO_SOFTWARE_VERSION: u8 = 5;
const DEVICE_INFO_PRODUCT_NAME: u8 = 27;

/// file_creator field numbers.
const FILE_CREATOR_SOFTWARE_VERSION: u8 = 0;
const FILE_CREATOR_HARDWARE_VERSION: u8 = 1;

/// FIT file type "activity".
const FILE_TYPE_ACTIVITY: u8 = 4;

/// The device identity stamped onto every uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// FIT manufacturer code.
    pub manufacturer: u16,
    /// FIT product code.
    pub product: u16,
    /// device_info software version, raw at the profile's 1/100 scale.
    pub software_version: u16,
    /// file_creator firmware build number.
    pub file_creator_software_version: u16,
    /// file_creator hardware revision.
    pub hardware_version: u8,
}

/// Garmin Edge 830, with firmware recent enough for cycling dynamics and
/// training-load analytics.
pub const GARMIN_EDGE_830: DeviceIdentity = DeviceIdentity {
    manufacturer: 1,
    product: 3122,
    software_version: 975, // 9.75
    file_creator_software_version: 975,
    hardware_version: 255,
};

/// Rewrite device identification in place. Idempotent; a set with no
/// matching messages is left alone (never an error).
pub fn apply(set: &mut FitMessageSet, identity: &DeviceIdentity) {
    for msg in set.messages_of_mut(kind::FILE_ID) {
        msg.set_u8(FILE_ID_TYPE, base_type::ENUM, FILE_TYPE_ACTIVITY);
        msg.set_u16(FILE_ID_MANUFACTURER, identity.manufacturer);
        msg.set_u16(FILE_ID_PRODUCT, identity.product);
        msg.clear_string(FILE_ID_PRODUCT_NAME);
    }

    for msg in set.messages_of_mut(kind::DEVICE_INFO) {
        msg.set_u16(DEVICE_INFO_MANUFACTURER, identity.manufacturer);
        msg.set_u16(DEVICE_INFO_PRODUCT, identity.product);
        msg.set_u16(DEVICE_INFO_SOFTWARE_VERSION, identity.software_version);
        msg.clear_string(DEVICE_INFO_PRODUCT_NAME);
    }

    let creators = set.messages_of_mut(kind::FILE_CREATOR);
    if creators.is_empty() {
        creators.push(FitMessage::new(kind::FILE_CREATOR));
    }
    for msg in creators {
        msg.set_u16(
            FILE_CREATOR_SOFTWARE_VERSION,
            identity.file_creator_software_version,
        );
        msg.set_u8(
            FILE_CREATOR_HARDWARE_VERSION,
            base_type::UINT8,
            identity.hardware_version,
        );
    }
}
