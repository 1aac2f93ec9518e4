// SPDX-License-Identifier: MIT

//! FIT activity-file handling: decode, device spoofing, re-encode.

pub mod codec;
pub mod crc;
pub mod message;
pub mod spoof;

pub use codec::{decode, encode, DecodeError};
pub use message::{FitMessage, FitMessageSet};
pub use spoof::{DeviceIdentity, GARMIN_EDGE_830};

use std::path::Path;

/// Errors from in-place file spoofing.
#[derive(Debug, thiserror::Error)]
pub enum FitFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Spoof a FIT file on disk in place.
///
/// The original content is read fully and only overwritten once the decode
/// has succeeded, so a corrupt input file is left untouched.
pub fn spoof_file<P: AsRef<Path>>(path: P, identity: &DeviceIdentity) -> Result<(), FitFileError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mut set = decode(&bytes)?;
    spoof::apply(&mut set, identity);
    std::fs::write(path, encode(&set))?;
    Ok(())
}
