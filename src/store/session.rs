// SPDX-License-Identifier: MIT

//! Cached remote sessions, one opaque blob per service name.
//!
//! Garmin throttles fresh SSO logins aggressively, so the OAuth token from
//! a successful login is persisted between scheduled runs.

use std::io;
use std::path::{Path, PathBuf};

/// Directory-backed session cache keyed by service name.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn blob_path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}.json", service))
    }

    /// Load the cached blob for a service, if one exists.
    pub fn load(&self, service: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.blob_path(service)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist a service's session blob, creating the directory on demand.
    pub fn save(&self, service: &str, blob: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.blob_path(service), blob)
    }

    /// Drop a cached session (e.g. after the remote rejects it).
    pub fn clear(&self, service: &str) -> io::Result<()> {
        match std::fs::remove_file(self.blob_path(service)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!(
            "igpsync-session-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        SessionStore::new(dir)
    }

    #[test]
    fn test_load_missing_is_none() {
        let store = temp_store("missing");
        assert_eq!(store.load("garmin").unwrap(), None);
    }

    #[test]
    fn test_save_load_clear_round_trip() {
        let store = temp_store("roundtrip");
        store.save("garmin", r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(
            store.load("garmin").unwrap().as_deref(),
            Some(r#"{"access_token":"abc"}"#)
        );
        // Other services are independent
        assert_eq!(store.load("igpsport").unwrap(), None);

        store.clear("garmin").unwrap();
        assert_eq!(store.load("garmin").unwrap(), None);
        // Clearing twice is fine
        store.clear("garmin").unwrap();
    }
}
