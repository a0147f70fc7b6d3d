//! File-backed envelope store.
//!
//! One JSON file under the platform data directory, shared by every
//! session of the profile. Writes go through a temp file and an atomic
//! rename, so concurrent writers settle last-write-wins and readers
//! never see a torn envelope.

use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use dealdesk_session::{CacheEnvelope, SessionStore, StoreError};

const STORE_DIR: &str = "dealdesk";
const STORE_FILE: &str = "session.json";

/// Envelope persistence under `<data dir>/dealdesk/session.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store at the platform default location.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the platform data directory
    /// cannot be determined.
    pub fn new() -> Result<Self, StoreError> {
        let dir = dirs::data_dir().ok_or_else(|| StoreError::Io("no data directory".into()))?;
        Ok(Self::at_path(dir.join(STORE_DIR).join(STORE_FILE)))
    }

    /// Store at an explicit path. Parent directories are created on the
    /// first save.
    #[must_use]
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set_permissions(path: &Path, mode: u32) -> Result<(), StoreError> {
        #[cfg(unix)]
        {
            let perms = fs::Permissions::from_mode(mode);
            fs::set_permissions(path, perms).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
        }
        Ok(())
    }

    fn ensure_parent(&self) -> Result<&Path, StoreError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| StoreError::Io("missing parent directory".into()))?;
        fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        Self::set_permissions(parent, 0o700)?;
        Ok(parent)
    }

    fn write_private_file(&self, contents: &[u8]) -> Result<(), StoreError> {
        let parent = self.ensure_parent()?;

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        temp.write_all(contents)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        #[cfg(unix)]
        {
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        temp.persist(&self.path)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Self::set_permissions(&self.path, 0o600)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<CacheEnvelope> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<CacheEnvelope>(&content) {
            Ok(envelope) if envelope.ver == CacheEnvelope::CURRENT_VERSION => Some(envelope),
            Ok(envelope) => {
                tracing::debug!(ver = envelope.ver, "discarding envelope with stale schema");
                None
            }
            Err(err) => {
                tracing::warn!(%err, "corrupt session envelope, treating as absent");
                None
            }
        }
    }

    fn save(&self, envelope: &CacheEnvelope) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(envelope)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.write_private_file(content.as_bytes())
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(%err, "failed to delete session envelope"),
        }
    }
}
