use crate::session::data::SessionData;
use crate::session::error::SessionError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct SessionStore {
    pub(crate) path: PathBuf,
}

impl SessionStore {
    /// Create a SessionStore backed by the given JSON file. The parent
    /// directory is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored data. A missing file yields the default (empty) data.
    pub fn load(&self) -> Result<SessionData, SessionError> {
        if !self.path.exists() {
            debug!(path=%self.path.display(), "no session file yet");
            return Ok(SessionData::default());
        }
        let s = fs::read_to_string(&self.path).map_err(SessionError::ReadError)?;
        let data: SessionData = serde_json::from_str(&s).map_err(SessionError::ParseError)?;
        Ok(data)
    }

    pub fn save(&self, data: &SessionData) -> Result<(), SessionError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|e| {
                error!(?e, "Failed to create session directory: {:?}", dir);
                SessionError::CreateDirError(e)
            })?;
        }
        let json_data = serde_json::to_string_pretty(data)?;
        write_private(&self.path, json_data.as_bytes()).map_err(|e| {
            error!(?e, "Failed to write session data to file: {:?}", self.path);
            SessionError::WriteError(e)
        })?;
        Ok(())
    }

    /// Load, apply `f`, save. Returns the updated data.
    pub fn update<F>(&self, f: F) -> Result<SessionData, SessionError>
    where
        F: FnOnce(&mut SessionData),
    {
        let mut data = self.load()?;
        f(&mut data);
        if data.is_empty() {
            self.delete()?;
        } else {
            self.save(&data)?;
        }
        Ok(data)
    }

    pub fn delete(&self) -> Result<(), SessionError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(SessionError::DeleteError)?;
        }
        Ok(())
    }
}

/// Owner-only on unix, also when replacing a file with wider permissions.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path)?;
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    file.sync_all()
}
