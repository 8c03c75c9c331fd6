//! # Session Store
//!
//! Persists the logged-in [`Session`] as `session.json` in the client data
//! directory so a restart does not force a new login.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use shared::Session;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

pub const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SESSION_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously saved session, or `None` if nobody is logged in.
    ///
    /// A file that no longer parses is treated as logged out.
    pub fn load(&self) -> Result<Option<Session>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::Session(e.to_string())),
        };

        match serde_json::from_str::<Session>(&contents) {
            Ok(session) => {
                debug!("Restored session for {}", session.user.username);
                Ok(Some(session))
            }
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ClientError::Session(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(session).map_err(|e| ClientError::Session(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| ClientError::Session(e.to_string()))?;
        info!("Saved session for {}", session.user.username);
        Ok(())
    }

    /// Log out. Clearing an absent session is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared session");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Session(e.to_string())),
        }
    }

    /// Keep the stored display name in step with a successful profile edit
    pub fn update_name(&self, name: &str) -> Result<Option<Session>> {
        let Some(mut session) = self.load()? else {
            return Ok(None);
        };
        session.user.name = name.to_string();
        self.save(&session)?;
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Role, User};
    use tempfile::TempDir;

    fn session() -> Session {
        Session {
            user: User {
                id: "U2".to_string(),
                username: "budi".to_string(),
                name: "Budi".to_string(),
                role: Role::Student,
                student_id: Some("101".to_string()),
            },
            token: "token-budi".to_string(),
        }
    }

    fn setup() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("nested"));
        (dir, store)
    }

    #[test]
    fn test_load_without_file_is_logged_out() {
        let (_dir, store) = setup();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = setup();
        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));
        assert!(store.path().ends_with("nested/session.json"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (_dir, store) = setup();
        store.save(&session()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_update_name() {
        let (_dir, store) = setup();
        assert_eq!(store.update_name("Budi Santoso").unwrap(), None);

        store.save(&session()).unwrap();
        let updated = store.update_name("Budi Santoso").unwrap().unwrap();
        assert_eq!(updated.user.name, "Budi Santoso");
        assert_eq!(store.load().unwrap().unwrap().user.name, "Budi Santoso");
        assert_eq!(updated.token, "token-budi");
    }

    #[test]
    fn test_corrupt_file_reads_as_logged_out() {
        let (_dir, store) = setup();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
