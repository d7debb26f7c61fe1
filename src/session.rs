use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::models::Session;

/// Raw persistence for the session blob.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>, SessionError>;
    fn save(&self, blob: &str) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// Stores the session as a JSON file in the data directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn save(&self, blob: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, blob)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    blob: Mutex<Option<String>>,
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>, SessionError> {
        Ok(self.blob.lock().map(|b| b.clone()).unwrap_or_default())
    }

    fn save(&self, blob: &str) -> Result<(), SessionError> {
        if let Ok(mut guard) = self.blob.lock() {
            *guard = Some(blob.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        if let Ok(mut guard) = self.blob.lock() {
            *guard = None;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Changed(Session),
    Cleared,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("token must have three dot-separated segments, found {0}")]
    Segments(usize),

    #[error("token payload is not valid base64 JSON")]
    Payload,

    #[error("token expired at {0}")]
    Expired(i64),
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Checks the JWT shape and its `exp` claim against `now` (unix seconds).
/// The signature is not verified; the backend does that.
pub fn validate_token(token: &str, now: i64) -> Result<(), TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Segments(parts.len()));
    }

    let payload = parts[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD.decode(parts[1]))
        .map_err(|_| TokenError::Payload)?;
    let claims: Claims = serde_json::from_slice(&bytes).map_err(|_| TokenError::Payload)?;

    match claims.exp {
        Some(exp) if exp < now => Err(TokenError::Expired(exp)),
        _ => Ok(()),
    }
}

/// Persisted login session with change notifications.
pub struct SessionStore {
    storage: Box<dyn SessionStorage>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            storage: Box::new(storage),
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::default())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn set_user(&self, session: &Session) -> Result<(), SessionError> {
        let blob = serde_json::to_string(session)?;
        self.storage.save(&blob)?;
        debug!(user = %session.user.username, "session stored");
        // No receivers is fine.
        let _ = self.events.send(SessionEvent::Changed(session.clone()));
        Ok(())
    }

    pub fn get_user(&self) -> Option<Session> {
        let blob = match self.storage.load() {
            Ok(blob) => blob?,
            Err(e) => {
                warn!(error = %e, "failed to read session");
                return None;
            }
        };
        match serde_json::from_str(&blob) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(error = %e, "ignoring unreadable session");
                None
            }
        }
    }

    pub fn auth_token(&self) -> Option<String> {
        self.get_user().map(|s| s.access_token)
    }

    pub fn is_logged_in(&self) -> bool {
        let Some(token) = self.auth_token() else {
            return false;
        };

        match validate_token(&token, Utc::now().timestamp()) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "dropping invalid session token");
                if let Err(e) = self.clear() {
                    warn!(error = %e, "failed to clear session");
                }
                false
            }
        }
    }

    pub fn logout(&self) -> Result<(), SessionError> {
        self.clear()
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.storage.clear()?;
        let _ = self.events.send(SessionEvent::Cleared);
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
