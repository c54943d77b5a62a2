use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bump when the layout changes; load rejects anything else.
pub const SESSION_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write session file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session file '{path}': {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported session version {found} (expected {SESSION_VERSION})")]
    UnsupportedVersion { found: u32 },
}

/// Enough state to resume an interrupted scan: per-target pending
/// sub-scan prefixes and progress counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFile {
    pub version: u32,
    pub created_at: u64,
    pub targets: Vec<TargetSession>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetSession {
    pub base_url: String,
    pub pending: Vec<PendingPrefix>,
    pub requests: u64,
    pub kept: u64,
    pub filtered: u64,
    pub errors: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingPrefix {
    pub prefix: String,
    pub depth: usize,
}

impl SessionFile {
    pub fn new(targets: Vec<TargetSession>) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: SESSION_VERSION,
            created_at,
            targets,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| SessionError::Malformed {
            path: path.display().to_string(),
            source: e,
        })?;
        std::fs::write(path, text).map_err(|e| SessionError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path).map_err(|e| SessionError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let session: SessionFile =
            serde_json::from_str(&text).map_err(|e| SessionError::Malformed {
                path: path.display().to_string(),
                source: e,
            })?;
        if session.version != SESSION_VERSION {
            return Err(SessionError::UnsupportedVersion {
                found: session.version,
            });
        }
        Ok(session)
    }
}
