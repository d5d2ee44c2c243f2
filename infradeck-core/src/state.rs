//! Per-deployment lifecycle record (`launcher.state`)

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::LifecycleState;

pub const STATE_FILE: &str = "launcher.state";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no state record at {path}")]
    Missing { path: String },
    #[error("failed to access state record {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed state record {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Action that produced a state record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastAction {
    Save,
    Init,
    Apply,
}

impl LastAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LastAction::Save => "save",
            LastAction::Init => "init",
            LastAction::Apply => "apply",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub state: LifecycleState,
    /// UTC, RFC 3339 with second precision
    pub timestamp: String,
    pub last_action: LastAction,
}

impl StateRecord {
    pub fn new(state: LifecycleState, action: LastAction) -> Self {
        Self::at(state, action, Utc::now())
    }

    pub fn at(state: LifecycleState, action: LastAction, when: DateTime<Utc>) -> Self {
        Self {
            state,
            timestamp: when.to_rfc3339_opts(SecondsFormat::Secs, true),
            last_action: action,
        }
    }

    /// Record for `action` reaching `state`, without ever lowering the
    /// state already recorded.
    pub fn advanced(previous: Option<&StateRecord>, state: LifecycleState, action: LastAction) -> Self {
        let state = previous.map_or(state, |p| p.state.max(state));
        Self::new(state, action)
    }

    /// `YYYY-MM-DDTHH:MM` prefix shown in listings
    pub fn short_timestamp(&self) -> String {
        self.timestamp.chars().take(16).collect()
    }

    pub fn load(dir: &Path) -> Result<Self, StateError> {
        let path = dir.join(STATE_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::Missing {
                    path: path.display().to_string(),
                });
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        serde_yaml::from_str(&content).map_err(|source| StateError::Malformed {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load, treating a missing record as absent rather than an error
    pub fn load_optional(dir: &Path) -> Result<Option<Self>, StateError> {
        match Self::load(dir) {
            Ok(record) => Ok(Some(record)),
            Err(StateError::Missing { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn write(&self, dir: &Path) -> Result<(), StateError> {
        let path = dir.join(STATE_FILE);
        let io_err = |source| StateError::Io {
            path: path.display().to_string(),
            source,
        };
        let yaml = serde_yaml::to_string(self).map_err(|source| StateError::Malformed {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(&path, yaml).map_err(io_err)?;
        tracing::info!(dir = %dir.display(), state = %self.state, action = self.last_action.as_str(), "state recorded");
        Ok(())
    }
}

/// Advance the record in `dir` to `state` and persist it
pub fn mark(dir: &Path, state: LifecycleState, action: LastAction) -> Result<StateRecord, StateError> {
    // a malformed record is overwritten
    let previous = StateRecord::load_optional(dir).unwrap_or(None);
    let record = StateRecord::advanced(previous.as_ref(), state, action);
    record.write(dir)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let when = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let record = StateRecord::at(LifecycleState::Ready, LastAction::Save, when);
        assert_eq!(record.timestamp, "2024-03-09T14:05:07Z");
        assert_eq!(record.short_timestamp(), "2024-03-09T14:05");
    }

    #[test]
    fn test_advanced_never_lowers() {
        let deployed = StateRecord::new(LifecycleState::Deployed, LastAction::Apply);
        let next = StateRecord::advanced(Some(&deployed), LifecycleState::Initialized, LastAction::Init);
        assert_eq!(next.state, LifecycleState::Deployed);
        assert_eq!(next.last_action, LastAction::Init);

        let fresh = StateRecord::advanced(None, LifecycleState::Ready, LastAction::Save);
        assert_eq!(fresh.state, LifecycleState::Ready);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let record = StateRecord::new(LifecycleState::Initialized, LastAction::Init);
        record.write(dir.path()).unwrap();

        let text = std::fs::read_to_string(dir.path().join(STATE_FILE)).unwrap();
        assert!(text.contains("state: INITIALIZED"));
        assert!(text.contains("last_action: init"));

        assert_eq!(StateRecord::load(dir.path()).unwrap(), record);
    }

    #[test]
    fn test_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StateRecord::load(dir.path()),
            Err(StateError::Missing { .. })
        ));
        assert!(StateRecord::load_optional(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "state: SIDEWAYS\n").unwrap();
        assert!(matches!(
            StateRecord::load(dir.path()),
            Err(StateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_mark_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        mark(dir.path(), LifecycleState::Deployed, LastAction::Apply).unwrap();
        let record = mark(dir.path(), LifecycleState::Ready, LastAction::Save).unwrap();
        assert_eq!(record.state, LifecycleState::Deployed);
        assert_eq!(StateRecord::load(dir.path()).unwrap().state, LifecycleState::Deployed);
    }
}
