use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::history::HistoryPoint;

/// Durable mirror of the sampler state. The live snapshot is not saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub history: Vec<HistoryPoint>,
    #[serde(rename = "lastValidOnline", default)]
    pub last_valid_online: BTreeMap<String, Option<u32>>,
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the saved state. A missing, unreadable or corrupt file yields an
    /// empty state.
    pub async fn load(&self) -> PersistedState {
        match self.try_load().await {
            Ok(Some(state)) => {
                info!(
                    "restored {} history points from {}",
                    state.history.len(),
                    self.path.display()
                );
                state
            }
            Ok(None) => {
                info!("no state file at {}, starting empty", self.path.display());
                PersistedState::default()
            }
            Err(err) => {
                warn!("ignoring unusable state file: {err}");
                PersistedState::default()
            }
        }
    }

    async fn try_load(&self) -> Result<Option<PersistedState>, PersistError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replaces the file wholesale. The state is written to a sibling file
    /// first and renamed into place, so readers never see a partial write.
    pub async fn save(&self, state: &PersistedState) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec(state)?;
        let tmp_path = self.tmp_path();

        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| self.io_error(source))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
