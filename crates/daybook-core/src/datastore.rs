use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::state::AppState;

/// Owns the on-disk home of the application snapshot. The snapshot is
/// one opaque JSON blob, replaced wholesale on every mutation.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub state_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let state_path = data_dir.join("state.json");

        info!(
            data_dir = %data_dir.display(),
            state = %state_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            state_path,
        })
    }

    /// Load the snapshot; a missing file is an empty state, not an
    /// error, so first launch needs no setup step.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<AppState> {
        if !self.state_path.exists() {
            debug!(file = %self.state_path.display(), "no state file; starting empty");
            return Ok(AppState::default());
        }

        let raw = fs::read_to_string(&self.state_path)
            .with_context(|| format!("failed to read {}", self.state_path.display()))?;
        let state: AppState = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.state_path.display()))?;

        debug!(tasks = state.tasks.len(), "loaded state");
        Ok(state)
    }

    #[tracing::instrument(skip(self, state))]
    pub fn save(&self, state: &AppState) -> anyhow::Result<()> {
        debug!(
            file = %self.state_path.display(),
            tasks = state.tasks.len(),
            "saving state atomically"
        );

        let dir = self
            .state_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        let serialized = serde_json::to_string_pretty(state)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;

        temp.persist(&self.state_path).map_err(|err| {
            anyhow!(
                "failed to persist {}: {}",
                self.state_path.display(),
                err
            )
        })?;

        Ok(())
    }
}
