//! Watchlist and selection persistence.

use crate::data::Interval;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub active: Option<ActivePair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePair {
    pub symbol: String,
    pub interval: Interval,
}

pub trait SessionStore: Send {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SessionState>>;

    fn save(&mut self, state: &SessionState) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Option<SessionState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SessionState) -> Self {
        Self { state: Some(state) }
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<SessionState>> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &SessionState) -> Result<()> {
        self.state = Some(state.clone());
        Ok(())
    }
}

/// Pretty-printed JSON file. Writes go through a sibling temp file and a
/// rename so a crash never leaves a truncated session behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Option<SessionState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse session file {}", self.path.display()))?;
        Ok(Some(state))
    }

    fn save(&mut self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string_pretty(state).context("Failed to serialize session")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Session saved to {}", self.path.display());
        Ok(())
    }
}
