//! Per-agent state persistence: one JSON snapshot file per agent, written
//! atomically via temp file, fsync, and rename.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use specie_protocol::witness::WitnessSnapshot;

// Stage the bytes next to the target, fsync, then rename over it, so a
// crash leaves either the old snapshot or the new one, never a torn file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let staged = path.with_extension("json.tmp");
    let mut file = File::create(&staged)
        .with_context(|| format!("failed to stage {}", staged.display()))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .with_context(|| format!("failed to flush {}", staged.display()))?;
    drop(file);
    fs::rename(&staged, path)
        .with_context(|| format!("failed to publish {}", path.display()))?;
    // Make the rename itself durable.
    if let Some(parent) = path.parent() {
        let _ = File::open(parent).and_then(|dir| dir.sync_all());
    }
    Ok(())
}

/// Writes `agent_<id>.json` snapshots under a base directory.
pub struct AgentStateStore {
    base_dir: PathBuf,
}

impl AgentStateStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("failed to create state dir {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn agent_path(&self, id: usize) -> PathBuf {
        self.base_dir.join(format!("agent_{id}.json"))
    }

    /// Persist one agent's snapshot atomically.
    pub fn save(&self, snapshot: &WitnessSnapshot) -> Result<()> {
        let path = self.agent_path(snapshot.id);
        let data = serde_json::to_string(snapshot)
            .with_context(|| format!("failed to serialize snapshot for agent {}", snapshot.id))?;
        write_atomic(&path, data.as_bytes())?;
        debug!(agent = snapshot.id, path = %path.display(), bytes = data.len(), "agent state saved");
        Ok(())
    }

    /// Load one agent's snapshot if a file exists for it.
    pub fn load(&self, id: usize) -> Result<Option<WitnessSnapshot>> {
        let path = self.agent_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let snapshot: WitnessSnapshot = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(agent = id, path = %path.display(), "agent state loaded");
        Ok(Some(snapshot))
    }
}
