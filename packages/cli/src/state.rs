//! Per-stage completion record, persisted as `pipeline_state.json`.
//!
//! A stage is skipped only when it completed before, its inputs hash to
//! the same fingerprint, and its declared outputs are still on disk.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::PipelineError;
use crate::stage::Stage;

/// Bump when the state layout changes; older records are discarded.
const STATE_VERSION: u32 = 1;

/// Marker hashed in place of a missing input file.
const MISSING_MARKER: &[u8] = b"\0missing\0";

/// Completion details for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// RFC 3339 completion time.
    pub completed_at: String,
    /// SHA-256 of the stage's inputs when it last ran.
    pub fingerprint: String,
}

/// The pipeline state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub version: u32,
    /// Keyed by stage name.
    pub stages: BTreeMap<String, StageRecord>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            stages: BTreeMap::new(),
        }
    }
}

impl PipelineState {
    /// Loads the state record.
    ///
    /// Returns an empty record if the file does not exist, cannot be
    /// parsed, or was written by a different state version.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            log::info!("No existing pipeline state found");
            return Self::default();
        };
        match serde_json::from_str::<Self>(&contents) {
            Ok(state) if state.version == STATE_VERSION => {
                log::info!("Loaded pipeline state from {}", path.display());
                state
            }
            Ok(state) => {
                log::warn!(
                    "Pipeline state {} has version {}, expected {STATE_VERSION}; starting fresh",
                    path.display(),
                    state.version
                );
                Self::default()
            }
            Err(e) => {
                log::warn!("Failed to parse pipeline state {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Writes the state record (to `.tmp`, then renamed into place).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, path)?;
        log::debug!("Saved pipeline state to {}", path.display());
        Ok(())
    }

    /// Records a successful run of `stage` with the given input
    /// fingerprint.
    pub fn record(&mut self, stage: Stage, fingerprint: String) {
        self.stages.insert(
            stage.to_string(),
            StageRecord {
                completed_at: chrono::Utc::now().to_rfc3339(),
                fingerprint,
            },
        );
    }

    /// Whether `stage` has to run.
    ///
    /// Returns `true` if any of: `force` is set, the stage never
    /// completed, its input fingerprint changed, or a declared output is
    /// missing from disk.
    #[must_use]
    pub fn needs_run(&self, stage: Stage, fingerprint: &str, outputs: &[&Path], force: bool) -> bool {
        if force {
            return true;
        }

        let Some(record) = self.stages.get(stage.as_ref()) else {
            return true;
        };

        if record.fingerprint != fingerprint {
            return true;
        }

        outputs.iter().any(|path| !path.exists())
    }
}

/// Hashes a stage's input files, in order.
///
/// Each input contributes its path and contents. A missing file
/// contributes a fixed marker, so creating it later changes the
/// fingerprint.
///
/// # Errors
///
/// Returns an error if an existing input cannot be read.
pub fn fingerprint(inputs: &[&Path]) -> Result<String, PipelineError> {
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    for path in inputs {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");

        if !path.is_file() {
            hasher.update(MISSING_MARKER);
            continue;
        }

        let mut reader = BufReader::new(File::open(path)?);
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
