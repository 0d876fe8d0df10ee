//! Configuration management
//!
//! Handles persistent configuration for preservation and validation runs.
//! The file is JSON; every field has a default, so a missing file or a partial
//! one is fine.
//!
//! ```json
//! {
//!   "catalog_path": "/srv/keepsake/catalog.json",
//!   "archive_root": "/srv/keepsake/archive",
//!   "checksum_algorithm": "md5",
//!   "update_window_days": 30,
//!   "required_fields": { "base": ["GUID", "Collection ID"], "writable": [] },
//!   "workflows": [
//!     { "step": "preserve", "catalog": "Conservation", "interval_secs": 3600 }
//!   ]
//! }
//! ```

use crate::catalog::fields;
use crate::error::{KeepsakeError, Result, ResultExt as _};
use crate::integrity::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Fields a record must carry before anything of it is packaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredFields {
    /// Must exist and hold a value
    pub base: Vec<String>,
    /// Must exist and be writable (in addition to the fields the pipeline writes)
    pub writable: Vec<String>,
}

impl Default for RequiredFields {
    fn default() -> Self {
        Self {
            base: vec![fields::GUID.to_owned(), fields::COLLECTION_ID.to_owned()],
            writable: Vec::new(),
        }
    }
}

/// Kind of scheduled workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Full preservation of ready records
    Preserve,
    /// Metadata-only re-preservation of changed records
    Update,
    SimpleValidation,
    FullValidation,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preserve => "preserve",
            Self::Update => "update",
            Self::SimpleValidation => "simple-validation",
            Self::FullValidation => "full-validation",
        })
    }
}

/// One scheduled step of the workflow timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepConfig {
    pub step: StepKind,
    pub catalog: String,
    pub interval_secs: u64,
}

impl WorkflowStepConfig {
    /// Thread / log name of the step, e.g. `preserve:Conservation`.
    pub fn name(&self) -> String {
        format!("{}:{}", self.step, self.catalog)
    }
}

/// Keepsake configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepsakeConfig {
    /// JSON file backing the catalog
    pub catalog_path: PathBuf,
    /// Root directory of the local archive
    pub archive_root: PathBuf,
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Where full validation writes payload scratch files (OS temp dir if unset)
    pub scratch_dir: Option<PathBuf>,
    /// Look-back window of update-only runs
    pub update_window_days: u32,
    pub required_fields: RequiredFields,
    pub workflows: Vec<WorkflowStepConfig>,
}

impl Default for KeepsakeConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("catalog.json"),
            archive_root: PathBuf::from("archive"),
            checksum_algorithm: ChecksumAlgorithm::default(),
            scratch_dir: None,
            update_window_days: 30,
            required_fields: RequiredFields::default(),
            workflows: Vec::new(),
        }
    }
}

impl KeepsakeConfig {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Config`] if the platform has no config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            KeepsakeError::Config("Failed to get config directory".to_owned())
        })?;
        Ok(config_dir.join("keepsake").join("config.json"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Config`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            KeepsakeError::Config(format!("Failed to read config from {}: {e}", path.display()))
        })?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file or its parent directory cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KeepsakeError::Config(format!(
                    "Failed to create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, json).map_err(|e| {
            KeepsakeError::Config(format!("Failed to write config to {}: {e}", path.display()))
        })?;

        Ok(())
    }

    /// Reject settings no run could work with.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Argument`] naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        if self.update_window_days == 0 {
            return Err(KeepsakeError::Argument(
                "update_window_days must be at least 1".to_owned(),
            ));
        }

        let mut fields = self
            .required_fields
            .base
            .iter()
            .chain(&self.required_fields.writable);
        if let Some(blank) = fields.find(|f| f.trim().is_empty()) {
            return Err(KeepsakeError::Argument(format!(
                "required field names must not be empty (got '{blank}')"
            )));
        }

        for step in &self.workflows {
            if step.catalog.trim().is_empty() {
                return Err(KeepsakeError::Argument(format!(
                    "workflow step '{}' has no catalog name",
                    step.step
                )));
            }
            if step.interval_secs == 0 {
                return Err(KeepsakeError::Argument(format!(
                    "workflow step '{}' has a zero interval",
                    step.name()
                )));
            }
        }

        Ok(())
    }

    /// Scratch directory for full validation.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
