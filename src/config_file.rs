//! Stage settings that can be saved to and loaded from a JSON file.
//!
//! Every field has a default, so a settings file only needs the values that
//! differ. Command-line flags are applied on top of the loaded file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::manifest::{DATA_DESCRIPTION_FILE, PROCESSING_MANIFEST_PATTERN};
use crate::publisher::{CONFIRMATION_FILE, DEFAULT_BUCKET};
use crate::transfer::DEFAULT_MOVER;

/// Default glob for the CCF registration folder
pub const CCF_PATTERN: &str = "ccf_*";

/// Runtime settings of one stage invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    // Directories
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub scratch_dir: PathBuf,

    // Remote store
    pub bucket: String,
    pub mover: String,

    /// Quantification command; required by `run`
    pub quantifier: Option<String>,

    // Input discovery
    pub processing_manifest_pattern: String,
    pub data_description: String,
    pub ccf_pattern: String,
    pub default_config: Option<PathBuf>, // Embedded template when unset
    pub required_inputs: Vec<PathBuf>,

    /// Defaults to `{results_dir}/output_quantification.txt`
    pub confirmation_file: Option<PathBuf>,

    pub dry_run: bool,
    pub print_commands: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("../data"),
            results_dir: PathBuf::from("../results"),
            scratch_dir: PathBuf::from("../scratch"),
            bucket: DEFAULT_BUCKET.to_string(),
            mover: DEFAULT_MOVER.to_string(),
            quantifier: None,
            processing_manifest_pattern: PROCESSING_MANIFEST_PATTERN.to_string(),
            data_description: DATA_DESCRIPTION_FILE.to_string(),
            ccf_pattern: CCF_PATTERN.to_string(),
            default_config: None,
            required_inputs: Vec::new(),
            confirmation_file: None,
            dry_run: false,
            print_commands: false,
        }
    }
}

impl StageConfig {
    /// Save settings to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize stage settings to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write stage settings to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load settings from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read stage settings from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse stage settings JSON")?;

        Ok(config)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        let bucket = self.bucket.trim();
        if bucket.is_empty() {
            anyhow::bail!("Bucket must be specified");
        }
        if bucket.contains('/') || bucket.contains(char::is_whitespace) {
            anyhow::bail!("Bucket must be a bare bucket name, got '{}'", bucket);
        }

        if self.mover.trim().is_empty() {
            anyhow::bail!("Mover command must be specified");
        }
        if let Some(quantifier) = &self.quantifier {
            if quantifier.trim().is_empty() {
                anyhow::bail!("Quantifier command cannot be empty");
            }
        }

        for (name, pattern) in [
            ("processing_manifest_pattern", &self.processing_manifest_pattern),
            ("data_description", &self.data_description),
            ("ccf_pattern", &self.ccf_pattern),
        ] {
            if pattern.trim().is_empty() {
                anyhow::bail!("{} must be specified", name);
            }
            glob::Pattern::new(pattern).with_context(|| format!("Invalid {}: {}", name, pattern))?;
        }

        Ok(())
    }

    /// Where the confirmation record goes
    pub fn confirmation_path(&self) -> PathBuf {
        self.confirmation_file
            .clone()
            .unwrap_or_else(|| self.results_dir.join(CONFIRMATION_FILE))
    }

    /// First word of the mover command, checked during pre-flight
    pub fn mover_program(&self) -> &str {
        self.mover.split_whitespace().next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("../data"));
        assert_eq!(config.bucket, "aind-open-data");
        assert_eq!(config.mover_program(), "aws");
        assert_eq!(
            config.confirmation_path(),
            PathBuf::from("../results/output_quantification.txt")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stage.json");
        fs::write(&path, r#"{"bucket": "scratch-bucket", "dry_run": true}"#).unwrap();

        let config = StageConfig::load_from_file(&path).unwrap();
        assert_eq!(config.bucket, "scratch-bucket");
        assert!(config.dry_run);
        assert_eq!(config.ccf_pattern, "ccf_*");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stage.json");
        let config = StageConfig {
            quantifier: Some("python -m quantify".to_string()),
            required_inputs: vec![PathBuf::from("/data/fused")],
            ..StageConfig::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(StageConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_load_nonexistent_file() {
        assert!(StageConfig::load_from_file("/nonexistent/stage.json").is_err());
    }

    #[test]
    fn test_load_wrong_type_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stage.json");
        fs::write(&path, r#"{"dry_run": "yes"}"#).unwrap();
        assert!(StageConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_validation_bucket_with_prefix() {
        let config = StageConfig {
            bucket: "aind-open-data/extra".to_string(),
            ..StageConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_mover() {
        let config = StageConfig {
            mover: "  ".to_string(),
            ..StageConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_pattern() {
        let config = StageConfig {
            ccf_pattern: "ccf_[".to_string(),
            ..StageConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
