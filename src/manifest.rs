//! Loading of upstream pipeline manifests.
//!
//! The data directory of a quantification run holds the processing manifest
//! written by the segmentation stage (`segmentation_processing_manifest*.json`)
//! and the dataset's `data_description.json`. Both are mandatory: nothing is
//! substituted when either is absent or malformed.

use crate::error::{Result, StageError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default glob for the upstream processing manifest
pub const PROCESSING_MANIFEST_PATTERN: &str = "segmentation_processing_manifest*.json";

/// Default file name of the dataset description
pub const DATA_DESCRIPTION_FILE: &str = "data_description.json";

/// Per-stage parameters produced by the upstream pipeline.
///
/// Shape: stage name → parameter name → value, e.g.
/// `quantification.channel` or `registration.input_scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingManifest(Map<String, Value>);

impl ProcessingManifest {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Look up a dotted key such as `stitching.s3_path`
    pub fn lookup(&self, dotted: &str) -> Option<&Value> {
        let mut parts = dotted.split('.');
        let first = parts.next()?;
        parts.try_fold(self.0.get(first)?, |value, part| value.get(part))
    }

    /// Like [`lookup`](Self::lookup), but a missing key is an error
    pub fn require(&self, dotted: &str) -> Result<&Value> {
        self.lookup(dotted)
            .ok_or_else(|| StageError::missing_key(dotted))
    }

    /// A required key whose value must be a string
    pub fn require_str(&self, dotted: &str) -> Result<&str> {
        self.require(dotted)?
            .as_str()
            .ok_or_else(|| StageError::ConfigurationValue {
                key: dotted.to_string(),
                expected: "a string",
            })
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Dataset metadata; only `name` is used by this stage
#[derive(Debug, Clone, Deserialize)]
pub struct DataDescription {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything the loader extracts from the data directory
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub manifest: ProcessingManifest,
    pub dataset_name: String,
    pub manifest_path: PathBuf,
}

/// Read a JSON file that must contain an object
pub fn load_json_mapping(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path).map_err(|e| StageError::load(path, e))?;
    match serde_json::from_str::<Value>(&content).map_err(|e| StageError::load(path, e))? {
        Value::Object(map) => Ok(map),
        other => Err(StageError::load(
            path,
            format!("expected a JSON object, found {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Glob `pattern` inside `dir` and insist on at most one candidate.
///
/// Returns `Ok(None)` when nothing matches and `AmbiguousInput` when several
/// entries do. Callers decide which error an empty match turns into.
pub fn find_single_match(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
    let full_pattern = format!("{}/{}", escaped_dir.trim_end_matches('/'), pattern);

    let entries = glob::glob(&full_pattern)
        .map_err(|e| StageError::config(format!("invalid pattern {}: {}", full_pattern, e)))?;

    let mut matches = entries
        .map(|entry| entry.map_err(|e| StageError::load(e.path(), e.error())))
        .collect::<Result<Vec<PathBuf>>>()?;
    matches.sort();
    debug!("Pattern {} matched {} entries", full_pattern, matches.len());

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(StageError::AmbiguousInput {
            pattern: dir.join(pattern).display().to_string(),
            matches,
        }),
    }
}

/// Load the processing manifest and data description from `data_dir`
pub fn load_data_config(
    data_dir: &Path,
    manifest_pattern: &str,
    description_file: &str,
) -> Result<DataConfig> {
    let manifest_path = find_single_match(data_dir, manifest_pattern)?
        .ok_or_else(|| StageError::load(data_dir.join(manifest_pattern), "no such file"))?;
    info!("Loading processing manifest: {}", manifest_path.display());
    let manifest = ProcessingManifest::new(load_json_mapping(&manifest_path)?);

    let description_path = data_dir.join(description_file);
    let description: DataDescription =
        serde_json::from_value(Value::Object(load_json_mapping(&description_path)?))
            .map_err(|e| StageError::load(&description_path, e))?;
    info!("Dataset: {}", description.name);

    Ok(DataConfig {
        manifest,
        dataset_name: description.name,
        manifest_path,
    })
}
