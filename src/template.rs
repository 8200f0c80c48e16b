//! Default quantification parameters.
//!
//! The template is YAML. A copy ships inside the binary; a file given in the
//! stage settings replaces it.

use crate::error::{Result, StageError};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

const EMBEDDED_TEMPLATE: &str = include_str!("../resources/default_quantify_config.yaml");
const EMBEDDED_NAME: &str = "<embedded default_quantify_config.yaml>";

/// Template mapping of configuration keys to default values
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultConfig(Map<String, Value>);

impl DefaultConfig {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// The template compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_TEMPLATE, Path::new(EMBEDDED_NAME))
    }

    /// Load a YAML template from disk
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| StageError::load(path, e))?;
        Self::parse(&content, path)
    }

    /// `path` is only used to name the source in errors
    fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| StageError::load(path, e))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(StageError::load(path, "template must be a mapping")),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Load the template at `path`, or the embedded one
pub fn load_default_config(path: Option<&Path>) -> Result<DefaultConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading default config template: {}", path.display());
            DefaultConfig::load_from_file(path)
        }
        None => DefaultConfig::embedded(),
    }
}
