//! Configuration composition
//!
//! Merges the default template with the values the upstream pipeline put in
//! the processing manifest and derives the paths quantification reads from
//! and writes to. Composition is pure: absolute paths are computed lexically
//! against an explicit base directory, and the manifest is only borrowed.

use crate::error::{Result, StageError};
use crate::manifest::ProcessingManifest;
use crate::template::DefaultConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Keys every effective configuration carries after composition
pub const REQUIRED_KEYS: &[&str] = &[
    "fused_folder",
    "stitched_s3_path",
    "channel_name",
    "save_path",
    "name",
    "ccf_registration_folder",
    "cell_segmentation_folder",
    "input_params.downsample_res",
    "input_params.detected_cells_xml_path",
    "input_params.ccf_transforms_path",
];

/// Values resolved from the data directory before composition
#[derive(Debug, Clone)]
pub struct ResolvedInputs {
    pub dataset_name: String,
    pub ccf_registration_folder: PathBuf,
    pub cell_segmentation_folder: PathBuf,
}

/// Run configuration handed to quantification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EffectiveConfig(Map<String, Value>);

impl EffectiveConfig {
    /// Look up a dotted key such as `input_params.downsample_res`
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        let mut parts = dotted.split('.');
        let first = parts.next()?;
        parts.try_fold(self.0.get(first)?, |value, part| value.get(part))
    }

    fn get_str(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn channel_name(&self) -> &str {
        self.get_str("channel_name")
    }

    pub fn save_path(&self) -> &str {
        self.get_str("save_path")
    }

    pub fn name(&self) -> &str {
        self.get_str("name")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }

    /// Write the configuration as pretty JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    fn ensure_complete(&self) -> Result<()> {
        match REQUIRED_KEYS.iter().find(|key| self.get(key).is_none()) {
            Some(key) => Err(StageError::missing_key(*key)),
            None => Ok(()),
        }
    }
}

/// Make `path` absolute against `base` and normalize `.` and `..`.
///
/// Purely lexical; symlinks are not resolved. If `base` is itself relative,
/// `..` components that climb above it are kept rather than dropped.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

/// Per-channel output directory under the manifest's save path
pub fn channel_save_path(save_root: &str, channel: &str, base: &Path) -> PathBuf {
    absolutize(Path::new(&format!("{}/quant_{}", save_root, channel)), base)
}

/// Merge `defaults` with the pipeline values from `manifest`.
///
/// Every pipeline-supplied key is mandatory. Template keys that are not
/// overridden are kept as they are.
pub fn compose(
    manifest: &ProcessingManifest,
    defaults: DefaultConfig,
    inputs: &ResolvedInputs,
    base_dir: &Path,
) -> Result<EffectiveConfig> {
    let fused_folder = manifest.require_str("quantification.fused_folder")?;
    let channel = manifest.require_str("quantification.channel")?;
    let save_root = manifest.require_str("quantification.save_path")?;
    let stitched_s3_path = manifest.require("stitching.s3_path")?.clone();
    let downsample_res = manifest.require("registration.input_scale")?.clone();

    let ccf_folder = absolutize(&inputs.ccf_registration_folder, base_dir);
    let cell_folder = absolutize(&inputs.cell_segmentation_folder, base_dir);

    let mut config = defaults.into_inner();
    config.insert(
        "fused_folder".into(),
        path_value(&absolutize(Path::new(fused_folder), base_dir)),
    );
    config.insert("stitched_s3_path".into(), stitched_s3_path);
    config.insert("channel_name".into(), Value::String(channel.to_string()));
    config.insert(
        "save_path".into(),
        path_value(&channel_save_path(save_root, channel, base_dir)),
    );
    config.insert("ccf_registration_folder".into(), path_value(&ccf_folder));
    config.insert("cell_segmentation_folder".into(), path_value(&cell_folder));
    config.insert("name".into(), Value::String(inputs.dataset_name.clone()));

    let input_params = config
        .entry("input_params")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| StageError::ConfigurationValue {
            key: "input_params".to_string(),
            expected: "a mapping",
        })?;
    input_params.insert("downsample_res".into(), downsample_res);
    input_params.insert(
        "detected_cells_xml_path".into(),
        Value::String(format!("{}/", cell_folder.display())),
    );
    input_params.insert(
        "ccf_transforms_path".into(),
        Value::String(format!("{}/", ccf_folder.display())),
    );

    let config = EffectiveConfig(config);
    config.ensure_complete()?;
    Ok(config)
}
