//! Hand-off to the quantification routine.
//!
//! Quantification itself is opaque to this crate. It receives the data,
//! output and scratch directories plus the effective configuration, and
//! either succeeds or fails.

use crate::command_executor::run_command;
use crate::composer::EffectiveConfig;
use crate::error::Result;
use crate::transfer::ShellCommand;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// File the effective configuration is written to inside the scratch directory
pub const CONFIG_FILE_NAME: &str = "quantification_config.json";

/// Everything one quantification call needs
#[derive(Debug, Clone)]
pub struct QuantificationJob {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub config: EffectiveConfig,
}

/// The quantification routine
pub trait Quantifier {
    fn quantify(&self, job: QuantificationJob) -> Result<()>;
}

/// Runs quantification as an external program.
///
/// The program is called as
/// `{command} --config <json> --data-dir <dir> --output-dir <dir> --scratch-dir <dir>`
/// and its stdout is forwarded to the log.
#[derive(Debug, Clone)]
pub struct CommandQuantifier {
    pub command: String,
}

impl CommandQuantifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

struct QuantifyInvocation<'a> {
    program: &'a str,
    config_path: PathBuf,
    job: &'a QuantificationJob,
}

impl ShellCommand for QuantifyInvocation<'_> {
    fn program(&self) -> &str {
        self.program
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--config".to_string(),
            self.config_path.display().to_string(),
            "--data-dir".to_string(),
            self.job.data_dir.display().to_string(),
            "--output-dir".to_string(),
            self.job.output_dir.display().to_string(),
            "--scratch-dir".to_string(),
            self.job.scratch_dir.display().to_string(),
        ]
    }
}

impl Quantifier for CommandQuantifier {
    fn quantify(&self, job: QuantificationJob) -> Result<()> {
        fs::create_dir_all(&job.scratch_dir)?;
        let config_path = job.scratch_dir.join(CONFIG_FILE_NAME);
        job.config.save_to_file(&config_path)?;
        info!("Quantification config written to {}", config_path.display());

        let invocation = QuantifyInvocation {
            program: &self.command,
            config_path,
            job: &job,
        };
        run_command(&invocation.to_command_line(), |line| {
            info!("[quantification] {}", line)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::{compose, ResolvedInputs};
    use crate::manifest::ProcessingManifest;
    use crate::template::DefaultConfig;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn config() -> EffectiveConfig {
        let manifest = match json!({
            "quantification": {"fused_folder": "f", "channel": "Ex_561_Em_593", "save_path": "r"},
            "stitching": {"s3_path": "s3://b/d"},
            "registration": {"input_scale": 3}
        }) {
            serde_json::Value::Object(map) => ProcessingManifest::new(map),
            _ => unreachable!(),
        };
        let inputs = ResolvedInputs {
            dataset_name: "d".to_string(),
            ccf_registration_folder: "ccf_x".into(),
            cell_segmentation_folder: "cell_Ex_561_Em_593".into(),
        };
        compose(&manifest, DefaultConfig::new(Default::default()), &inputs, Path::new("/data"))
            .unwrap()
    }

    fn job(dir: &Path) -> QuantificationJob {
        QuantificationJob {
            data_dir: dir.join("data"),
            output_dir: dir.join("results"),
            scratch_dir: dir.join("scratch"),
            config: config(),
        }
    }

    #[test]
    fn test_command_quantifier_writes_config() {
        let dir = TempDir::new().unwrap();
        // The config path is the second argument
        let record = dir.path().join("args.txt");
        let command = format!("cp \"$2\" {} && echo", record.display());
        let quantifier = CommandQuantifier::new(format!("bash -c '{}' quantify", command));

        quantifier.quantify(job(dir.path())).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&record).unwrap()).unwrap();
        assert_eq!(written["channel_name"], json!("Ex_561_Em_593"));
        assert!(dir.path().join("scratch").join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_command_quantifier_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let err = CommandQuantifier::new("exit 4 #").quantify(job(dir.path())).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StageError::ExternalCommand { exit_code: 4, .. }
        ));
    }
}
