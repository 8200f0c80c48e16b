use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::StageConfig;

/// quantstage - SmartSPIM cell quantification pipeline stage
#[derive(Parser, Debug)]
#[command(name = "quantstage")]
#[command(about = "Assemble quantification config, run quantification and publish results")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the stage settings, shared by every command
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Stage settings file (JSON); flags below override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the upstream manifests and inputs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory quantification writes its results to
    #[arg(long, global = true)]
    pub results_dir: Option<PathBuf>,

    /// Directory for intermediate files
    #[arg(long, global = true)]
    pub scratch_dir: Option<PathBuf>,

    /// Destination bucket
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Move command used for transfers (e.g. "aws s3 mv")
    #[arg(long, global = true)]
    pub mover: Option<String>,

    /// YAML template replacing the built-in default configuration
    #[arg(long, global = true)]
    pub default_config: Option<PathBuf>,

    /// Additional path that must exist before the stage starts (repeatable)
    #[arg(long = "require", global = true)]
    pub required_inputs: Vec<PathBuf>,

    /// Log the transfers instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Echo each transfer command before running it
    #[arg(long, global = true)]
    pub print_commands: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compose the configuration, run quantification and publish results
    Run {
        /// Dataset path; its third '/'-separated segment names the dataset folder
        #[arg(long)]
        dataset_path: String,

        /// Channel used for the remote layout (defaults to the manifest channel)
        #[arg(long)]
        channel: Option<String>,

        /// Quantification command
        #[arg(long)]
        quantifier: Option<String>,
    },
    /// Compose and print the effective configuration without running anything
    Prepare {
        /// Write the configuration here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Publish existing results to the object store
    Publish {
        /// Dataset path; its third '/'-separated segment names the dataset folder
        #[arg(long)]
        dataset_path: String,

        /// Channel name, e.g. Ex_488_Em_525
        #[arg(long)]
        channel: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl SettingsArgs {
    /// Apply flags on top of `base`
    pub fn apply(&self, mut base: StageConfig) -> StageConfig {
        if let Some(dir) = &self.data_dir {
            base.data_dir = dir.clone();
        }
        if let Some(dir) = &self.results_dir {
            base.results_dir = dir.clone();
        }
        if let Some(dir) = &self.scratch_dir {
            base.scratch_dir = dir.clone();
        }
        if let Some(bucket) = &self.bucket {
            base.bucket = bucket.clone();
        }
        if let Some(mover) = &self.mover {
            base.mover = mover.clone();
        }
        if let Some(path) = &self.default_config {
            base.default_config = Some(path.clone());
        }
        base.required_inputs.extend(self.required_inputs.iter().cloned());
        base.dry_run |= self.dry_run;
        base.print_commands |= self.print_commands;
        base
    }
}
