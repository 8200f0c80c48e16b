//! The quantification stage end to end.
//!
//! `prepare` builds the effective configuration from the data directory,
//! `run` adds quantification and publishing, `publish` only moves results.
//! Steps run strictly in sequence and the first error ends the run.

use crate::composer::{absolutize, compose, EffectiveConfig, ResolvedInputs};
use crate::config_file::StageConfig;
use crate::error::{Result, StageError};
use crate::inputs::ensure_inputs;
use crate::manifest::{find_single_match, load_data_config};
use crate::publisher::{DatasetIdentity, PublishReport, Publisher, RemoteLayout};
use crate::quantifier::{QuantificationJob, Quantifier};
use crate::template::load_default_config;
use std::path::Path;
use tracing::{info, warn};

/// One configured stage invocation
#[derive(Debug, Clone)]
pub struct Stage {
    config: StageConfig,
}

impl Stage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Assemble the effective configuration.
    ///
    /// Relative paths are resolved against `base_dir`. Nothing is written.
    pub fn prepare(&self, base_dir: &Path) -> Result<EffectiveConfig> {
        let config = &self.config;
        ensure_inputs(&config.required_inputs)?;

        let data = load_data_config(
            &config.data_dir,
            &config.processing_manifest_pattern,
            &config.data_description,
        )?;
        let defaults = load_default_config(config.default_config.as_deref())?;

        let ccf_folder = find_single_match(&config.data_dir, &config.ccf_pattern)?.ok_or_else(
            || StageError::UnmatchedInput {
                pattern: config.data_dir.join(&config.ccf_pattern).display().to_string(),
            },
        )?;

        let channel = data.manifest.require_str("quantification.channel")?;
        let cell_folder = config.data_dir.join(format!("cell_{}", channel));
        ensure_inputs([&cell_folder])?;

        info!(
            "Composing configuration: ccf={} cells={}",
            ccf_folder.display(),
            cell_folder.display()
        );
        let inputs = ResolvedInputs {
            dataset_name: data.dataset_name.clone(),
            ccf_registration_folder: ccf_folder,
            cell_segmentation_folder: cell_folder,
        };
        compose(&data.manifest, defaults, &inputs, base_dir)
    }

    /// Prepare, quantify, then publish.
    ///
    /// `channel` overrides the manifest channel for the remote layout.
    pub fn run<Q, F>(
        &self,
        quantifier: &Q,
        base_dir: &Path,
        dataset_path: &str,
        channel: Option<&str>,
        echo: F,
    ) -> Result<PublishReport>
    where
        Q: Quantifier + ?Sized,
        F: FnMut(&str),
    {
        let effective = self.prepare(base_dir)?;

        let channel = match channel {
            Some(channel) => {
                if channel != effective.channel_name() {
                    warn!(
                        "Publishing channel {} differs from manifest channel {}",
                        channel,
                        effective.channel_name()
                    );
                }
                channel.to_string()
            }
            None => effective.channel_name().to_string(),
        };
        let identity = DatasetIdentity::from_dataset_path(dataset_path, channel)?;

        info!("Starting quantification for {}", effective.name());
        quantifier.quantify(QuantificationJob {
            data_dir: absolutize(&self.config.data_dir, base_dir),
            output_dir: absolutize(&self.config.results_dir, base_dir),
            scratch_dir: absolutize(&self.config.scratch_dir, base_dir),
            config: effective,
        })?;

        self.publish_identity(&identity, base_dir, echo)
    }

    /// Publish existing results for `dataset_path` and `channel`
    pub fn publish<F>(
        &self,
        base_dir: &Path,
        dataset_path: &str,
        channel: &str,
        echo: F,
    ) -> Result<PublishReport>
    where
        F: FnMut(&str),
    {
        let identity = DatasetIdentity::from_dataset_path(dataset_path, channel)?;
        self.publish_identity(&identity, base_dir, echo)
    }

    fn publish_identity<F>(
        &self,
        identity: &DatasetIdentity,
        base_dir: &Path,
        echo: F,
    ) -> Result<PublishReport>
    where
        F: FnMut(&str),
    {
        let mut publisher = Publisher::new(
            self.config.mover.as_str(),
            RemoteLayout::new(self.config.bucket.as_str()),
        );
        publisher.dry_run = self.config.dry_run;
        publisher.print_commands = self.config.print_commands;

        publisher.publish(
            &absolutize(&self.config.results_dir, base_dir),
            identity,
            &absolutize(&self.config.confirmation_path(), base_dir),
            echo,
        )
    }
}
