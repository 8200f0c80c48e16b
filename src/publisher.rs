//! Publishing quantification results to the object store.
//!
//! Remote layout for a dataset folder `D`, channel `C` and bucket `B`:
//!
//! ```text
//! s3://B/D/ccf_C_process_output.json          <- {output}/ccf_C_process_output.json
//! s3://B/D/processed/Quantification/C         <- {output}/ (recursive)
//! ```
//!
//! The single file moves first, then the tree. Any failure stops the publish
//! on the spot. The confirmation file is written only after both moves
//! succeeded, so its presence means the results are in place.

use crate::command_executor::run_command;
use crate::error::{Result, StageError};
use crate::transfer::{ObjectStoreMove, ShellCommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default bucket of the open data registry
pub const DEFAULT_BUCKET: &str = "aind-open-data";

/// File name of the confirmation record
pub const CONFIRMATION_FILE: &str = "output_quantification.txt";

/// Which dataset and channel the results belong to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetIdentity {
    pub dataset_folder: String,
    pub channel: String,
}

impl DatasetIdentity {
    pub fn new(dataset_folder: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            dataset_folder: dataset_folder.into(),
            channel: channel.into(),
        }
    }

    /// Identity from a dataset path such as `../data/SmartSPIM_000/...`
    pub fn from_dataset_path(path: &str, channel: impl Into<String>) -> Result<Self> {
        Ok(Self::new(dataset_folder_from_path(path)?, channel))
    }
}

/// Third `/`-separated segment of `path`; empty segments count
pub fn dataset_folder_from_path(path: &str) -> Result<String> {
    match path.split('/').nth(2) {
        Some(segment) if !segment.is_empty() => Ok(segment.to_string()),
        _ => Err(StageError::InvalidDatasetPath {
            path: path.to_string(),
        }),
    }
}

/// Remote destinations inside one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub bucket: String,
}

impl RemoteLayout {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    pub fn process_output_uri(&self, id: &DatasetIdentity) -> String {
        format!(
            "s3://{}/{}/{}",
            self.bucket,
            id.dataset_folder,
            process_output_name(&id.channel)
        )
    }

    pub fn quantification_uri(&self, id: &DatasetIdentity) -> String {
        format!(
            "s3://{}/{}/processed/Quantification/{}",
            self.bucket, id.dataset_folder, id.channel
        )
    }
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET)
    }
}

fn process_output_name(channel: &str) -> String {
    format!("ccf_{}_process_output.json", channel)
}

/// Local path of the process-output manifest for `channel`
pub fn local_process_output(output_folder: &Path, channel: &str) -> PathBuf {
    output_folder.join(process_output_name(channel))
}

/// Line recorded in the confirmation file
pub fn confirmation_message(quantification_uri: &str) -> String {
    format!("Results of cell quantification saved in: {}", quantification_uri)
}

/// Where a publish put things
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub process_output_uri: String,
    pub quantification_uri: String,
    /// `None` in dry-run mode
    pub confirmation_path: Option<PathBuf>,
}

/// Moves results with an external command
#[derive(Debug, Clone)]
pub struct Publisher {
    pub mover: String,
    pub layout: RemoteLayout,
    pub dry_run: bool,
    pub print_commands: bool,
}

impl Publisher {
    pub fn new(mover: impl Into<String>, layout: RemoteLayout) -> Self {
        Self {
            mover: mover.into(),
            layout,
            dry_run: false,
            print_commands: false,
        }
    }

    /// The two moves, in execution order
    pub fn plan(&self, output_folder: &Path, id: &DatasetIdentity) -> [ObjectStoreMove; 2] {
        [
            ObjectStoreMove::new(
                self.mover.as_str(),
                local_process_output(output_folder, &id.channel),
                self.layout.process_output_uri(id),
            ),
            ObjectStoreMove::new(
                self.mover.as_str(),
                output_folder,
                self.layout.quantification_uri(id),
            )
            .recursive(),
        ]
    }

    /// Move the results and record where they went
    pub fn publish<F>(
        &self,
        output_folder: &Path,
        id: &DatasetIdentity,
        confirmation_path: &Path,
        mut echo: F,
    ) -> Result<PublishReport>
    where
        F: FnMut(&str),
    {
        for transfer in self.plan(output_folder, id) {
            let command = transfer.to_command_line();
            if self.print_commands || self.dry_run {
                echo(&command);
            }
            if self.dry_run {
                info!("[DRY RUN] Skipped: {}", command);
                continue;
            }
            run_command(&command, &mut echo)?;
        }

        let quantification_uri = self.layout.quantification_uri(id);
        let confirmation_path = if self.dry_run {
            None
        } else {
            write_confirmation(confirmation_path, &quantification_uri)?;
            Some(confirmation_path.to_path_buf())
        };

        info!("Results of cell quantification saved in: {}", quantification_uri);
        Ok(PublishReport {
            process_output_uri: self.layout.process_output_uri(id),
            quantification_uri,
            confirmation_path,
        })
    }
}

/// Write the one-line confirmation, replacing any previous record
fn write_confirmation(path: &Path, quantification_uri: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{}\n", confirmation_message(quantification_uri)))?;
    Ok(())
}
