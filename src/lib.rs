//! quantstage library
//!
//! Configuration assembly, process supervision and result publishing for the
//! cell quantification stage of the SmartSPIM pipeline.

pub mod cli;
pub mod command_executor;
pub mod composer;
pub mod config_file;
pub mod error;
pub mod inputs;
pub mod manifest;
pub mod process_guard;
pub mod publisher;
pub mod quantifier;
pub mod stage;
pub mod template;
pub mod transfer;

// Re-export main types for convenience
pub use command_executor::{run_command, stream_command, CommandStream};
pub use composer::{compose, EffectiveConfig, ResolvedInputs};
pub use config_file::StageConfig;
pub use error::{Result, StageError};
pub use inputs::{ensure_inputs, missing_inputs};
pub use manifest::{load_data_config, DataConfig, ProcessingManifest};
pub use publisher::{DatasetIdentity, PublishReport, Publisher, RemoteLayout};
pub use quantifier::{CommandQuantifier, QuantificationJob, Quantifier};
pub use stage::Stage;
pub use template::DefaultConfig;
