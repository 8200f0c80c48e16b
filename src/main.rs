//! quantstage - Main entry point
//!
//! Runs the cell quantification stage: compose configuration, quantify,
//! publish. Any error ends the process with a non-zero status.

use anyhow::{Context, Result};
use std::env;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use quantstage::cli::{Cli, Commands};
use quantstage::config_file::StageConfig;
use quantstage::inputs::ensure_programs;
use quantstage::process_guard;
use quantstage::{CommandQuantifier, Stage};

/// Initialize the logger on stderr; RUST_LOG overrides the `info` default
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();
}

fn load_settings(cli: &Cli) -> Result<StageConfig> {
    let base = match &cli.settings.config {
        Some(path) => {
            info!("Loading stage settings from {:?}", path);
            StageConfig::load_from_file(path)?
        }
        None => StageConfig::default(),
    };
    let config = cli.settings.apply(base);
    config.validate().context("Invalid stage settings")?;
    Ok(config)
}

fn main() -> Result<()> {
    init_logger();

    // Children are terminated if we receive SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli);

    let mut config = load_settings(&cli)?;
    let base_dir = env::current_dir().context("Failed to read the working directory")?;

    match cli.command {
        Commands::Run {
            dataset_path,
            channel,
            quantifier,
        } => {
            if quantifier.is_some() {
                config.quantifier = quantifier;
            }
            let command = config
                .quantifier
                .clone()
                .context("No quantifier command configured (use --quantifier or the settings file)")?;
            if !config.dry_run {
                ensure_programs(&[config.mover_program()])?;
            }

            let stage = Stage::new(config);
            let report = stage.run(
                &CommandQuantifier::new(command),
                &base_dir,
                &dataset_path,
                channel.as_deref(),
                |line| println!("{}", line),
            )?;
            info!("Quantification published to {}", report.quantification_uri);
        }
        Commands::Prepare { output } => {
            let effective = Stage::new(config).prepare(&base_dir)?;
            match output {
                Some(path) => {
                    effective.save_to_file(&path)?;
                    info!("Effective configuration written to {:?}", path);
                }
                None => println!("{}", effective.to_json_pretty()?),
            }
        }
        Commands::Publish {
            dataset_path,
            channel,
        } => {
            if !config.dry_run {
                ensure_programs(&[config.mover_program()])?;
            }
            let report = Stage::new(config).publish(&base_dir, &dataset_path, &channel, |line| {
                println!("{}", line)
            })?;
            info!("Quantification published to {}", report.quantification_uri);
        }
    }

    Ok(())
}
