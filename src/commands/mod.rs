pub mod detect;
pub mod doctor;
pub mod serve;

use std::path::PathBuf;

use anyhow::Context;
use clap::ArgMatches;
use sentinel_runtime::config::{LogFormat, LoggingConfig};
use sentinel_runtime::{InferenceCoordinator, ReasoningMode, SentinelConfig};
use tracing_subscriber::EnvFilter;

/// Configuration with CLI flags layered over file and environment.
pub fn load_config(matches: &ArgMatches) -> anyhow::Result<SentinelConfig> {
    let path = matches.get_one::<PathBuf>("config");
    let mut config = SentinelConfig::load(path.map(PathBuf::as_path))
        .context("failed to load configuration")?;

    apply_cli_overrides(&mut config, matches);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut SentinelConfig, matches: &ArgMatches) {
    if let Some(path) = matches.get_one::<PathBuf>("model-path") {
        config.model.path = path.clone();
    }
    if let Some(path) = matches.get_one::<PathBuf>("tokenizer-path") {
        config.model.tokenizer_path = Some(path.clone());
    }
    if matches.get_flag("nothink") {
        config.detection.reasoning = ReasoningMode::NoThink;
    }
    if let Some(host) = matches.get_one::<String>("host") {
        config.api.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.api.port = *port;
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Logs go to stderr so `detect` can print its report on stdout.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = result {
        eprintln!("⚠️  Failed to initialize logging: {}", e);
    }
}

/// Load the model off the async runtime and start the coordinator around it.
pub async fn start_coordinator(config: &SentinelConfig) -> anyhow::Result<InferenceCoordinator> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || InferenceCoordinator::from_config(&config))
        .await
        .context("model loading task failed")?
        .context("failed to load model")
}
