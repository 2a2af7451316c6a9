use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use clap::ArgMatches;
use sentinel_runtime::{DetectionError, DetectionRequest};

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = super::load_config(matches)?;
    super::init_tracing(&config.logging);

    let text = match matches.get_one::<String>("text") {
        Some(text) => text.clone(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read text from stdin")?;
            buffer
        }
    };

    let coordinator = super::start_coordinator(&config).await?;
    let request = DetectionRequest::new(text, config.detection.reasoning);
    let timeout = Duration::from_secs(config.api.request_timeout_seconds);

    let result = coordinator.submit_with_timeout(request, timeout).await;
    coordinator.shutdown().await;

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            if let DetectionError::Parse(parse) = &e {
                eprintln!("Raw model output:\n{}", parse.raw_transcript);
            }
            Err(anyhow::Error::new(e).context("detection failed"))
        }
    }
}
