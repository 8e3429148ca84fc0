//! Replays recorded telemetry through the automation pipeline.
//!
//! Usage: `sensorflow-replay <fixture.json>`. The fixture holds a catalog
//! snapshot, the workflows to publish and the telemetry to replay; the
//! published versions and finished runs are printed to stdout as JSON.

mod replay;

use replay::ReplayError;
use sensorflow_core::Result;
use sensorflow_automation::AutomationConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ReplayError> {
    let config = AutomationConfig::from_env().map_err(|e| ReplayError::Config {
        reason: e.to_string(),
    })?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .ok_or(ReplayError::Usage)?;
    tracing::info!(path = %path.display(), "Replaying fixture");

    let fixture = replay::load_fixture(&path)?;
    let summary = replay::replay(config, fixture).await?;

    let output = serde_json::to_string_pretty(&summary).map_err(|e| ReplayError::Output {
        reason: e.to_string(),
    })?;
    println!("{output}");
    Ok(())
}
