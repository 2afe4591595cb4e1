use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hmpvcf::{Config, convert};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = config.conversion_options()?;
    tracing::info!(
        "Converting {:?} -> {:?} with {} workers",
        options.input,
        options.output,
        options.workers
    );

    let summary = convert(&options).await?;

    if config.summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}
