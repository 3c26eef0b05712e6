//! Platform Herald binary entrypoint.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use herald_bot::bot::Bot;
use herald_common::config::AppConfig;
use herald_common::run_state::RedisRunState;
use herald_notifier::SlackClient;
use herald_platform::PlatformClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (fatal on missing or malformed values)
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "herald_bot=info,herald_platform=info,herald_notifier=info,herald_common=info",
        )
    });
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Platform Herald starting...");

    let platform = PlatformClient::from_config(&config)?;
    let notifier = SlackClient::from_config(&config)?;
    let run_state = RedisRunState::new(
        redis::Client::open(config.redis_url.as_str())?,
        config.run_state_key.clone(),
        config.http_timeout(),
    );

    let bot = Bot::new(
        Arc::new(platform),
        Arc::new(notifier),
        Arc::new(run_state),
        config.slack_channel.clone(),
    )
    .with_interval(config.poll_interval())
    .with_max_events(config.summary_max_events);

    tracing::info!(
        api_url = %config.cf_api_url,
        channel = %config.slack_channel,
        run_state_key = %config.run_state_key,
        "Starting polling loop"
    );

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = bot.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Platform Herald stopped.");
    Ok(())
}
