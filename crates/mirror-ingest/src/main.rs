mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mirror_ingest_lib::{
    run_server, EventHandler, FeedPipeline, FeedState, JsonLinesSink, Metrics, ServerState,
    SubscriptionManager, SubscriptionOptions, UncheckedVerifier,
};
use mirror_middleware::JsonlReplayTransport;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

const DEFAULT_LOG_FILTER: &str = "mirror_ingest=info,mirror_ingest_lib=info,mirror_middleware=info";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Events may go to stdout, so logs stay on stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    info!(
        topic = %config.topic_id,
        replay_file = %config.replay_file.display(),
        start_time = %config.start_time,
        checkpoint = config.checkpoint,
        gap_policy = %config.gap_policy,
        "mirror-ingest starting"
    );

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);

    let handler: Arc<dyn EventHandler> = match &config.output {
        Some(path) => Arc::new(
            JsonLinesSink::append_to(path)
                .await
                .with_context(|| format!("failed to open output {}", path.display()))?,
        ),
        None => Arc::new(JsonLinesSink::stdout()),
    };

    let pipeline = FeedPipeline::new(
        FeedState::with_checkpoint(config.checkpoint).into_shared(),
        Arc::new(UncheckedVerifier),
        handler,
        metrics.clone(),
        config.gap_policy,
    );
    let options = SubscriptionOptions {
        start: config.start_time.into(),
        channel_capacity: config.channel_capacity,
    };
    let manager = SubscriptionManager::new(
        Arc::new(JsonlReplayTransport::new(config.replay_file.clone())),
        pipeline,
        options,
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "health/metrics server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_state = ServerState::new(
        config.topic_id.to_string(),
        manager.listening_handle(),
        metrics,
    );
    let server = tokio::spawn(run_server(listener, server_state, shutdown_rx));

    if let Some(task) = manager.start_listening(config.topic_id) {
        tokio::select! {
            result = task.wait() => {
                let summary = result.context("listener task panicked")?;
                info!(
                    processed = summary.processed,
                    dispatched = summary.dispatched,
                    unprocessable = summary.unprocessable,
                    "replay complete"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
            }
        }
    }

    let state = manager.state().read().await.clone();
    info!(
        current_sequence_number = state.current_sequence_number,
        sequence_length = state.sequence_length,
        "final feed position"
    );

    if shutdown_tx.send(true).is_err() {
        warn!("health server already stopped");
    }
    server.await.context("health server panicked")??;

    info!("mirror-ingest stopped");
    Ok(())
}
