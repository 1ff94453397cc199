//! keywatch: Redis keyspace event recorder
//!
//! Subscribes to key-event notifications from a Redis instance and
//! records each mutation, enriched with the key's current value and
//! TTL, into ClickHouse.
//!
//! ## Architecture
//! ```text
//! [Redis keyspace events] -> [pipeline] -> [ClickHouse]
//!                                |
//!                         (value/TTL reads)
//! ```
//!
//! ## Configuration
//! - KEYWATCH__SOURCE__URL: Redis connection URL
//! - KEYWATCH__SOURCE__PASSWORD: Redis password (optional)
//! - KEYWATCH__SINK__URL: ClickHouse HTTP endpoint
//! - KEYWATCH__SINK__DATABASE: target database name
//! - KEYWATCH__INSTANCE: label tagged onto every event
//! - KEYWATCH_LOG: tracing filter (default: info)

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

use keywatch::bootstrap::init_tracing;
use keywatch::config::Config;
use keywatch::pipeline::Pipeline;
use keywatch::sink::{ClickHouseSink, EventSink};
use keywatch::source::RedisSource;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(instance = %config.instance, "Starting keywatch");

    // Sink first, then source: a misconfigured sink should stop the
    // process before a subscription exists.
    let sink = Arc::new(ClickHouseSink::connect(&config.sink, &config.instance).await?);
    let source = Arc::new(RedisSource::connect(&config.source).await?);
    let mut stream = source.subscribe().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut pipeline = Pipeline::new(source.clone(), sink.clone(), &config.instance);
    let mut worker = tokio::spawn(async move {
        let result = pipeline.run(&mut stream, shutdown_rx).await;
        stream.close().await;
        result
    });

    let mut sigterm = signal(SignalKind::terminate())?;

    // The worker exiting on its own means the stream failed; a signal
    // means the operator asked for a drain. Either way the shutdown
    // flag is flipped and the worker is joined.
    let mut early_result = None;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received interrupt, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        result = &mut worker => early_result = Some(result),
    }

    let _ = shutdown_tx.send(true);

    let pipeline_result = match early_result {
        Some(result) => result,
        None => worker.await,
    };

    if let Err(e) = sink.close().await {
        warn!(error = %e, "Sink close failed");
    }

    match pipeline_result {
        Ok(Ok(())) => {
            info!("keywatch stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Pipeline failed");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Pipeline task panicked");
            Err(e.into())
        }
    }
}
