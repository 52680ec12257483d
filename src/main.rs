//! fleetwire: GT06 device gateway.
//!
//! Configuration comes from `FLEETWIRE_*` environment variables and an
//! optional YAML file named by `FLEETWIRE_CONFIG`. Telemetry is kept in memory.

use std::sync::Arc;

use anyhow::Context;
use tokio_stream::StreamExt;
use tracing::{error, info};

use fleetwire::logging::init_logging;
use fleetwire::{Gateway, GatewayConfig, MemorySink, SessionEvent};

fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().context("loading configuration")?;
    init_logging(&config.log_filter)?;

    info!(version = env!("CARGO_PKG_VERSION"), "fleetwire starting");
    info!(
        checksum = config.checksum.name(),
        imei = ?config.imei_encoding,
        date = ?config.date_encoding,
        "Frame format"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("fleetwire")
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let gateway = Gateway::for_devices(config, sink.clone());

    let events = gateway.registry().events();
    tokio::spawn(async move {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            if let SessionEvent::Superseded { imei, previous, current } = event {
                info!(%imei, "Device reconnected: {} replaced {}", current, previous);
            }
        }
    });

    let shutdown = gateway.cancel_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for ctrl-c: {}", e);
            return;
        }
        info!("Interrupt received, shutting down");
        shutdown.cancel();
    });

    gateway.run().await.context("gateway failed")?;

    let stats = gateway.dispatcher().stats();
    info!(
        devices = sink.len().await,
        "Stored {} records ({} dropped, {} failed)",
        stats.written, stats.dropped, stats.failed
    );
    Ok(())
}
