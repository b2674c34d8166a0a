mod binary;
mod command;
mod config;
mod engine;
mod error;
mod framing;
mod hal;
mod ota;
mod response;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use command::handlers::default_registry;
use command::registry::HandlerRegistry;
use config::{DeviceConfig, TransportKind};
use engine::{Engine, EngineStats};
use hal::sim::SimBackend;
use hal::DeviceBackend;
use transport::{SerialSource, TcpSource, TransportSource, TransportStream};

/// How long a read may stall before the idle flush is checked
const READ_POLL: Duration = Duration::from_millis(20);
const READ_CHUNK: usize = 512;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = DeviceConfig::from_env();

    info!("webserial device starting");
    info!("  fs root: {}", config.fs_root.display());

    let backend: Arc<dyn DeviceBackend> = Arc::new(SimBackend::new(&config.fs_root));
    let stats = Arc::new(EngineStats::new());
    let registry = Arc::new(default_registry(backend.clone(), stats.clone()));

    match config.transport.clone() {
        TransportKind::Tcp { listen } => {
            let source = TcpSource::bind(&listen).await?;
            serve(source, config, backend, stats, registry).await
        }
        TransportKind::Serial { path, baudrate } => {
            let source = SerialSource::new(path, baudrate);
            serve(source, config, backend, stats, registry).await
        }
    }
}

/// Serve host links one at a time until a reboot is requested
async fn serve<S: TransportSource>(
    mut source: S,
    config: DeviceConfig,
    backend: Arc<dyn DeviceBackend>,
    stats: Arc<EngineStats>,
    registry: Arc<HandlerRegistry>,
) -> Result<()> {
    loop {
        let mut stream = match source.next().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("{} link unavailable: {e}", source.name());
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        // Framing, binary capture, and OTA state are per-link
        let mut engine = Engine::new(&config, registry.clone(), backend.clone(), stats.clone());

        match serve_stream(&mut stream, &mut engine).await {
            Ok(()) => info!("host disconnected"),
            Err(e) => warn!("host link dropped: {e}"),
        }

        if engine.reboot_requested() {
            info!("reboot requested, resetting device");
            let _ = TransportStream::shutdown(&mut stream).await;
            backend
                .reboot()
                .await
                .map_err(|e| anyhow::anyhow!("reboot failed: {e}"))?;
            return Ok(());
        }
    }
}

/// Pump one host link: bytes in, reply lines out
async fn serve_stream<S: TransportStream>(stream: &mut S, engine: &mut Engine) -> Result<()> {
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let lines = match timeout(READ_POLL, stream.read(&mut buf)).await {
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(n)) => engine.feed(&buf[..n], Instant::now()).await,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => engine.check_flush(Instant::now()).await,
        };

        write_lines(stream, &lines).await?;

        if engine.reboot_requested() {
            stream.flush().await?;
            return Ok(());
        }
    }
}

async fn write_lines<S: TransportStream>(stream: &mut S, lines: &[String]) -> Result<()> {
    for line in lines {
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
    }
    if !lines.is_empty() {
        stream.flush().await?;
    }
    Ok(())
}
