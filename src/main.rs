//! Framepace demo: a synthetic renderer that goes idle, the pacer filling
//! the gaps, and a consumer standing in for the encoder.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use flume::bounded;
use tracing::{error, info, warn};

use framepace::capture::SyntheticSource;
use framepace::{ChannelSet, Config, FramePacer, PacerThread};

/// What the encoder stage would receive.
struct EncoderInput {
    pts: u64,
    duplicate: bool,
    pixels: Bytes,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("Framepace launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    framepace::CONFIG.store(Arc::new(config.clone()));

    let channels = Arc::new(ChannelSet::new(config.pipeline.channels));
    let pacer = Arc::new(FramePacer::new(config.clone(), channels.clone())?);
    let pacer_thread = PacerThread::spawn(Arc::clone(&pacer))?;

    let running = Arc::new(AtomicBool::new(true));

    // Renderer: bursts of scene changes separated by idle stretches
    let renderer = {
        let pacer = Arc::clone(&pacer);
        let running = Arc::clone(&running);
        let (width, height) = (config.capture.output_width, config.capture.output_height);
        let format = config.capture.pixel_format;
        let frame_period = Duration::from_micros(1_000_000 / u64::from(config.pacing.target_fps));
        thread::Builder::new()
            .name("renderer".to_string())
            .spawn(move || {
                let mut source = SyntheticSource::new(width, height, format);
                let mut presented = 0u64;
                while running.load(Ordering::Relaxed) {
                    if let Err(e) = pacer.capture(&mut source) {
                        error!("Capture error: {}", e);
                        if e.is_fatal() {
                            break;
                        }
                    }
                    source.advance();
                    presented += 1;
                    if presented % 60 == 0 {
                        info!("Renderer idle for 1s");
                        thread::sleep(Duration::from_secs(1));
                    } else {
                        thread::sleep(frame_period);
                    }
                }
            })?
    };

    // Set up tx/rx between the exchange consumer and the "encoder"
    let (tx, rx) = bounded::<EncoderInput>(4);

    let consumer = {
        let primary = channels.primary();
        let running = Arc::clone(&running);
        tokio::task::spawn_blocking(move || {
            while running.load(Ordering::Relaxed) {
                let Some(frame) = primary.recv_timeout(Duration::from_millis(100)) else {
                    continue;
                };
                let input = EncoderInput {
                    pts: frame.meta.pts,
                    duplicate: frame.meta.duplicate,
                    pixels: frame.into_bytes(),
                };
                if tx.send(input).is_err() {
                    break;
                }
            }
        })
    };

    let encoder = tokio::spawn(async move {
        let started = Instant::now();
        let mut received = 0u64;
        let mut duplicates = 0u64;
        while let Ok(input) = rx.recv_async().await {
            received += 1;
            if input.duplicate {
                duplicates += 1;
            }
            if received % 30 == 0 {
                let secs = started.elapsed().as_secs_f64();
                info!(
                    "Encoder: pts={} bytes={} frames={} duplicates={} rate={:.1}fps",
                    input.pts,
                    input.pixels.len(),
                    received,
                    duplicates,
                    received as f64 / secs
                );
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    running.store(false, Ordering::Relaxed);

    renderer
        .join()
        .map_err(|_| eyre!("Renderer thread panicked"))?;
    pacer_thread.stop();
    consumer.await?;
    if let Err(e) = encoder.await {
        warn!("Encoder task ended abnormally: {}", e);
    }

    let stats = pacer.stats();
    info!(
        "Framepace shutting down: captured={} duplicated={} skipped={}",
        stats.captured, stats.duplicated, stats.skipped
    );
    Ok(())
}

#[cfg(not(feature = "profiling"))]
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}

#[cfg(feature = "profiling")]
fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(default_filter())
        .with(tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()))
        .with(tracing_tracy::TracyLayer::default())
        .init();
}

fn default_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("framepace=debug"))
}
