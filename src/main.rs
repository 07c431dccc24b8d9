//! Kinesis motion-estimation streaming pipeline

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kinesis::capture::v4l2::{auto_detect_device, V4l2Source};
use kinesis::engine::BlockMatcher;
use kinesis::error::exit_code;
use kinesis::input;
use kinesis::net::UdpSink;
use kinesis::pipeline::{control_pair, stats, PipelineController};
use kinesis::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize error handling and logging
    if let Err(e) = color_eyre::install() {
        eprintln!("Failed to install error handler: {e}");
        return ExitCode::from(exit_code::FAILURE);
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kinesis=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Kinesis launching...");

    // Load and validate configuration
    let config_path = std::env::args().nth(1);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration rejected: {e}");
            return ExitCode::from(exit_code::INVALID_CONFIG);
        }
    };
    if let Err(e) = config.validate() {
        error!("Configuration rejected: {e}");
        return ExitCode::from(exit_code::INVALID_CONFIG);
    }
    kinesis::CONFIG.store(Arc::new(config.clone()));

    // Auto-detect capture device if needed
    let mut source_config = config.source.clone();
    if source_config.device.is_empty() {
        match auto_detect_device() {
            Ok((device, format)) => {
                source_config.device = device;
                source_config.format = format;
            }
            Err(e) => {
                error!("{e:#}");
                return ExitCode::from(exit_code::NO_SOURCE);
            }
        }
    }
    info!("Using capture device: {}", source_config.device);

    let dest: SocketAddr = match config.sink.address.parse() {
        Ok(dest) => dest,
        Err(_) => {
            error!("Sink address is not host:port: {:?}", config.sink.address);
            return ExitCode::from(exit_code::INVALID_CONFIG);
        }
    };

    // Assemble collaborators
    let source = V4l2Source::new(source_config);
    let engine = BlockMatcher::new();
    let sink = UdpSink::new(dest, config.sink.mtu);

    let (handle, view) = control_pair();
    input::spawn_listeners(handle);

    let (report_tx, report_rx) = flume::bounded(config.pipeline.report_channel_depth);
    tokio::spawn(stats::report_logger(
        report_rx,
        Duration::from_secs(config.pipeline.report_interval_secs),
    ));

    let controller = PipelineController::new(source, engine, sink, view, config.controller_settings())
        .with_reports(report_tx);

    match controller.run().await {
        Ok(()) => {
            info!("Kinesis shutting down");
            ExitCode::from(exit_code::SUCCESS)
        }
        Err(e) => {
            error!("Pipeline failed: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
