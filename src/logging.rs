//! Logging setup
//!
//! Diagnostics go to stderr through an `EnvFilter`. Bus traffic is emitted on
//! the [`TRAFFIC_TARGET`] tracing target; when a log directory is configured
//! that target is additionally written, one line per message, to a file
//! rotated daily.

use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Tracing target carrying one event per ingested bus message
pub const TRAFFIC_TARGET: &str = "knx_traffic";

/// File name prefix of the rotating traffic log
const TRAFFIC_FILE_PREFIX: &str = "knx-traffic.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,

    /// Directory for the traffic log
    pub traffic_dir: Option<PathBuf>,

    /// Ignore `RUST_LOG` and log everything at debug
    pub debug: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            traffic_dir: None,
            debug: false,
        }
    }
}

impl LogConfig {
    fn env_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::builder()
                .with_default_directive(self.level.into())
                .from_env_lossy()
        }
    }
}

/// Install the global subscriber
///
/// The returned guard flushes the traffic file on drop and must be kept alive
/// for the lifetime of the process.
pub fn init_logging(config: &LogConfig) -> std::io::Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(config.env_filter());

    let (traffic_layer, guard) = match &config.traffic_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, TRAFFIC_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .without_time()
                .with_filter(LevelFilter::INFO)
                .with_filter(filter_fn(|meta| meta.target() == TRAFFIC_TARGET));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(traffic_layer)
        .init();

    Ok(guard)
}
