use std::env::var;
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    Layer, Registry, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// File name prefix of the daily rolling log files.
const LOG_FILE_PREFIX: &str = "bump.log";

/// Keeps the background file writer alive. Lines logged after it drops are lost.
pub type LogGuard = Option<WorkerGuard>;

pub fn init() -> LogGuard {
    init_with(LevelFilter::INFO, None)
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. `RUST_LOG_FORMAT=json` switches the
/// console output to JSON lines. When `log_dir` is given, a daily rolling file
/// is written there as well.
pub fn init_with(level: LevelFilter, log_dir: Option<&Path>) -> LogGuard {
    let env_filter =
        || EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter()).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter())
            .boxed(),
    };
    layers.push(console_layer);

    let guard = log_dir.map(|directory| {
        let (writer, guard) = tracing_appender::non_blocking(rolling::daily(directory, LOG_FILE_PREFIX));
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter())
                .boxed(),
        );
        guard
    });

    tracing_subscriber::registry().with(layers).init();

    guard
}
