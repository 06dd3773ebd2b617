//! Structured logging.
//!
//! `RUST_LOG` takes precedence over the configured level. Output is pretty
//! text or JSON lines on stdout, optionally mirrored to a daily-rolled file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging(config: &ObservabilityConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("silkroad_proxy={0},tower_http={0}", config.log_level).into()
    });

    let stdout_layer = if config.json_logs {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "silkroad.log".into());
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer).boxed()),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
    guard
}
