// Logging setup via the tracing ecosystem: console layer always on,
// optional daily-rolling file layer

use std::path::Path;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system. RUST_LOG overrides the given level.
pub fn initialize_logging(log_dir: Option<&str>, log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false);

    // Option<Layer> composes as a no-op when no log dir was given
    let file = log_dir.map(|dir| {
        let path = Path::new(dir);
        if !path.exists() {
            let _ = std::fs::create_dir_all(path);
        }

        let appender = rolling::daily(dir, "geoquery.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        // the guard must live for the program duration
        std::mem::forget(guard);

        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();
}
