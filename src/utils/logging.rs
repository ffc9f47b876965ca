use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    };

    if let Err(err) = result {
        eprintln!("tracing already initialised: {err}");
    }
}

fn default_directive(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        "slack_archiver=info".to_string()
    } else if level.contains('=') {
        level.to_string()
    } else {
        format!("slack_archiver={level},warn")
    }
}
