use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Logs go to stderr; stdout carries command summaries and the
/// machine-readable result lines. `RUST_LOG` overrides `default_level`, and
/// an unparsable level falls back to `info`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
