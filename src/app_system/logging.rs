/// Installs the global `tracing` subscriber.
///
/// Filtering follows `RUST_LOG` and falls back to `info`. Calling it more than
/// once is harmless; only the first call installs anything.
pub fn setup_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .compact()
        .try_init();
}
