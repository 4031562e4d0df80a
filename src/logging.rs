use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `RUST_LOG` wins over `debug`.
///
/// Logs go to stderr so they do not tangle with the progress lines on stdout.
pub fn init(debug: bool) {
    let default = if debug {
        "hemnet=debug"
    } else {
        "hemnet=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
