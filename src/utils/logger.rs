use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `CONJURE_LOG` takes `RUST_LOG` syntax; warnings only by default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("CONJURE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
