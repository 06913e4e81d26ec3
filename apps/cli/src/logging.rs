use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console logging, filter taken from `RUST_LOG` with an info default.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pace=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
