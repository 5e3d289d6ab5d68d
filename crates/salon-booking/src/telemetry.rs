use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. HTTP client internals stay quiet.
pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn,r2d2=warn";

/// Install the global subscriber. A second call keeps the first subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
