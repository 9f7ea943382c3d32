use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// Verbosity 0 logs at INFO, 1 at DEBUG and anything higher at TRACE. The
/// `RUST_LOG` environment filter is honored on top of the maximum level.
pub fn setup_tracing(verbosity_level: u8) {
    let filter = match verbosity_level {
        0 => tracing::level_filters::LevelFilter::INFO,
        1 => tracing::level_filters::LevelFilter::DEBUG,
        _ => tracing::level_filters::LevelFilter::TRACE,
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(filter)
        .with_thread_names(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("unable to set global subscriber");
}
