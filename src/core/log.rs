use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Installs the global subscriber. `RUST_LOG` overrides the default levels.
pub fn init_logging(verbose: bool) {
    let (level_filter, directives) = if verbose {
        (LevelFilter::DEBUG, "warn,cardpulse=debug")
    } else {
        (LevelFilter::INFO, "warn,cardpulse=info")
    };
    let app_filter = Targets::new()
        .with_target("cardpulse", level_filter)
        .with_default(LevelFilter::WARN);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(app_filter)
        .with(env_filter)
        .init();
}
