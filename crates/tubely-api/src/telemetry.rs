use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str =
    "tubely_api=debug,tubely_processing=debug,tubely_storage=debug,tubely_db=debug,tower_http=debug";

/// Install the global subscriber: compact console output in development,
/// JSON lines in production. `RUST_LOG` overrides the default filter.
pub fn init_telemetry(is_production: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if is_production {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        let console_fmt = tracing_subscriber::fmt::layer().event_format(
            Format::default()
                .compact()
                .with_target(false)
                .without_time(),
        );
        tracing_subscriber::registry()
            .with(filter)
            .with(console_fmt)
            .init();
    }
}
