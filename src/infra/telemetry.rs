use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    application::dispatcher::METRIC_COMMAND_TOTAL,
    cache,
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the process-wide subscriber. JSON output flattens event fields
/// so `source`, `keyword` and `command` land at the top level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Every counter the bot records, with its description.
const COUNTERS: [(&str, &str); 8] = [
    (
        cache::METRIC_KEYWORD_HIT,
        "Keyword cache lookups answered with a description.",
    ),
    (
        cache::METRIC_KEYWORD_TOMBSTONE,
        "Keyword cache lookups answered with a tombstone.",
    ),
    (
        cache::METRIC_KEYWORD_MISS,
        "Keyword cache lookups that fell through to the repository.",
    ),
    (
        cache::METRIC_KEYWORD_EVICT,
        "Keyword cache entries evicted due to capacity.",
    ),
    (cache::METRIC_NAME_HIT, "Display-name cache hits."),
    (
        cache::METRIC_NAME_MISS,
        "Display-name cache misses, expired entries included.",
    ),
    (
        cache::METRIC_CACHE_ERROR,
        "Cache operations that failed and were absorbed.",
    ),
    (METRIC_COMMAND_TOTAL, "Parsed chat commands by command name."),
];

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, description) in COUNTERS {
            describe_counter!(name, Unit::Count, description);
        }
    });
}
