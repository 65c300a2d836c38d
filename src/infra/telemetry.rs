use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
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

/// Register descriptions for every metric the crate emits. Idempotent.
fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "penwell_cache_hit_total",
            Unit::Count,
            "Total number of cache hits, labelled by tier."
        );
        describe_counter!(
            "penwell_cache_miss_total",
            Unit::Count,
            "Total number of cache misses."
        );
        describe_counter!(
            "penwell_cache_degraded_total",
            Unit::Count,
            "Total number of cache operations that failed open, labelled by operation."
        );
        describe_counter!(
            "penwell_cache_invalidated_total",
            Unit::Count,
            "Total number of persistent cache entries removed by invalidation."
        );
        describe_histogram!(
            "penwell_cache_cleanup_ms",
            Unit::Milliseconds,
            "Cache cleanup pass latency in milliseconds."
        );
        describe_counter!(
            "penwell_tx_conflict_total",
            Unit::Count,
            "Total number of optimistic transaction conflicts, labelled by collection."
        );
        describe_counter!(
            "penwell_tx_exhausted_total",
            Unit::Count,
            "Total number of transactions that ran out of retry attempts."
        );
    });
}
