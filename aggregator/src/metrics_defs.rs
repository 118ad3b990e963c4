//! Metrics definitions for the aggregation controller.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PULL_DURATION: MetricDef = MetricDef {
    name: "aggregator.pull.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent pulling one source, in seconds. Tagged with outcome: success, legacy or failure.",
};

pub const PULL_FAILURES: MetricDef = MetricDef {
    name: "aggregator.pull.failure",
    metric_type: MetricType::Counter,
    description: "Pulls that failed on both the aggregated and the legacy path",
};

pub const LEGACY_FALLBACKS: MetricDef = MetricDef {
    name: "aggregator.legacy_fallback",
    metric_type: MetricType::Counter,
    description: "Pulls that fell back to the legacy resource listing",
};

pub const SOURCES: MetricDef = MetricDef {
    name: "aggregator.sources",
    metric_type: MetricType::Gauge,
    description: "Number of registered backend sources",
};

pub const ALL_METRICS: &[MetricDef] = &[PULL_DURATION, PULL_FAILURES, LEGACY_FALLBACKS, SOURCES];
