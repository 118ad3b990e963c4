//! Metrics definitions for the discovery store.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SNAPSHOT_REBUILDS: MetricDef = MetricDef {
    name: "discovery.snapshot.rebuild",
    metric_type: MetricType::Counter,
    description: "Number of times the merged document was encoded and hashed",
};

pub const REQUESTS: MetricDef = MetricDef {
    name: "discovery.request",
    metric_type: MetricType::Counter,
    description: "Discovery requests served. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[SNAPSHOT_REBUILDS, REQUESTS];
