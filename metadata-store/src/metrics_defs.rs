//! Metrics definitions for the metadata store.

use shared::metrics_defs::{MetricDef, MetricType};

pub const STORE_REQUEST_DURATION: MetricDef = MetricDef {
    name: "metadata_store.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of metadata store requests in seconds. Tagged with op.",
};

pub const STORE_REQUEST_FAILURE: MetricDef = MetricDef {
    name: "metadata_store.request.failure",
    metric_type: MetricType::Counter,
    description: "Number of failed metadata store requests. Tagged with op.",
};

pub const ALL_METRICS: &[MetricDef] = &[STORE_REQUEST_DURATION, STORE_REQUEST_FAILURE];
