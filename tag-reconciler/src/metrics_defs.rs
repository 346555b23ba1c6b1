use shared::metrics_defs::{MetricDef, MetricType};

pub const EVENTS_RECEIVED: MetricDef = MetricDef {
    name: "events.received",
    metric_type: MetricType::Counter,
    description: "Number of event batches received. Tagged with action.",
};

pub const EVENTS_FILTERED: MetricDef = MetricDef {
    name: "events.filtered",
    metric_type: MetricType::Counter,
    description: "Number of tag write events dropped to avoid retriggering",
};

pub const RECONCILE_SUCCESS: MetricDef = MetricDef {
    name: "reconcile.success",
    metric_type: MetricType::Counter,
    description: "Number of resources whose tags were updated",
};

pub const RECONCILE_FAILURE: MetricDef = MetricDef {
    name: "reconcile.failure",
    metric_type: MetricType::Counter,
    description: "Number of failed resource reconciliations. Tagged with reason.",
};

pub const RECONCILE_DURATION: MetricDef = MetricDef {
    name: "reconcile.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a single resource reconciliation in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    EVENTS_RECEIVED,
    EVENTS_FILTERED,
    RECONCILE_SUCCESS,
    RECONCILE_FAILURE,
    RECONCILE_DURATION,
];
