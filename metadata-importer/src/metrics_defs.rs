use shared::metrics_defs::{MetricDef, MetricType};

pub const IMPORT_ROWS_UPSERTED: MetricDef = MetricDef {
    name: "import.rows.upserted",
    metric_type: MetricType::Counter,
    description: "Number of dataset rows written to the metadata store",
};

pub const IMPORT_ROWS_SKIPPED: MetricDef = MetricDef {
    name: "import.rows.skipped",
    metric_type: MetricType::Counter,
    description: "Number of malformed dataset rows that were skipped",
};

pub const IMPORT_FAILURE: MetricDef = MetricDef {
    name: "import.failure",
    metric_type: MetricType::Counter,
    description: "Number of imports that did not complete. Tagged with reason.",
};

pub const ALL_METRICS: &[MetricDef] = &[IMPORT_ROWS_UPSERTED, IMPORT_ROWS_SKIPPED, IMPORT_FAILURE];
