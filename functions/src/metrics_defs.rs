use shared::metrics_defs::{MetricDef, MetricType};

pub const FUNCTION_INVOCATIONS: MetricDef = MetricDef {
    name: "function.invocations",
    metric_type: MetricType::Counter,
    description: "Function invocations. Tagged with function, trigger, outcome.",
};

pub const FUNCTION_DURATION: MetricDef = MetricDef {
    name: "function.duration",
    metric_type: MetricType::Histogram,
    description: "Function invocation duration in seconds. Tagged with function, trigger.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of HTTP requests currently being processed",
};

pub const ALL_METRICS: &[MetricDef] = &[FUNCTION_INVOCATIONS, FUNCTION_DURATION, REQUESTS_INFLIGHT];
