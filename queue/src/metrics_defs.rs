//! Metrics definitions for the queue broker.

use shared::metrics_defs::{MetricDef, MetricType};

pub const MESSAGES_SENT: MetricDef = MetricDef {
    name: "queue.messages.sent",
    metric_type: MetricType::Counter,
    description: "Messages accepted by the broker. Tagged with queue.",
};

pub const MESSAGES_COMPLETED: MetricDef = MetricDef {
    name: "queue.messages.completed",
    metric_type: MetricType::Counter,
    description: "Messages completed by a receiver. Tagged with queue.",
};

pub const MESSAGES_ABANDONED: MetricDef = MetricDef {
    name: "queue.messages.abandoned",
    metric_type: MetricType::Counter,
    description: "Messages explicitly abandoned by a receiver. Tagged with queue.",
};

pub const MESSAGES_DEAD_LETTERED: MetricDef = MetricDef {
    name: "queue.messages.dead_lettered",
    metric_type: MetricType::Counter,
    description: "Messages moved to the dead-letter list after max deliveries. Tagged with queue.",
};

pub const QUEUE_DEPTH: MetricDef = MetricDef {
    name: "queue.depth",
    metric_type: MetricType::Gauge,
    description: "Available plus locked messages. Tagged with queue.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    MESSAGES_SENT,
    MESSAGES_COMPLETED,
    MESSAGES_ABANDONED,
    MESSAGES_DEAD_LETTERED,
    QUEUE_DEPTH,
];
