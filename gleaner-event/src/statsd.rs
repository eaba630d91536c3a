use gleaner_statsd::{CounterMetric, GaugeMetric, TimerMetric};

/// Counter metrics for the event pool.
pub enum EventPoolCounters {
    /// Number of pooled events freed by garbage collection.
    ///
    /// Tagged by `variant`.
    Reclaimed,
}

impl CounterMetric for EventPoolCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Reclaimed => "event_pool.reclaimed",
        }
    }
}

/// Gauge metrics for the event pool.
pub enum EventPoolGauges {
    /// Number of events left on a free-list after garbage collection.
    ///
    /// Tagged by `variant`.
    Pooled,
}

impl GaugeMetric for EventPoolGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::Pooled => "event_pool.pooled",
        }
    }
}

/// Timer metrics for the event pool.
pub enum EventPoolTimers {
    /// Time spent in one garbage collection cycle across all free-lists.
    GcDuration,
}

impl TimerMetric for EventPoolTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::GcDuration => "event_pool.gc_duration",
        }
    }
}
