use gleaner_statsd::CounterMetric;

/// Counter metrics for relabeling.
pub enum RelabelCounters {
    /// Number of metric events removed by the rule chain or for not being metrics.
    Dropped,
    /// Incremented when auto-metrics cannot be added because the scrape timestamp is missing.
    AutoMetricsSkipped,
}

impl CounterMetric for RelabelCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Dropped => "relabel.dropped",
            Self::AutoMetricsSkipped => "relabel.auto_metrics_skipped",
        }
    }
}
