use gleaner_statsd::{CounterMetric, DistributionMetric};

/// Counter metrics for remote-write serialization.
pub enum RemoteWriteCounters {
    /// Number of events skipped because they could not be encoded.
    SerializeErrors,
}

impl CounterMetric for RemoteWriteCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::SerializeErrors => "remote_write.serialize_errors",
        }
    }
}

/// Distribution metrics for remote-write serialization.
pub enum RemoteWriteDistributions {
    /// Number of time series per serialized request.
    Series,
}

impl DistributionMetric for RemoteWriteDistributions {
    fn name(&self) -> &'static str {
        match *self {
            Self::Series => "remote_write.series",
        }
    }
}
