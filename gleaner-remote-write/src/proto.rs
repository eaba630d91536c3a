//! Remote-write wire messages.
//!
//! Only the fields written by this crate are declared. Unknown fields of newer protocol
//! revisions are skipped by prost when decoding.

/// A batch of time series.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRequest {
    /// All series of the batch.
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// A labeled series of samples.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeSeries {
    /// Labels identifying the series, including `__name__`.
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    /// Samples in timestamp order.
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

/// A single label pair.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Label {
    /// Label name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Label value.
    #[prost(string, tag = "2")]
    pub value: String,
}

/// A single sample.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Sample {
    /// Sample value.
    #[prost(double, tag = "1")]
    pub value: f64,
    /// Milliseconds since the UNIX epoch.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}
