use bytes::Bytes;
use gleaner_event::{Event, EventGroup, EventVariant, MetricEvent, NAME_LABEL};
use gleaner_statsd::metric;
use prost::Message;

use crate::statsd::{RemoteWriteCounters, RemoteWriteDistributions};
use crate::{Label, Sample, TimeSeries, WriteRequest};

/// An event that could not be encoded.
///
/// Serialization errors never abort a batch. They are collected next to the payload.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    /// Only metric events map to time series.
    #[error("event is not a metric event, found {0} event")]
    NotAMetric(EventVariant),
}

/// The result of serializing one batch.
#[derive(Debug)]
pub struct Serialized {
    /// The encoded `WriteRequest`, uncompressed.
    pub payload: Bytes,
    /// Number of time series in the payload.
    pub series: usize,
    /// Events that were skipped.
    pub errors: Vec<SerializeError>,
}

/// Encodes event groups as remote-write requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoteWriteSerializer;

impl RemoteWriteSerializer {
    /// Creates a serializer.
    pub fn new() -> Self {
        Self
    }

    /// Maps all metric events to time series, skipping and reporting all other events.
    pub fn build_request(&self, events: &[Event]) -> (WriteRequest, Vec<SerializeError>) {
        let mut request = WriteRequest {
            timeseries: Vec::with_capacity(events.len()),
        };
        let mut errors = Vec::new();

        for event in events {
            match event.as_metric() {
                Some(metric) => request.timeseries.push(time_series(metric)),
                None => {
                    let error = SerializeError::NotAMetric(event.variant());
                    gleaner_log::error!(
                        error = &error as &dyn std::error::Error,
                        "skipping event during remote-write serialization"
                    );
                    errors.push(error);
                }
            }
        }

        (request, errors)
    }

    /// Serializes a finalized group into a single buffer.
    pub fn serialize(&self, group: &EventGroup) -> Serialized {
        let (request, errors) = self.build_request(group.events());
        let series = request.timeseries.len();

        metric!(counter(RemoteWriteCounters::SerializeErrors) += errors.len() as i64);
        metric!(distribution(RemoteWriteDistributions::Series) = series as u64);

        Serialized {
            payload: Bytes::from(request.encode_to_vec()),
            series,
            errors,
        }
    }
}

fn time_series(event: &MetricEvent) -> TimeSeries {
    let tags = event.tags();
    let mut labels: Vec<Label> = tags
        .iter()
        .map(|(name, value)| Label {
            name: name.to_owned(),
            value: value.to_owned(),
        })
        .collect();

    if tags.get(NAME_LABEL).is_empty() {
        labels.push(Label {
            name: NAME_LABEL.to_owned(),
            value: event.name().to_owned(),
        });
    }

    TimeSeries {
        labels,
        samples: vec![Sample {
            value: event.value().as_f64(),
            timestamp: event.timestamp().as_millis(),
        }],
    }
}
