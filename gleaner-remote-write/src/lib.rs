//! Encoding of finalized metric batches as Prometheus remote-write requests.
//!
//! [`RemoteWriteSerializer`] maps every metric event of a group to one time series with a single
//! sample. [`RemoteWriteEndpoint`] derives the request line and headers for a configured tenant.
//! Compression and delivery are the responsibility of the sink that receives the payload.
#![warn(missing_docs)]

mod proto;
mod request;
mod serializer;
mod statsd;

pub use self::proto::*;
pub use self::request::*;
pub use self::serializer::*;
