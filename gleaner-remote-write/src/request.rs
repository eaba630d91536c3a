use bytes::Bytes;
use gleaner_config::RemoteWriteConfig;
use url::Url;

/// Value of the `User-Agent` header sent with remote-write requests.
pub const USER_AGENT: &str = "RemoteWrite-v0.0.1";
/// Protocol version announced in [`REMOTE_WRITE_VERSION_HEADER`].
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";
/// Header carrying the protocol version.
pub const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";
/// Content type of an uncompressed `WriteRequest`.
pub const CONTENT_TYPE: &str = "application/x-protobuf";
/// Body encoding remote-write receivers expect.
///
/// Receivers require the `WriteRequest` compressed with snappy block format. The sink compresses
/// the body and sends this value as `Content-Encoding`.
pub const CONTENT_ENCODING: &str = "snappy";

/// An error returned when a remote-write destination cannot be derived from its config.
#[derive(Debug, thiserror::Error)]
pub enum RemoteWriteConfigError {
    /// A required field is empty.
    #[error("remote write config is missing `{0}`")]
    MissingField(&'static str),
    /// Endpoint and path do not form a valid URL.
    #[error("invalid remote write url")]
    InvalidUrl(#[source] url::ParseError),
}

/// The resolved destination of remote-write requests for one tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteWriteEndpoint {
    url: Url,
}

impl RemoteWriteEndpoint {
    /// Resolves the request URL from `{scheme}://{endpoint}{path}`.
    pub fn new(config: &RemoteWriteConfig) -> Result<Self, RemoteWriteConfigError> {
        for (field, value) in [
            ("Endpoint", &config.endpoint),
            ("UserId", &config.user_id),
            ("ClusterId", &config.cluster_id),
            ("Region", &config.region),
        ] {
            if value.is_empty() {
                return Err(RemoteWriteConfigError::MissingField(field));
            }
        }

        let url = format!(
            "{}://{}{}",
            config.scheme,
            config.endpoint,
            config.remote_write_path()
        );
        let url = Url::parse(&url).map_err(RemoteWriteConfigError::InvalidUrl)?;

        Ok(Self { url })
    }

    /// Returns the full request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Builds the request for a serialized payload.
    pub fn request(&self, body: Bytes) -> RemoteWriteRequest {
        RemoteWriteRequest {
            url: self.url.clone(),
            body,
        }
    }
}

/// A remote-write request ready to be compressed and sent by a sink.
///
/// The body is the plain protobuf encoding. Before sending, the sink must compress it with snappy
/// and add `Content-Encoding: snappy` (see [`CONTENT_ENCODING`]).
#[derive(Clone, Debug)]
pub struct RemoteWriteRequest {
    url: Url,
    body: Bytes,
}

impl RemoteWriteRequest {
    /// The HTTP method.
    pub fn method(&self) -> &'static str {
        "POST"
    }

    /// The request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers describing the uncompressed payload.
    ///
    /// The sink adds `Content-Encoding` with [`CONTENT_ENCODING`] once it compressed the body.
    pub fn headers(&self) -> [(&'static str, &'static str); 3] {
        [
            ("Content-Type", CONTENT_TYPE),
            ("User-Agent", USER_AGENT),
            (REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION),
        ]
    }

    /// The serialized `WriteRequest`.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the request and returns the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}
