use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use gleaner_config::Scheme;
use tokio::time::Instant;

/// Media type requested from targets, the Prometheus text exposition format.
pub const ACCEPT: &str = "text/plain;version=0.0.4";

/// The user agent sent with scrape requests.
pub const USER_AGENT: &str = concat!("gleaner/", env!("CARGO_PKG_VERSION"));

/// A scrape request for a single target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrapeRequest {
    /// Whether to scrape over plain HTTP or TLS.
    pub scheme: Scheme,
    /// Host name or address of the target.
    pub host: String,
    /// Port of the target.
    pub port: u16,
    /// Path and query of the metrics endpoint.
    pub path: String,
    /// Upper bound for the whole request including the response body.
    pub timeout: Duration,
}

impl ScrapeRequest {
    /// Returns the full URL of the metrics endpoint.
    pub fn url(&self) -> String {
        if self.host.contains(':') {
            format!("{}://[{}]:{}{}", self.scheme, self.host, self.port, self.path)
        } else {
            format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
        }
    }
}

/// A completed scrape.
///
/// Any status code counts as a completed scrape. Whether it is a successful one is decided by the
/// scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrapeResponse {
    /// HTTP status code of the response.
    pub status: u16,
    /// The response body.
    pub body: Bytes,
    /// Time from sending the request until the body was read.
    pub elapsed: Duration,
}

impl ScrapeResponse {
    /// Returns `true` for a 2xx status code.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A scrape that did not produce a response.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The request did not complete within the scrape timeout.
    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),
    /// The connection to the target could not be established or broke.
    #[error("failed to connect to target")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The response body could not be read.
    #[error("failed to read response body")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Outcome of a scrape as reported by the `scrape_state` auto-metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrapeState {
    /// The target responded with a 2xx status.
    Ok,
    /// The scrape timed out.
    Timeout,
    /// The target was unreachable.
    ConnectionFailed,
    /// The target responded with a non-2xx status.
    Http(u16),
    /// The response body could not be read.
    ReadBody,
    /// The response contained more samples than the configured limit.
    SampleLimitExceeded,
}

impl ScrapeState {
    /// Classifies the result of a scrape request.
    pub fn from_result(result: &Result<ScrapeResponse, ScrapeError>) -> Self {
        match result {
            Ok(response) if response.is_success() => Self::Ok,
            Ok(response) => Self::Http(response.status),
            Err(ScrapeError::Timeout(_)) => Self::Timeout,
            Err(ScrapeError::Connect(_)) => Self::ConnectionFailed,
            Err(ScrapeError::Body(_)) => Self::ReadBody,
        }
    }

    /// Returns `true` if the target counts as up.
    pub fn is_up(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Timeout => f.write_str("ERR_TIMEOUT"),
            Self::ConnectionFailed => f.write_str("ERR_CONN_FAILED"),
            Self::Http(status) => write!(f, "ERR_HTTP_{status}"),
            Self::ReadBody => f.write_str("ERR_READ_BODY"),
            Self::SampleLimitExceeded => f.write_str("ERR_SAMPLE_LIMIT_EXCEEDED"),
        }
    }
}

/// Performs scrape requests against targets.
///
/// The scheduler depends only on this trait, so the transport can be swapped out, for instance
/// in tests.
pub trait ScrapeClient: Send + Sync + 'static {
    /// Fetches the metrics endpoint described by `request`.
    fn scrape(
        &self,
        request: ScrapeRequest,
    ) -> BoxFuture<'static, Result<ScrapeResponse, ScrapeError>>;
}

/// [`ScrapeClient`] on top of a shared `reqwest` connection pool.
#[derive(Clone, Debug, Default)]
pub struct HttpScrapeClient {
    client: reqwest::Client,
}

impl HttpScrapeClient {
    /// Creates a client with its own connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client sharing the given `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ScrapeClient for HttpScrapeClient {
    fn scrape(
        &self,
        request: ScrapeRequest,
    ) -> BoxFuture<'static, Result<ScrapeResponse, ScrapeError>> {
        let client = self.client.clone();

        Box::pin(async move {
            let started = Instant::now();
            let timeout = request.timeout;

            let response = client
                .get(request.url())
                .header(reqwest::header::ACCEPT, ACCEPT)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .timeout(timeout)
                .send()
                .await
                .map_err(|error| classify(error, timeout, ScrapeError::Connect))?;

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|error| classify(error, timeout, ScrapeError::Body))?;

            Ok(ScrapeResponse {
                status,
                body,
                elapsed: started.elapsed(),
            })
        })
    }
}

fn classify(
    error: reqwest::Error,
    timeout: Duration,
    otherwise: fn(Box<dyn std::error::Error + Send + Sync>) -> ScrapeError,
) -> ScrapeError {
    if error.is_timeout() {
        ScrapeError::Timeout(timeout)
    } else {
        otherwise(Box::new(error))
    }
}
