//! Self-monitoring metrics for the scrape pipeline, built on cadence.
//!
//! The pipeline reports on itself (scrape delays, response sizes, pool reclamation) through this
//! crate. From the pipeline's perspective the sink is write-only: nothing reads these values back.
//!
//! ## Defining Metrics
//!
//! Metrics are declared as enums implementing one of [`CounterMetric`], [`GaugeMetric`],
//! [`DistributionMetric`] or [`TimerMetric`]. The traits only provide a type safe name, which
//! ensures that a counter cannot be recorded as a gauge by accident.
//!
//! ## Reporting to StatsD
//!
//! Metrics can be recorded without initializing a client. In that case the [`metric!`] macro is a
//! noop. Use [`init`] to report to a StatsD server:
//!
//! ```no_run
//! use gleaner_statsd::MetricsClientConfig;
//!
//! gleaner_statsd::init(MetricsClientConfig {
//!     prefix: "gleaner",
//!     host: "localhost:8125",
//!     default_tags: Default::default(),
//!     sample_rate: 1.0.into(),
//!     aggregate: true,
//! })
//! .ok();
//! ```
//!
//! ## Macro Usage
//!
//! ```
//! use gleaner_statsd::{metric, CounterMetric};
//!
//! enum ScrapeCounters {
//!     Requests,
//! }
//!
//! impl CounterMetric for ScrapeCounters {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::Requests => "scrape.requests",
//!         }
//!     }
//! }
//!
//! metric!(counter(ScrapeCounters::Requests) += 1, state = "OK");
//! ```

use std::collections::BTreeMap;
use std::io;
use std::net::ToSocketAddrs;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use cadence::{Metric, MetricBuilder, StatsdClient};
use parking_lot::RwLock;
use rand::Rng;
use rand::distr::StandardUniform;
use statsdproxy::cadence::StatsdProxyMetricSink;
use statsdproxy::config::AggregateMetricsConfig;
use statsdproxy::middleware::aggregate::AggregateMetrics;
use statsdproxy::middleware::upstream::Upstream;

mod macros;
mod metrics;

pub use self::metrics::*;

/// Interval at which aggregated metrics are flushed to the upstream.
const AGGREGATE_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Sample rate applied to every metric, clamped to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate(f64);

impl SampleRate {
    /// Returns the sample rate as a fraction.
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

/// The process-wide statsd client with default tags and sampling.
#[derive(Debug)]
pub struct MetricsClient {
    /// Underlying cadence client that formats and ships the lines.
    pub statsd_client: StatsdClient,
    /// Tags attached to each emitted line, such as the host name.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate.
    pub sample_rate: SampleRate,
}

/// Settings consumed by [`init`] to build a [`MetricsClient`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix which is prepended to all metric names.
    pub prefix: &'a str,
    /// Address of the StatsD server.
    pub host: A,
    /// Tags attached to each emitted line.
    pub default_tags: BTreeMap<String, String>,
    /// Fraction of metrics that are actually sent.
    pub sample_rate: SampleRate,
    /// Pre-aggregates counters and gauges in-process before sending.
    pub aggregate: bool,
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Sends a metric with the default tags defined on this client.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        if !self.should_send() {
            return;
        }

        for (k, v) in &self.default_tags {
            metric = metric.with_tag(k, v);
        }

        if let Err(error) = metric.try_send() {
            gleaner_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to send a self-monitoring metric",
            );
        }
    }

    fn should_send(&self) -> bool {
        let rate = self.sample_rate.as_f64();
        if rate <= 0.0 {
            false
        } else if rate >= 1.0 {
            true
        } else {
            let sample: f64 = rand::rng().sample(StandardUniform);
            sample <= rate
        }
    }
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: std::cell::RefCell<Option<Arc<MetricsClient>>> =
        METRICS_CLIENT.read().clone().into();
}

/// Internal prelude for the macro.
#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// Sets a new global statsd client.
pub fn set_client(client: MetricsClient) {
    *METRICS_CLIENT.write() = Some(Arc::new(client));
    CURRENT_CLIENT.with(|cell| cell.replace(METRICS_CLIENT.read().clone()));
}

/// Disables the global client again.
pub fn disable() {
    *METRICS_CLIENT.write() = None;
    CURRENT_CLIENT.with(|cell| cell.replace(None));
}

/// Runs `f` with a capturing client installed on the current thread and returns all lines
/// emitted in the meantime.
///
/// Other threads keep using the global client.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let test_client = MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: Default::default(),
        sample_rate: 1.0.into(),
    };

    CURRENT_CLIENT.with(|cell| {
        let old_client = cell.replace(Some(Arc::new(test_client)));
        f();
        cell.replace(old_client);
    });

    drain_lines(rx)
}

fn drain_lines(rx: crossbeam_channel::Receiver<Vec<u8>>) -> Vec<String> {
    rx.try_iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}

/// Configures the global client to report to a statsd server.
///
/// Fails if the host cannot be resolved.
pub fn init<A: ToSocketAddrs>(config: MetricsClientConfig<'_, A>) -> io::Result<()> {
    let addr = config
        .host
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "statsd host did not resolve"))?;

    gleaner_log::info!("reporting metrics to statsd at {addr}");
    gleaner_log::debug!("metrics sample rate is set to {}", config.sample_rate.as_f64());

    // The sink factory has no error channel. Creating the upstream only binds a local UDP socket.
    let statsd_client = if config.aggregate {
        let sink = StatsdProxyMetricSink::new(move || {
            let upstream =
                Upstream::new(addr).expect("failed to create statsdproxy metric sink");

            AggregateMetrics::new(
                AggregateMetricsConfig {
                    aggregate_gauges: true,
                    aggregate_counters: true,
                    flush_interval: AGGREGATE_FLUSH_INTERVAL,
                    flush_offset: 0,
                    max_map_size: None,
                },
                upstream,
            )
        });
        StatsdClient::from_sink(config.prefix, sink)
    } else {
        let sink = StatsdProxyMetricSink::new(move || {
            Upstream::new(addr).expect("failed to create statsdproxy metric sink")
        });
        StatsdClient::from_sink(config.prefix, sink)
    };

    set_client(MetricsClient {
        statsd_client,
        default_tags: config.default_tags,
        sample_rate: config.sample_rate,
    });

    Ok(())
}

/// Invokes a callback with the current statsd client.
///
/// If statsd is not configured the callback is not invoked. For the most part the [`metric!`]
/// macro should be used instead.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|client| {
        if let Some(client) = client.borrow().as_deref() {
            f(client)
        } else {
            R::default()
        }
    })
}
