/// A metric that counts occurrences, such as scrape requests per state.
///
/// ```
/// use gleaner_statsd::{metric, CounterMetric};
///
/// struct Delays;
///
/// impl CounterMetric for Delays {
///     fn name(&self) -> &'static str {
///         "scrape.delays"
///     }
/// }
///
/// metric!(counter(Delays) += 1, job = "node");
/// ```
pub trait CounterMetric {
    /// Name of the counter, without the client prefix.
    fn name(&self) -> &'static str;
}

/// A metric that records the current value of something, such as the size of the last response.
pub trait GaugeMetric {
    /// Name of the gauge, without the client prefix.
    fn name(&self) -> &'static str;
}

/// A metric that records a sample of a value distribution.
///
/// ```
/// use gleaner_statsd::{metric, DistributionMetric};
///
/// struct SamplesScraped;
///
/// impl DistributionMetric for SamplesScraped {
///     fn name(&self) -> &'static str {
///         "scrape.samples"
///     }
/// }
///
/// metric!(distribution(SamplesScraped) = 128u64);
/// ```
pub trait DistributionMetric {
    /// Name of the distribution, without the client prefix.
    fn name(&self) -> &'static str;
}

/// A distribution of durations, reported in milliseconds.
///
/// Timers can record a [`Duration`](std::time::Duration) directly or measure a block:
///
/// ```
/// use gleaner_statsd::{metric, TimerMetric};
///
/// struct GcDuration;
///
/// impl TimerMetric for GcDuration {
///     fn name(&self) -> &'static str {
///         "event_pool.gc_duration"
///     }
/// }
///
/// let reclaimed = metric!(timer(GcDuration), {
///     // reclaim pooled events
///     16
/// });
/// # assert_eq!(reclaimed, 16);
/// ```
pub trait TimerMetric {
    /// Name of the timer, without the client prefix.
    fn name(&self) -> &'static str;
}
