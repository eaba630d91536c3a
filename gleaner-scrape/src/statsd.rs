use gleaner_statsd::{CounterMetric, DistributionMetric, GaugeMetric, TimerMetric};

/// Counter metrics for scrape scheduling.
pub enum ScrapeCounters {
    /// Number of completed scrapes.
    ///
    /// Tagged by `state`, the textual scrape state such as `OK` or `ERR_TIMEOUT`.
    Requests,
    /// Number of scrapes that were rescheduled after their regular time had already passed.
    Delays,
}

impl CounterMetric for ScrapeCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Requests => "scrape.requests",
            Self::Delays => "scrape.delays",
        }
    }
}

/// Distribution metrics for scrape scheduling.
pub enum ScrapeDistributions {
    /// Lateness of a rescheduled scrape in milliseconds.
    DelayMs,
    /// Number of samples read from one scrape response.
    Samples,
}

impl DistributionMetric for ScrapeDistributions {
    fn name(&self) -> &'static str {
        match *self {
            Self::DelayMs => "scrape.delay_ms",
            Self::Samples => "scrape.samples",
        }
    }
}

/// Gauge metrics for scrape scheduling.
pub enum ScrapeGauges {
    /// Size of the last scrape response body in bytes.
    ResponseSize,
}

impl GaugeMetric for ScrapeGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::ResponseSize => "scrape.response_size",
        }
    }
}

/// Timer metrics for scrape scheduling.
pub enum ScrapeTimers {
    /// Time from sending a scrape request until the response was read or the request failed.
    Duration,
}

impl TimerMetric for ScrapeTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::Duration => "scrape.duration",
        }
    }
}
