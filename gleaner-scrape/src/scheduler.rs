use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use gleaner_config::ScrapeConfig;
use gleaner_event::{EventGroup, GroupMetadataKey, PoolHandle, Timestamp};
use gleaner_statsd::metric;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::exposition::read_exposition;
use crate::statsd::{ScrapeCounters, ScrapeDistributions, ScrapeGauges, ScrapeTimers};
use crate::target::{PromTargetInfo, first_scrape_delay_ms};
use crate::timer::{Timer, TimerEvent, TimerHandle};
use crate::{ScrapeClient, ScrapeError, ScrapeRequest, ScrapeResponse, ScrapeState};

/// Number of consecutive late reschedules after which a warning is logged.
///
/// The warning repeats every time the count reaches another multiple.
const DELAY_WARN_THRESHOLD: u64 = 5;

/// Receives the event groups produced by scrapes.
pub trait ScrapeSink: Send + Sync + 'static {
    /// Takes ownership of one scrape's events.
    fn send(&self, group: EventGroup);
}

impl ScrapeSink for mpsc::UnboundedSender<EventGroup> {
    fn send(&self, group: EventGroup) {
        if mpsc::UnboundedSender::send(self, group).is_err() {
            gleaner_log::debug!("scrape sink closed, dropping event group");
        }
    }
}

/// Shared services a [`ScrapeScheduler`] runs on.
#[derive(Clone)]
pub struct ScrapeComponents {
    /// Timer firing the scrapes of all targets.
    pub timer: Timer,
    /// Transport performing the scrape requests.
    pub client: Arc<dyn ScrapeClient>,
    /// Pool to allocate events from. Without a pool, events are allocated directly.
    pub pool: Option<PoolHandle>,
    /// Destination of scraped event groups.
    pub sink: Arc<dyn ScrapeSink>,
}

impl fmt::Debug for ScrapeComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeComponents")
            .field("timer", &self.timer)
            .field("pool", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

/// Periodically scrapes a single target.
///
/// After [`start`](Self::start), the scheduler fires on a fixed grid of the scrape interval. The
/// phase of the grid is derived from the target hash, so targets sharing an agent spread their
/// requests over the interval. Each cycle requests the metrics endpoint, turns the response into
/// an [`EventGroup`] and hands it to the sink. The next cycle is armed only after the current one
/// completed, so scrapes of one target never overlap.
///
/// Failed scrapes are not errors. They produce a group without samples whose metadata reports
/// the target as down.
///
/// Dropping the scheduler does not stop it; call [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct ScrapeScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<ScrapeConfig>,
    target: PromTargetInfo,
    id: String,
    host: String,
    port: u16,
    components: ScrapeComponents,
    started: AtomicBool,
    cancel: CancellationToken,
    /// The currently armed timer event.
    ///
    /// Arming and cancellation both hold this lock, so no event is armed after cancellation.
    armed: Mutex<Option<TimerHandle>>,
    exec_delay_count: AtomicU64,
    last_scrape_size: AtomicU64,
}

impl ScrapeScheduler {
    /// Creates a scheduler for `target` of the given scrape job.
    ///
    /// The scheduler is idle until [`start`](Self::start) is called.
    pub fn new(
        config: Arc<ScrapeConfig>,
        target: PromTargetInfo,
        components: ScrapeComponents,
    ) -> Self {
        let (host, port) = match target.host_port() {
            Some((host, port)) => (host.to_owned(), port),
            None => (target.instance.clone(), config.scheme.default_port()),
        };

        let inner = Inner {
            id: format!("{}{}", config.job_name, target.hash),
            config,
            target,
            host,
            port,
            components,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            armed: Mutex::new(None),
            exec_delay_count: AtomicU64::new(0),
            last_scrape_size: AtomicU64::new(0),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Arms the first scrape.
    ///
    /// The first scrape happens after the rebalance offset plus the time until the target's
    /// phase within the interval. Calling this more than once has no effect.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let interval_ms = duration_millis(self.inner.config.scrape_interval());
        let now_ms = u64::try_from(Timestamp::now().as_millis()).unwrap_or_default();
        let delay_ms = first_scrape_delay_ms(
            &self.inner.target.hash,
            interval_ms,
            self.inner.target.rebalance_ms,
            now_ms,
        );

        gleaner_log::debug!(
            scheduler = %self.inner.id,
            instance = %self.inner.target.instance,
            delay_ms,
            "starting scrape scheduler"
        );

        let first = Instant::now() + Duration::from_millis(delay_ms);
        self.inner.arm(first, first);
    }

    /// Stops the scheduler.
    ///
    /// No further scrape is armed after this returns. A scrape in flight runs to completion but
    /// its result is discarded. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        let mut armed = self.inner.armed.lock();
        if self.inner.cancel.is_cancelled() {
            return;
        }

        self.inner.cancel.cancel();
        if let Some(handle) = armed.take() {
            self.inner.components.timer.cancel(handle);
        }

        gleaner_log::debug!(scheduler = %self.inner.id, "cancelled scrape scheduler");
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Converts a scrape result into an event group and forwards it to the sink.
    ///
    /// `scrape_time` is the wall clock time the scrape started. It becomes the timestamp of
    /// samples that carry none and of the auto-metrics derived from the group.
    pub fn on_metric_result(
        &self,
        result: Result<ScrapeResponse, ScrapeError>,
        scrape_time: Timestamp,
        elapsed: Duration,
    ) {
        self.inner.on_metric_result(result, scrape_time, elapsed);
    }

    /// Returns the scheduler id, the job name followed by the target hash.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Returns the target this scheduler scrapes.
    pub fn target(&self) -> &PromTargetInfo {
        &self.inner.target
    }

    /// Returns the hash used to distribute targets across agents.
    pub fn hash_for_operator(&self) -> &str {
        &self.inner.target.hash_for_operator
    }

    /// Returns the offset added to the first scrape after a rebalance.
    pub fn rebalance_ms(&self) -> u64 {
        self.inner.target.rebalance_ms
    }

    /// Returns the number of consecutive scrapes that started late.
    ///
    /// Reset to zero by the first scrape that starts on time.
    pub fn exec_delay_count(&self) -> u64 {
        self.inner.exec_delay_count.load(Ordering::Relaxed)
    }

    /// Returns the body size of the last scrape response in bytes.
    pub fn last_scrape_size(&self) -> u64 {
        self.inner.last_scrape_size.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ScrapeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeScheduler")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target.instance)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Inner {
    /// Arms the cycle belonging to grid slot `exec_time` to fire at `deadline`.
    fn arm(self: &Arc<Self>, deadline: Instant, exec_time: Instant) {
        let mut armed = self.armed.lock();
        if self.cancel.is_cancelled() {
            return;
        }

        let event = ScrapeEvent {
            inner: Arc::clone(self),
            exec_time,
        };
        *armed = Some(self.components.timer.arm(deadline, Box::new(event)));
    }

    async fn scrape_once(self: Arc<Self>, exec_time: Instant) {
        let timeout = self.config.scrape_timeout();
        let request = ScrapeRequest {
            scheme: self.config.scheme,
            host: self.host.clone(),
            port: self.port,
            path: self.config.scrape_path(),
            timeout,
        };

        let scrape_time = Timestamp::now();
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.components.client.scrape(request))
            .await
            .unwrap_or(Err(ScrapeError::Timeout(timeout)));

        if self.cancel.is_cancelled() {
            gleaner_log::debug!(scheduler = %self.id, "discarding result of cancelled scrape");
            return;
        }

        let elapsed = match result {
            Ok(ref response) => response.elapsed,
            Err(_) => started.elapsed(),
        };
        self.on_metric_result(result, scrape_time, elapsed);
        self.schedule_next(exec_time);
    }

    /// Arms the next grid slot after `exec_time`.
    ///
    /// A slot that already passed fires immediately but keeps its grid time, so the following
    /// slot stays in phase. Slots lying entirely in the past are folded into the latest one.
    fn schedule_next(self: &Arc<Self>, exec_time: Instant) {
        let now = Instant::now();
        let interval = self.config.scrape_interval();
        let mut next = exec_time + interval;

        if next < now {
            let lateness = now - next;
            let delays = self.exec_delay_count.fetch_add(1, Ordering::Relaxed) + 1;
            metric!(counter(ScrapeCounters::Delays) += 1);
            metric!(distribution(ScrapeDistributions::DelayMs) = duration_millis(lateness));

            if delays % DELAY_WARN_THRESHOLD == 0 {
                gleaner_log::warn!(
                    scheduler = %self.id,
                    instance = %self.target.instance,
                    delays,
                    lateness_ms = duration_millis(lateness),
                    "scrape keeps falling behind its interval"
                );
            }

            if !interval.is_zero() {
                let missed = u32::try_from(lateness.as_nanos() / interval.as_nanos())
                    .unwrap_or(u32::MAX);
                next = next.checked_add(interval.saturating_mul(missed)).unwrap_or(now);
            }
            self.arm(now, next);
        } else {
            self.exec_delay_count.store(0, Ordering::Relaxed);
            self.arm(next, next);
        }
    }

    fn on_metric_result(
        &self,
        result: Result<ScrapeResponse, ScrapeError>,
        scrape_time: Timestamp,
        elapsed: Duration,
    ) {
        let mut group = match self.components.pool {
            Some(ref pool) => EventGroup::with_pool(pool.clone()),
            None => EventGroup::new(),
        };

        let mut state = ScrapeState::from_result(&result);
        let mut response_size = 0;
        let mut samples = 0;

        match result {
            Ok(ref response) => {
                response_size = response.body.len() as u64;
                if response.is_success() {
                    let body = String::from_utf8_lossy(&response.body);
                    let summary = read_exposition(&body, &mut group, scrape_time);
                    samples = summary.samples as u64;

                    if summary.skipped > 0 {
                        gleaner_log::debug!(
                            scheduler = %self.id,
                            skipped = summary.skipped,
                            "skipped malformed exposition lines"
                        );
                    }

                    let limit = self.config.sample_limit;
                    if limit > 0 && samples > limit {
                        group.retain_events(|_| false);
                        state = ScrapeState::SampleLimitExceeded;
                    }
                }
            }
            Err(ref error) => {
                gleaner_log::debug!(
                    scheduler = %self.id,
                    instance = %self.target.instance,
                    error = error as &dyn std::error::Error,
                    "scrape request failed"
                );
            }
        }

        if !state.is_up() {
            gleaner_log::debug!(
                scheduler = %self.id,
                instance = %self.target.instance,
                %state,
                "target is down"
            );
        }

        for (key, value) in &self.target.labels {
            group.set_tag(key, value.clone());
        }
        for (key, value) in &self.config.external_labels {
            if !group.tags().contains(key) {
                group.set_tag(key, value.clone());
            }
        }

        group.set_metadata(GroupMetadataKey::StreamTotal, "1");
        group.set_metadata(
            GroupMetadataKey::ScrapeDuration,
            elapsed.as_secs_f64().to_string(),
        );
        group.set_metadata(
            GroupMetadataKey::ScrapeResponseSize,
            response_size.to_string(),
        );
        group.set_metadata(GroupMetadataKey::SamplesScraped, samples.to_string());
        group.set_metadata(GroupMetadataKey::ScrapeState, state.to_string());
        group.set_metadata(
            GroupMetadataKey::UpState,
            if state.is_up() { "1" } else { "0" },
        );
        group.set_metadata(
            GroupMetadataKey::ScrapeTimestampMillis,
            scrape_time.as_millis().to_string(),
        );

        self.last_scrape_size.store(response_size, Ordering::Relaxed);
        let state_tag = state.to_string();
        metric!(counter(ScrapeCounters::Requests) += 1, state = state_tag.as_str());
        metric!(gauge(ScrapeGauges::ResponseSize) = response_size);
        metric!(timer(ScrapeTimers::Duration) = elapsed);
        metric!(distribution(ScrapeDistributions::Samples) = samples);

        self.components.sink.send(group);
    }
}

/// Timer event running one scrape cycle.
struct ScrapeEvent {
    inner: Arc<Inner>,
    exec_time: Instant,
}

impl TimerEvent for ScrapeEvent {
    fn is_valid(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    fn execute(self: Box<Self>) -> BoxFuture<'static, ()> {
        let Self { inner, exec_time } = *self;
        Box::pin(inner.scrape_once(exec_time))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
