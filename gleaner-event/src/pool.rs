use std::mem;
use std::sync::Arc;
use std::time::Duration;

use gleaner_config::EventPoolConfig;
use gleaner_statsd::metric;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::statsd::{EventPoolCounters, EventPoolGauges, EventPoolTimers};
use crate::{
    Event, EventVariant, GroupId, LogEvent, MetricEvent, PooledEvent, RawEvent, SpanEvent,
};

/// Watermark of a free-list that has not been acquired from since the last GC cycle.
const UNTOUCHED: usize = usize::MAX;

/// A stack of reusable events with a low watermark.
#[derive(Debug)]
struct FreeList<T> {
    items: Vec<Box<T>>,
    /// Lowest length observed after an acquire since the last GC cycle.
    min_unused: usize,
}

impl<T: PooledEvent> FreeList<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            min_unused: UNTOUCHED,
        }
    }

    fn acquire(&mut self, group: GroupId) -> Box<T> {
        match self.items.pop() {
            Some(mut event) => {
                self.min_unused = self.min_unused.min(self.items.len());
                event.reset(group);
                event
            }
            None => Box::new(T::create(group)),
        }
    }

    /// Splits off the entries that stayed unused for the whole cycle and resets the watermark.
    ///
    /// An untouched list is idle in its entirety.
    fn take_idle(&mut self) -> Vec<Box<T>> {
        let idle = self.min_unused.min(self.items.len());
        self.min_unused = UNTOUCHED;
        self.items.split_off(self.items.len() - idle)
    }

    fn min_unused(&self) -> Option<usize> {
        (self.min_unused != UNTOUCHED).then_some(self.min_unused)
    }
}

/// An event pool owned by a single task.
///
/// All operations take `&mut self` and never synchronize. Use [`SharedEventPool`] when events
/// are acquired and released from several tasks.
#[derive(Debug)]
pub struct EventPool {
    log: FreeList<LogEvent>,
    metric: FreeList<MetricEvent>,
    span: FreeList<SpanEvent>,
    raw: FreeList<RawEvent>,
}

impl EventPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            log: FreeList::new(),
            metric: FreeList::new(),
            span: FreeList::new(),
            raw: FreeList::new(),
        }
    }

    /// Returns a cleared log event bound to `group`.
    pub fn acquire_log_event(&mut self, group: GroupId) -> Box<LogEvent> {
        self.log.acquire(group)
    }

    /// Returns a cleared metric event bound to `group`.
    pub fn acquire_metric_event(&mut self, group: GroupId) -> Box<MetricEvent> {
        self.metric.acquire(group)
    }

    /// Returns a cleared span event bound to `group`.
    pub fn acquire_span_event(&mut self, group: GroupId) -> Box<SpanEvent> {
        self.span.acquire(group)
    }

    /// Returns a cleared raw event bound to `group`.
    pub fn acquire_raw_event(&mut self, group: GroupId) -> Box<RawEvent> {
        self.raw.acquire(group)
    }

    /// Returns events to their free-lists.
    pub fn release(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            match event {
                Event::Log(event) => self.log.items.push(event),
                Event::Metric(event) => self.metric.items.push(event),
                Event::Span(event) => self.span.items.push(event),
                Event::Raw(event) => self.raw.items.push(event),
            }
        }
    }

    /// Frees events that stayed idle for a whole cycle and starts a new cycle.
    ///
    /// Returns the number of freed events.
    pub fn check_gc(&mut self) -> usize {
        metric!(timer(EventPoolTimers::GcDuration), {
            let reclaimed = [
                (EventVariant::Log, self.log.take_idle().len(), self.log.items.len()),
                (EventVariant::Metric, self.metric.take_idle().len(), self.metric.items.len()),
                (EventVariant::Span, self.span.take_idle().len(), self.span.items.len()),
                (EventVariant::Raw, self.raw.take_idle().len(), self.raw.items.len()),
            ];
            report_gc(&reclaimed)
        })
    }

    /// Drops all pooled events.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Returns the number of events available for reuse.
    pub fn pooled(&self, variant: EventVariant) -> usize {
        match variant {
            EventVariant::Log => self.log.items.len(),
            EventVariant::Metric => self.metric.items.len(),
            EventVariant::Span => self.span.items.len(),
            EventVariant::Raw => self.raw.items.len(),
        }
    }

    /// Returns the low watermark of a free-list, or `None` if it was not acquired from since the
    /// last GC cycle.
    pub fn min_unused(&self, variant: EventVariant) -> Option<usize> {
        match variant {
            EventVariant::Log => self.log.min_unused(),
            EventVariant::Metric => self.metric.min_unused(),
            EventVariant::Span => self.span.min_unused(),
            EventVariant::Raw => self.raw.min_unused(),
        }
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A free-list split into a primary list for consumers and a staging list for producers.
#[derive(Debug)]
struct SharedFreeList<T> {
    primary: Mutex<FreeList<T>>,
    staging: Mutex<Vec<Box<T>>>,
}

impl<T: PooledEvent> SharedFreeList<T> {
    fn new() -> Self {
        Self {
            primary: Mutex::new(FreeList::new()),
            staging: Mutex::new(Vec::new()),
        }
    }

    fn acquire(&self, group: GroupId) -> Box<T> {
        let mut primary = self.primary.lock();
        if primary.items.is_empty() {
            mem::swap(&mut primary.items, &mut *self.staging.lock());
        }
        primary.acquire(group)
    }

    fn release(&self, event: Box<T>) {
        self.staging.lock().push(event);
    }

    fn release_all(&self, events: Vec<Box<T>>) {
        if !events.is_empty() {
            self.staging.lock().extend(events);
        }
    }

    /// Returns `(reclaimed, pooled)` after merging staged events.
    fn check_gc(&self) -> (usize, usize) {
        let (idle, pooled) = {
            let mut primary = self.primary.lock();
            let staged = mem::take(&mut *self.staging.lock());
            primary.items.extend(staged);
            let idle = primary.take_idle();
            (idle, primary.items.len())
        };
        // Idle events are freed outside of the critical section.
        (idle.len(), pooled)
    }

    fn clear(&self) {
        let mut primary = self.primary.lock();
        primary.items.clear();
        primary.min_unused = UNTOUCHED;
        self.staging.lock().clear();
    }
}

/// An event pool that can be shared between tasks.
///
/// Producers return events to a staging list under a short lock, consumers acquire from the
/// primary list and only fall back to the staging list when the primary list is empty.
/// [`check_gc`](Self::check_gc) merges staging into primary before reclaiming idle events.
#[derive(Debug)]
pub struct SharedEventPool {
    log: SharedFreeList<LogEvent>,
    metric: SharedFreeList<MetricEvent>,
    span: SharedFreeList<SpanEvent>,
    raw: SharedFreeList<RawEvent>,
}

impl SharedEventPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            log: SharedFreeList::new(),
            metric: SharedFreeList::new(),
            span: SharedFreeList::new(),
            raw: SharedFreeList::new(),
        }
    }

    /// Returns a cleared log event bound to `group`.
    pub fn acquire_log_event(&self, group: GroupId) -> Box<LogEvent> {
        self.log.acquire(group)
    }

    /// Returns a cleared metric event bound to `group`.
    pub fn acquire_metric_event(&self, group: GroupId) -> Box<MetricEvent> {
        self.metric.acquire(group)
    }

    /// Returns a cleared span event bound to `group`.
    pub fn acquire_span_event(&self, group: GroupId) -> Box<SpanEvent> {
        self.span.acquire(group)
    }

    /// Returns a cleared raw event bound to `group`.
    pub fn acquire_raw_event(&self, group: GroupId) -> Box<RawEvent> {
        self.raw.acquire(group)
    }

    /// Returns a single event to its staging list.
    pub fn release_one(&self, event: Event) {
        match event {
            Event::Log(event) => self.log.release(event),
            Event::Metric(event) => self.metric.release(event),
            Event::Span(event) => self.span.release(event),
            Event::Raw(event) => self.raw.release(event),
        }
    }

    /// Returns events to their staging lists, taking each lock at most once.
    pub fn release(&self, events: impl IntoIterator<Item = Event>) {
        let mut log = Vec::new();
        let mut metric = Vec::new();
        let mut span = Vec::new();
        let mut raw = Vec::new();

        for event in events {
            match event {
                Event::Log(event) => log.push(event),
                Event::Metric(event) => metric.push(event),
                Event::Span(event) => span.push(event),
                Event::Raw(event) => raw.push(event),
            }
        }

        self.log.release_all(log);
        self.metric.release_all(metric);
        self.span.release_all(span);
        self.raw.release_all(raw);
    }

    /// Merges staged events, frees events that stayed idle for a whole cycle and starts a new
    /// cycle.
    ///
    /// Returns the number of freed events.
    pub fn check_gc(&self) -> usize {
        metric!(timer(EventPoolTimers::GcDuration), {
            let (log, log_pooled) = self.log.check_gc();
            let (metric, metric_pooled) = self.metric.check_gc();
            let (span, span_pooled) = self.span.check_gc();
            let (raw, raw_pooled) = self.raw.check_gc();

            report_gc(&[
                (EventVariant::Log, log, log_pooled),
                (EventVariant::Metric, metric, metric_pooled),
                (EventVariant::Span, span, span_pooled),
                (EventVariant::Raw, raw, raw_pooled),
            ])
        })
    }

    /// Drops all pooled and staged events.
    pub fn clear(&self) {
        self.log.clear();
        self.metric.clear();
        self.span.clear();
        self.raw.clear();
    }

    fn list_state(&self, variant: EventVariant) -> (usize, usize, Option<usize>) {
        fn state<T: PooledEvent>(list: &SharedFreeList<T>) -> (usize, usize, Option<usize>) {
            let primary = list.primary.lock();
            (primary.items.len(), list.staging.lock().len(), primary.min_unused())
        }

        match variant {
            EventVariant::Log => state(&self.log),
            EventVariant::Metric => state(&self.metric),
            EventVariant::Span => state(&self.span),
            EventVariant::Raw => state(&self.raw),
        }
    }

    /// Returns the number of events on the primary list.
    pub fn pooled(&self, variant: EventVariant) -> usize {
        self.list_state(variant).0
    }

    /// Returns the number of released events waiting on the staging list.
    pub fn staged(&self, variant: EventVariant) -> usize {
        self.list_state(variant).1
    }

    /// Returns the low watermark of a primary list, or `None` if it was not acquired from since
    /// the last GC cycle.
    pub fn min_unused(&self, variant: EventVariant) -> Option<usize> {
        self.list_state(variant).2
    }
}

impl Default for SharedEventPool {
    fn default() -> Self {
        Self::new()
    }
}

/// The pool flavour a pipeline runs on, chosen once at construction.
///
/// Cloning the handle shares the underlying pool.
#[derive(Clone, Debug)]
pub enum PoolHandle {
    /// A [`SharedEventPool`] for concurrent producers and a separate maintenance task.
    Shared(Arc<SharedEventPool>),
    /// An [`EventPool`] without staging list.
    ///
    /// Acquire, release and garbage collection all take the whole pool, so they run strictly one
    /// after another. Meant for a single task that owns the pool, where the mutex is never
    /// contended.
    Exclusive(Arc<Mutex<EventPool>>),
}

impl PoolHandle {
    /// Creates the pool flavour selected by `config`.
    pub fn from_config(config: &EventPoolConfig) -> Self {
        if config.enable_lock {
            Self::Shared(Arc::new(SharedEventPool::new()))
        } else {
            Self::Exclusive(Arc::new(Mutex::new(EventPool::new())))
        }
    }

    /// Returns a cleared metric event bound to `group`.
    pub fn acquire_metric_event(&self, group: GroupId) -> Box<MetricEvent> {
        match self {
            Self::Shared(pool) => pool.acquire_metric_event(group),
            Self::Exclusive(pool) => pool.lock().acquire_metric_event(group),
        }
    }

    /// Returns a cleared raw event bound to `group`.
    pub fn acquire_raw_event(&self, group: GroupId) -> Box<RawEvent> {
        match self {
            Self::Shared(pool) => pool.acquire_raw_event(group),
            Self::Exclusive(pool) => pool.lock().acquire_raw_event(group),
        }
    }

    /// Returns events to the pool.
    pub fn release(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }

        match self {
            Self::Shared(pool) => pool.release(events),
            Self::Exclusive(pool) => pool.lock().release(events),
        }
    }

    /// Runs one garbage collection cycle and returns the number of freed events.
    pub fn check_gc(&self) -> usize {
        match self {
            Self::Shared(pool) => pool.check_gc(),
            Self::Exclusive(pool) => pool.lock().check_gc(),
        }
    }

    /// Returns the number of released events of `variant` waiting for reuse.
    ///
    /// For the shared flavour this includes the staging list.
    pub fn available(&self, variant: EventVariant) -> usize {
        match self {
            Self::Shared(pool) => pool.pooled(variant) + pool.staged(variant),
            Self::Exclusive(pool) => pool.lock().pooled(variant),
        }
    }

    /// Starts the maintenance task with the interval from `config`.
    pub fn spawn_gc(&self, config: &EventPoolConfig) -> GcHandle {
        spawn_gc(self.clone(), config.gc_interval())
    }
}

impl From<Arc<SharedEventPool>> for PoolHandle {
    fn from(pool: Arc<SharedEventPool>) -> Self {
        Self::Shared(pool)
    }
}

impl From<EventPool> for PoolHandle {
    fn from(pool: EventPool) -> Self {
        Self::Exclusive(Arc::new(Mutex::new(pool)))
    }
}

fn report_gc(lists: &[(EventVariant, usize, usize)]) -> usize {
    let mut total = 0;
    for &(variant, reclaimed, pooled) in lists {
        metric!(
            counter(EventPoolCounters::Reclaimed) += reclaimed as i64,
            variant = variant.as_str()
        );
        metric!(
            gauge(EventPoolGauges::Pooled) = pooled as u64,
            variant = variant.as_str()
        );
        total += reclaimed;
    }

    gleaner_log::debug!(reclaimed = total, "event pool garbage collection finished");
    total
}

/// Handle to the pool maintenance task.
///
/// The task stops when the handle is dropped.
#[derive(Debug)]
pub struct GcHandle(JoinHandle<()>);

impl GcHandle {
    /// Stops the maintenance task.
    pub fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for GcHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs [`PoolHandle::check_gc`] every `interval` on the current runtime.
pub fn spawn_gc(pool: impl Into<PoolHandle>, interval: Duration) -> GcHandle {
    let pool = pool.into();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            pool.check_gc();
        }
    });

    GcHandle(handle)
}
