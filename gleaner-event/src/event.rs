use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::SizedTags;

/// Label that mirrors the name of a metric event.
pub const NAME_LABEL: &str = "__name__";

/// Identifies the event group that currently owns an event.
///
/// Groups hand out fresh ids on construction. An event acquired from a pool is rebound to the
/// id of the acquiring group, so stale references from a previous owner cannot survive reuse.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GroupId(u64);

impl GroupId {
    /// Allocates a process-unique group id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id of events that are not bound to any group.
    pub const fn unbound() -> Self {
        Self(0)
    }
}

/// Point in time of an event, relative to the UNIX epoch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp {
    /// Whole seconds.
    pub secs: u64,
    /// Sub-second nanoseconds.
    pub nanos: u32,
}

impl Timestamp {
    /// Creates a timestamp from seconds and nanoseconds.
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Splits milliseconds since the epoch into seconds and nanoseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self {
            secs: millis / 1000,
            nanos: (millis % 1000) as u32 * 1_000_000,
        }
    }

    /// Returns the current time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(elapsed.as_secs(), elapsed.subsec_nanos())
    }

    /// Returns the timestamp in milliseconds, truncating sub-millisecond precision.
    pub fn as_millis(self) -> i64 {
        (self.secs * 1000 + u64::from(self.nanos / 1_000_000)) as i64
    }
}

/// The value of a metric sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// A single value without type information, as exposed by text scrapes.
    Untyped(f64),
}

impl MetricValue {
    /// Returns the value as a float.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Untyped(value) => value,
        }
    }
}

impl Default for MetricValue {
    fn default() -> Self {
        Self::Untyped(0.0)
    }
}

/// A single metric sample.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricEvent {
    group: GroupId,
    name: String,
    value: MetricValue,
    timestamp: Timestamp,
    tags: SizedTags,
}

impl MetricEvent {
    /// Creates an empty metric event bound to `group`.
    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            name: String::new(),
            value: MetricValue::default(),
            timestamp: Timestamp::default(),
            tags: SizedTags::new(),
        }
    }

    /// Returns the owning group.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the metric name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns the sample value.
    pub fn value(&self) -> MetricValue {
        self.value
    }

    /// Sets the sample value.
    pub fn set_value(&mut self, value: MetricValue) {
        self.value = value;
    }

    /// Returns the sample timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Sets the sample timestamp.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Returns the value of a label, or `""` if it is absent.
    pub fn tag(&self, key: &str) -> &str {
        self.tags.get(key)
    }

    /// Returns `true` if the label exists.
    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.contains(key)
    }

    /// Sets a label, replacing an existing value.
    pub fn set_tag(&mut self, key: &str, value: impl Into<String>) {
        self.tags.insert(key, value);
    }

    /// Removes a label.
    pub fn del_tag(&mut self, key: &str) {
        self.tags.erase(key);
    }

    /// Returns all labels.
    pub fn tags(&self) -> &SizedTags {
        &self.tags
    }

    /// Returns all labels for in-place rewriting.
    pub fn tags_mut(&mut self) -> &mut SizedTags {
        &mut self.tags
    }

    /// Returns the memory used by this event's variable-size data.
    pub fn data_size(&self) -> usize {
        self.name.len() + self.tags.byte_footprint()
    }
}

/// A structured log record.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEvent {
    group: GroupId,
    timestamp: Timestamp,
    contents: SizedTags,
}

impl LogEvent {
    /// Creates an empty log event bound to `group`.
    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            timestamp: Timestamp::default(),
            contents: SizedTags::new(),
        }
    }

    /// Returns the owning group.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Returns the record timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Sets the record timestamp.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Returns the record fields.
    pub fn contents(&self) -> &SizedTags {
        &self.contents
    }

    /// Returns the record fields for modification.
    pub fn contents_mut(&mut self) -> &mut SizedTags {
        &mut self.contents
    }
}

/// A single span of a trace.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanEvent {
    group: GroupId,
    trace_id: String,
    span_id: String,
    name: String,
    start: Timestamp,
    end: Timestamp,
    tags: SizedTags,
}

impl SpanEvent {
    /// Creates an empty span bound to `group`.
    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            trace_id: String::new(),
            span_id: String::new(),
            name: String::new(),
            start: Timestamp::default(),
            end: Timestamp::default(),
            tags: SizedTags::new(),
        }
    }

    /// Returns the owning group.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Returns the trace this span belongs to.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Sets the trace id.
    pub fn set_trace_id(&mut self, trace_id: impl Into<String>) {
        self.trace_id = trace_id.into();
    }

    /// Returns the span id.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Sets the span id.
    pub fn set_span_id(&mut self, span_id: impl Into<String>) {
        self.span_id = span_id.into();
    }

    /// Returns the operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the operation name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns start and end of the span.
    pub fn range(&self) -> (Timestamp, Timestamp) {
        (self.start, self.end)
    }

    /// Sets start and end of the span.
    pub fn set_range(&mut self, start: Timestamp, end: Timestamp) {
        self.start = start;
        self.end = end;
    }

    /// Returns the span attributes.
    pub fn tags(&self) -> &SizedTags {
        &self.tags
    }

    /// Returns the span attributes for modification.
    pub fn tags_mut(&mut self) -> &mut SizedTags {
        &mut self.tags
    }
}

/// An unparsed line of input.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEvent {
    group: GroupId,
    timestamp: Timestamp,
    content: String,
    tags: SizedTags,
}

impl RawEvent {
    /// Creates an empty raw event bound to `group`.
    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            timestamp: Timestamp::default(),
            content: String::new(),
            tags: SizedTags::new(),
        }
    }

    /// Returns the owning group.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Returns the raw content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replaces the raw content.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Returns the time the line was read.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Sets the time the line was read.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Returns the tags attached to the line, such as its source.
    pub fn tags(&self) -> &SizedTags {
        &self.tags
    }

    /// Returns the tags for modification.
    pub fn tags_mut(&mut self) -> &mut SizedTags {
        &mut self.tags
    }
}

/// The kind of an [`Event`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventVariant {
    /// [`LogEvent`]
    Log,
    /// [`MetricEvent`]
    Metric,
    /// [`SpanEvent`]
    Span,
    /// [`RawEvent`]
    Raw,
}

impl EventVariant {
    /// All variants, in free-list order.
    pub const ALL: [Self; 4] = [Self::Log, Self::Metric, Self::Span, Self::Raw];

    /// Returns the variant name used in logs and metric tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Metric => "metric",
            Self::Span => "span",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for EventVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An owned event of any variant.
///
/// Events are boxed so they can move between a group and a pool free-list without copying.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A log record.
    Log(Box<LogEvent>),
    /// A metric sample.
    Metric(Box<MetricEvent>),
    /// A trace span.
    Span(Box<SpanEvent>),
    /// An unparsed line.
    Raw(Box<RawEvent>),
}

impl Event {
    /// Returns the variant of this event.
    pub fn variant(&self) -> EventVariant {
        match self {
            Self::Log(_) => EventVariant::Log,
            Self::Metric(_) => EventVariant::Metric,
            Self::Span(_) => EventVariant::Span,
            Self::Raw(_) => EventVariant::Raw,
        }
    }

    /// Returns the owning group.
    pub fn group(&self) -> GroupId {
        match self {
            Self::Log(event) => event.group,
            Self::Metric(event) => event.group,
            Self::Span(event) => event.group,
            Self::Raw(event) => event.group,
        }
    }

    /// Returns the metric event, if this is one.
    pub fn as_metric(&self) -> Option<&MetricEvent> {
        match self {
            Self::Metric(event) => Some(&**event),
            _ => None,
        }
    }

    /// Returns the metric event for modification, if this is one.
    pub fn as_metric_mut(&mut self) -> Option<&mut MetricEvent> {
        match self {
            Self::Metric(event) => Some(&mut **event),
            _ => None,
        }
    }
}

/// Event types that can be recycled by an event pool.
pub trait PooledEvent: Sized {
    /// The variant, which selects the free-list.
    const VARIANT: EventVariant;

    /// Creates a fresh event bound to `group`.
    fn create(group: GroupId) -> Self;

    /// Clears all state of the previous owner and binds the event to `group`.
    ///
    /// Allocations held by the event are kept for reuse.
    fn reset(&mut self, group: GroupId);

    /// Wraps the boxed event into an [`Event`].
    fn into_event(self: Box<Self>) -> Event;
}

impl PooledEvent for LogEvent {
    const VARIANT: EventVariant = EventVariant::Log;

    fn create(group: GroupId) -> Self {
        Self::new(group)
    }

    fn reset(&mut self, group: GroupId) {
        self.group = group;
        self.timestamp = Timestamp::default();
        self.contents.clear();
    }

    fn into_event(self: Box<Self>) -> Event {
        Event::Log(self)
    }
}

impl PooledEvent for MetricEvent {
    const VARIANT: EventVariant = EventVariant::Metric;

    fn create(group: GroupId) -> Self {
        Self::new(group)
    }

    fn reset(&mut self, group: GroupId) {
        self.group = group;
        self.name.clear();
        self.value = MetricValue::default();
        self.timestamp = Timestamp::default();
        self.tags.clear();
    }

    fn into_event(self: Box<Self>) -> Event {
        Event::Metric(self)
    }
}

impl PooledEvent for SpanEvent {
    const VARIANT: EventVariant = EventVariant::Span;

    fn create(group: GroupId) -> Self {
        Self::new(group)
    }

    fn reset(&mut self, group: GroupId) {
        self.group = group;
        self.trace_id.clear();
        self.span_id.clear();
        self.name.clear();
        self.start = Timestamp::default();
        self.end = Timestamp::default();
        self.tags.clear();
    }

    fn into_event(self: Box<Self>) -> Event {
        Event::Span(self)
    }
}

impl PooledEvent for RawEvent {
    const VARIANT: EventVariant = EventVariant::Raw;

    fn create(group: GroupId) -> Self {
        Self::new(group)
    }

    fn reset(&mut self, group: GroupId) {
        self.group = group;
        self.timestamp = Timestamp::default();
        self.content.clear();
        self.tags.clear();
    }

    fn into_event(self: Box<Self>) -> Event {
        Event::Raw(self)
    }
}
