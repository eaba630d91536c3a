use std::collections::BTreeMap;
use std::fmt;
use std::mem;

use crate::{Event, GroupId, MetricEvent, PoolHandle, SizedTags};

/// Scrape-level facts attached to an [`EventGroup`].
///
/// Values are stored as strings, exactly as they are exported on auto-metrics.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum GroupMetadataKey {
    /// Marks the group as the complete result of one scrape.
    StreamTotal,
    /// Wall time of the scrape in seconds.
    ScrapeDuration,
    /// Size of the response body in bytes.
    ScrapeResponseSize,
    /// Number of samples read from the response.
    SamplesScraped,
    /// Outcome of the scrape, for example `OK` or `ERR_TIMEOUT`.
    ScrapeState,
    /// `1` if the target was reachable and healthy, `0` otherwise.
    UpState,
    /// Start of the scrape in milliseconds since the UNIX epoch.
    ScrapeTimestampMillis,
}

impl GroupMetadataKey {
    /// Returns the key name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StreamTotal => "stream_total",
            Self::ScrapeDuration => "scrape_duration",
            Self::ScrapeResponseSize => "scrape_response_size",
            Self::SamplesScraped => "samples_scraped",
            Self::ScrapeState => "scrape_state",
            Self::UpState => "up_state",
            Self::ScrapeTimestampMillis => "scrape_timestamp_millis",
        }
    }
}

impl fmt::Display for GroupMetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of events sharing the ambient tags and metadata of one scrape.
///
/// The group exclusively owns its events. When the group was created with a pool, new metric
/// events are acquired from it, and events removed through [`retain_events`](Self::retain_events)
/// or still held on drop are released back to it.
pub struct EventGroup {
    id: GroupId,
    events: Vec<Event>,
    tags: SizedTags,
    metadata: BTreeMap<GroupMetadataKey, String>,
    pool: Option<PoolHandle>,
}

impl EventGroup {
    /// Creates a group that allocates events directly.
    pub fn new() -> Self {
        Self {
            id: GroupId::next(),
            events: Vec::new(),
            tags: SizedTags::new(),
            metadata: BTreeMap::new(),
            pool: None,
        }
    }

    /// Creates a group that recycles events through `pool`.
    pub fn with_pool(pool: impl Into<PoolHandle>) -> Self {
        let mut group = Self::new();
        group.pool = Some(pool.into());
        group
    }

    /// Returns the id that events of this group are bound to.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Appends a cleared metric event and returns it for population.
    pub fn add_metric_event(&mut self) -> &mut MetricEvent {
        let event = match self.pool {
            Some(ref pool) => pool.acquire_metric_event(self.id),
            None => Box::new(MetricEvent::new(self.id)),
        };

        self.events.push(Event::Metric(event));
        match self.events.last_mut() {
            Some(Event::Metric(event)) => &mut **event,
            // The metric event was pushed right above.
            _ => unreachable!(),
        }
    }

    /// Appends an event.
    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Returns all events in order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns all events for in-place modification.
    pub fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }

    /// Keeps only the events for which `keep` returns `true`, preserving their order.
    ///
    /// Removed events are released to the pool.
    pub fn retain_events<F>(&mut self, mut keep: F)
    where
        F: FnMut(&mut Event) -> bool,
    {
        let events = mem::take(&mut self.events);
        let mut kept = Vec::with_capacity(events.len());
        let mut removed = Vec::new();

        for mut event in events {
            if keep(&mut event) {
                kept.push(event);
            } else {
                removed.push(event);
            }
        }

        self.events = kept;
        self.release(removed);
    }

    /// Moves all events out of the group.
    ///
    /// The caller becomes responsible for releasing them.
    pub fn take_events(&mut self) -> Vec<Event> {
        mem::take(&mut self.events)
    }

    /// Returns the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the group holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the ambient tags that apply to all events of the group.
    pub fn tags(&self) -> &SizedTags {
        &self.tags
    }

    /// Returns the ambient tags for modification.
    pub fn tags_mut(&mut self) -> &mut SizedTags {
        &mut self.tags
    }

    /// Sets an ambient tag.
    pub fn set_tag(&mut self, key: &str, value: impl Into<String>) {
        self.tags.insert(key, value);
    }

    /// Returns an ambient tag, or `""` if it is absent.
    pub fn tag(&self, key: &str) -> &str {
        self.tags.get(key)
    }

    /// Removes an ambient tag.
    pub fn del_tag(&mut self, key: &str) {
        self.tags.erase(key);
    }

    /// Sets a metadata value.
    pub fn set_metadata(&mut self, key: GroupMetadataKey, value: impl Into<String>) {
        self.metadata.insert(key, value.into());
    }

    /// Returns a metadata value.
    pub fn metadata(&self, key: GroupMetadataKey) -> Option<&str> {
        self.metadata.get(&key).map(String::as_str)
    }

    /// Returns `true` if the metadata value is set.
    pub fn has_metadata(&self, key: GroupMetadataKey) -> bool {
        self.metadata.contains_key(&key)
    }

    /// Returns the memory used by tags and metric events of this group.
    pub fn data_size(&self) -> usize {
        let events: usize = self
            .events
            .iter()
            .filter_map(Event::as_metric)
            .map(MetricEvent::data_size)
            .sum();
        self.tags.byte_footprint() + events
    }

    fn release(&self, events: Vec<Event>) {
        if let Some(ref pool) = self.pool {
            pool.release(events);
        }
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventGroup")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("metadata", &self.metadata)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Drop for EventGroup {
    fn drop(&mut self) {
        let events = mem::take(&mut self.events);
        self.release(events);
    }
}
