use std::time::Duration;

use gleaner_config::ScrapeConfig;
use gleaner_event::{
    Event, EventGroup, GroupMetadataKey, MetricEvent, MetricValue, NAME_LABEL, SizedTags,
    Timestamp,
};
use gleaner_statsd::metric;

use crate::statsd::RelabelCounters;
use crate::{RelabelError, RelabelRules};

/// Prefix for labels of a scraped metric that collide with a target label.
pub const EXPORTED_PREFIX: &str = "exported_";
/// Labels starting with this prefix are internal and removed before export.
pub const RESERVED_PREFIX: &str = "__";
/// Auto-metric reporting the target health. Always the last event of a scrape.
pub const UP: &str = "up";
/// Auto-metric carrying the textual scrape state in its [`STATUS_LABEL`].
pub const SCRAPE_STATE: &str = "scrape_state";
/// Label of [`SCRAPE_STATE`] holding the state.
pub const STATUS_LABEL: &str = "status";
/// Auto-metric with the scrape duration.
pub const SCRAPE_DURATION_SECONDS: &str = "scrape_duration_seconds";
/// Auto-metric with the response body size.
pub const SCRAPE_RESPONSE_SIZE_BYTES: &str = "scrape_response_size_bytes";
/// Auto-metric with the configured sample limit.
pub const SCRAPE_SAMPLES_LIMIT: &str = "scrape_samples_limit";
/// Auto-metric with the number of samples in the response.
pub const SCRAPE_SAMPLES_SCRAPED: &str = "scrape_samples_scraped";
/// Auto-metric with the configured scrape timeout.
pub const SCRAPE_TIMEOUT_SECONDS: &str = "scrape_timeout_seconds";

/// Values of the auto-metrics, read from group metadata.
#[derive(Debug, Default)]
struct AutoMetrics {
    duration_seconds: f64,
    response_size_bytes: u64,
    samples_scraped: u64,
    state: String,
    up: bool,
}

impl AutoMetrics {
    fn from_group(group: &EventGroup) -> Self {
        fn parse<T: std::str::FromStr + Default>(group: &EventGroup, key: GroupMetadataKey) -> T {
            group
                .metadata(key)
                .and_then(|value| value.parse().ok())
                .unwrap_or_default()
        }

        Self {
            duration_seconds: parse(group, GroupMetadataKey::ScrapeDuration),
            response_size_bytes: parse(group, GroupMetadataKey::ScrapeResponseSize),
            samples_scraped: parse(group, GroupMetadataKey::SamplesScraped),
            state: group
                .metadata(GroupMetadataKey::ScrapeState)
                .unwrap_or_default()
                .to_owned(),
            up: matches!(
                group.metadata(GroupMetadataKey::UpState),
                Some("1" | "true")
            ),
        }
    }
}

/// Rewrites scraped metrics into their exported form.
#[derive(Debug)]
pub struct RelabelProcessor {
    rules: RelabelRules,
    honor_labels: bool,
    sample_limit: u64,
    scrape_timeout: Duration,
}

impl RelabelProcessor {
    /// Creates a processor for the given scrape job.
    pub fn new(config: &ScrapeConfig) -> Result<Self, RelabelError> {
        Ok(Self {
            rules: RelabelRules::from_configs(&config.metric_relabel_configs)?,
            honor_labels: config.honor_labels,
            sample_limit: config.sample_limit,
            scrape_timeout: config.scrape_timeout(),
        })
    }

    /// Processes one scrape result in place.
    ///
    /// Target labels are moved from the group onto every metric, dropped events are compacted
    /// away while the order of the others is preserved, and auto-metrics are appended when the
    /// group describes a complete scrape.
    pub fn process(&self, group: &mut EventGroup) {
        let target_tags = group.tags().clone();

        if !self.rules.is_empty() || !target_tags.is_empty() {
            let before = group.len();
            group.retain_events(|event| self.process_event(event, &target_tags));
            metric!(counter(RelabelCounters::Dropped) += (before - group.len()) as i64);
        }

        if group.has_metadata(GroupMetadataKey::StreamTotal) {
            self.add_auto_metrics(group, &target_tags);
        }

        for (key, _) in target_tags.iter() {
            group.del_tag(key);
        }
    }

    /// Returns `false` if the event must be removed from the group.
    fn process_event(&self, event: &mut Event, target_tags: &SizedTags) -> bool {
        let Some(event) = event.as_metric_mut() else {
            gleaner_log::debug!(
                variant = %event.variant(),
                "dropping unsupported event during relabeling"
            );
            return false;
        };

        let name = event.name().to_owned();
        event.set_tag(NAME_LABEL, name);

        let tags = event.tags_mut();
        for (key, value) in target_tags.iter() {
            match tags.position(key) {
                Some(index) if !self.honor_labels => {
                    let exported = format!("{EXPORTED_PREFIX}{key}");
                    if let Some(exported_index) = tags.position(&exported) {
                        tags.rename_at(exported_index, format!("{EXPORTED_PREFIX}{exported}"));
                    }
                    tags.rename_at(index, exported);
                    tags.push_back(key, value);
                }
                Some(_) => {}
                None => tags.push_back(key, value),
            }
        }

        if !self.rules.is_empty() && !self.rules.process(tags) {
            return false;
        }

        let name = tags.get(NAME_LABEL).to_owned();
        tags.compact(|key, _| !key.starts_with(RESERVED_PREFIX) || key == NAME_LABEL);
        tags.sort();
        event.set_name(name);

        true
    }

    fn add_auto_metrics(&self, group: &mut EventGroup, target_tags: &SizedTags) {
        let Some(millis) = group
            .metadata(GroupMetadataKey::ScrapeTimestampMillis)
            .and_then(|value| value.parse::<u64>().ok())
        else {
            gleaner_log::error!(
                target_labels = ?target_tags,
                "scrape timestamp is not set, skipping auto-metrics"
            );
            metric!(counter(RelabelCounters::AutoMetricsSkipped) += 1);
            return;
        };

        let timestamp = Timestamp::from_millis(millis);
        let values = AutoMetrics::from_group(group);
        let up = if values.up { 1.0 } else { 0.0 };

        let add = |group: &mut EventGroup, name: &str, value: f64| {
            add_metric(group, name, value, timestamp, target_tags);
        };

        add(group, SCRAPE_DURATION_SECONDS, values.duration_seconds);
        add(group, SCRAPE_RESPONSE_SIZE_BYTES, values.response_size_bytes as f64);
        if self.sample_limit > 0 {
            add(group, SCRAPE_SAMPLES_LIMIT, self.sample_limit as f64);
        }
        add(group, SCRAPE_SAMPLES_SCRAPED, values.samples_scraped as f64);
        add(group, SCRAPE_TIMEOUT_SECONDS, self.scrape_timeout.as_secs_f64());
        add_metric(group, SCRAPE_STATE, up, timestamp, target_tags)
            .set_tag(STATUS_LABEL, values.state);
        // Consumers locate the end of a scrape by this event, it must stay last.
        add(group, UP, up);
    }
}

fn add_metric<'a>(
    group: &'a mut EventGroup,
    name: &str,
    value: f64,
    timestamp: Timestamp,
    target_tags: &SizedTags,
) -> &'a mut MetricEvent {
    let event = group.add_metric_event();
    event.set_name(name);
    event.set_value(MetricValue::Untyped(value));
    event.set_timestamp(timestamp);
    event.tags_mut().push_back(NAME_LABEL, name);
    event.tags_mut().extend(target_tags.iter());
    event
}

#[cfg(test)]
mod tests {
    use gleaner_event::EventVariant;

    use super::*;

    fn processor(config: serde_json::Value) -> RelabelProcessor {
        let config: ScrapeConfig = serde_json::from_value(config).unwrap();
        RelabelProcessor::new(&config).unwrap()
    }

    fn metric(group: &mut EventGroup, name: &str, tags: &[(&str, &str)]) {
        let event = group.add_metric_event();
        event.set_name(name);
        for (key, value) in tags {
            event.set_tag(key, *value);
        }
    }

    fn tags_of(group: &EventGroup, index: usize) -> Vec<(String, String)> {
        group.events()[index]
            .as_metric()
            .unwrap()
            .tags()
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    #[test]
    fn test_collision_renames_to_exported() {
        let processor = processor(serde_json::json!({"job_name": "a"}));
        let mut group = EventGroup::new();
        group.set_tag("job", "B");
        metric(&mut group, "m", &[("job", "A")]);

        processor.process(&mut group);

        insta::assert_debug_snapshot!(tags_of(&group, 0), @r###"
        [
            (
                "__name__",
                "m",
            ),
            (
                "exported_job",
                "A",
            ),
            (
                "job",
                "B",
            ),
        ]
        "###);
    }

    #[test]
    fn test_collision_cascades() {
        let processor = processor(serde_json::json!({"job_name": "a"}));
        let mut group = EventGroup::new();
        group.set_tag("job", "C");
        metric(&mut group, "m", &[("job", "A"), ("exported_job", "B")]);

        processor.process(&mut group);

        let event = group.events()[0].as_metric().unwrap();
        assert_eq!(event.tag("job"), "C");
        assert_eq!(event.tag("exported_job"), "A");
        assert_eq!(event.tag("exported_exported_job"), "B");
    }

    #[test]
    fn test_honor_labels_keeps_event_value() {
        let processor = processor(serde_json::json!({"job_name": "a", "honor_labels": true}));
        let mut group = EventGroup::new();
        group.set_tag("job", "B");
        group.set_tag("instance", "h1");
        metric(&mut group, "m", &[("job", "A")]);

        processor.process(&mut group);

        let event = group.events()[0].as_metric().unwrap();
        assert_eq!(event.tag("job"), "A");
        assert_eq!(event.tag("instance"), "h1");
        assert!(!event.has_tag("exported_job"));
    }

    #[test]
    fn test_strips_reserved_and_sorts() {
        let processor = processor(serde_json::json!({"job_name": "a"}));
        let mut group = EventGroup::new();
        group.set_tag("__address__", "h1:9100");
        metric(&mut group, "m", &[("z", "1"), ("__tmp", "x"), ("a", "2")]);

        processor.process(&mut group);

        let keys: Vec<_> = tags_of(&group, 0).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["__name__", "a", "z"]);
    }

    #[test]
    fn test_rules_rename_metric() {
        let processor = processor(serde_json::json!({
            "job_name": "a",
            "metric_relabel_configs": [{
                "source_labels": ["__name__"],
                "regex": "old_(.*)",
                "target_label": "__name__",
                "replacement": "new_$1",
            }],
        }));
        let mut group = EventGroup::new();
        metric(&mut group, "old_requests", &[]);

        processor.process(&mut group);

        let event = group.events()[0].as_metric().unwrap();
        assert_eq!(event.name(), "new_requests");
        assert_eq!(event.tag(NAME_LABEL), "new_requests");
    }

    #[test]
    fn test_dropped_events_keep_order() {
        let processor = processor(serde_json::json!({
            "job_name": "a",
            "metric_relabel_configs": [{
                "source_labels": ["__name__"],
                "regex": "go_.*",
                "action": "drop",
            }],
        }));
        let mut group = EventGroup::new();
        for name in ["a", "go_gc", "b", "go_threads", "c"] {
            metric(&mut group, name, &[]);
        }

        let captures = gleaner_statsd::with_capturing_test_client(|| {
            processor.process(&mut group);
        });

        let names: Vec<_> = group
            .events()
            .iter()
            .filter_map(Event::as_metric)
            .map(MetricEvent::name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(captures, ["relabel.dropped:2|c"]);
    }

    #[test]
    fn test_non_metric_events_are_dropped() {
        gleaner_test::setup();
        let processor = processor(serde_json::json!({"job_name": "a"}));
        let mut group = EventGroup::new();
        group.set_tag("job", "a");
        group.push_event(Event::Raw(Box::new(gleaner_event::RawEvent::new(group.id()))));
        metric(&mut group, "m", &[]);

        processor.process(&mut group);

        assert_eq!(group.len(), 1);
        assert_eq!(group.events()[0].variant(), EventVariant::Metric);
    }

    #[test]
    fn test_fast_path_leaves_events_untouched() {
        let processor = processor(serde_json::json!({"job_name": "a"}));
        let mut group = EventGroup::new();
        metric(&mut group, "m", &[("__tmp", "x")]);

        processor.process(&mut group);

        let event = group.events()[0].as_metric().unwrap();
        assert_eq!(event.tag("__tmp"), "x");
        assert!(!event.has_tag(NAME_LABEL));
    }

    #[test]
    fn test_target_tags_removed_from_group() {
        let processor = processor(serde_json::json!({"job_name": "a"}));
        let mut group = EventGroup::new();
        group.set_tag("job", "a");
        group.set_tag("instance", "h1");

        processor.process(&mut group);

        assert!(group.tags().is_empty());
    }
}
