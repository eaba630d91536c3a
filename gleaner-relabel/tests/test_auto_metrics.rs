use gleaner_config::ScrapeConfig;
use gleaner_event::{EventGroup, GroupMetadataKey, MetricEvent, NAME_LABEL, Timestamp};
use gleaner_relabel::RelabelProcessor;

fn processor(sample_limit: u64) -> RelabelProcessor {
    let config = ScrapeConfig {
        job_name: "node".to_owned(),
        scrape_timeout: 5,
        scrape_interval: 15,
        sample_limit,
        ..Default::default()
    };
    RelabelProcessor::new(&config).unwrap()
}

fn scrape_group(up: bool) -> EventGroup {
    let mut group = EventGroup::new();
    group.set_tag("instance", "h1:9100");
    group.set_tag("job", "node");
    group.set_metadata(GroupMetadataKey::StreamTotal, "1");
    group.set_metadata(GroupMetadataKey::ScrapeDuration, "0.25");
    group.set_metadata(GroupMetadataKey::ScrapeResponseSize, "2048");
    group.set_metadata(GroupMetadataKey::SamplesScraped, "1");
    group.set_metadata(
        GroupMetadataKey::ScrapeState,
        if up { "OK" } else { "ERR_TIMEOUT" },
    );
    group.set_metadata(GroupMetadataKey::UpState, if up { "1" } else { "0" });
    group.set_metadata(GroupMetadataKey::ScrapeTimestampMillis, "1700000000123");

    let event = group.add_metric_event();
    event.set_name("node_load1");
    event.set_tag("cpu", "0");
    group
}

fn summary(group: &EventGroup) -> Vec<String> {
    group
        .events()
        .iter()
        .filter_map(|event| event.as_metric())
        .map(|event: &MetricEvent| {
            let tags: Vec<_> = event.tags().iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{} {} [{}]", event.name(), event.value().as_f64(), tags.join(","))
        })
        .collect()
}

#[test]
fn test_auto_metrics_order() {
    gleaner_test::setup();
    let mut group = scrape_group(true);

    processor(0).process(&mut group);

    insta::assert_debug_snapshot!(summary(&group), @r###"
    [
        "node_load1 0 [__name__=node_load1,cpu=0,instance=h1:9100,job=node]",
        "scrape_duration_seconds 0.25 [__name__=scrape_duration_seconds,instance=h1:9100,job=node]",
        "scrape_response_size_bytes 2048 [__name__=scrape_response_size_bytes,instance=h1:9100,job=node]",
        "scrape_samples_scraped 1 [__name__=scrape_samples_scraped,instance=h1:9100,job=node]",
        "scrape_timeout_seconds 5 [__name__=scrape_timeout_seconds,instance=h1:9100,job=node]",
        "scrape_state 1 [__name__=scrape_state,instance=h1:9100,job=node,status=OK]",
        "up 1 [__name__=up,instance=h1:9100,job=node]",
    ]
    "###);
    assert!(group.tags().is_empty());
}

#[test]
fn test_auto_metrics_timestamp() {
    let mut group = scrape_group(true);
    processor(0).process(&mut group);

    for event in group.events().iter().skip(1) {
        let event = event.as_metric().unwrap();
        assert_eq!(event.timestamp(), Timestamp::new(1_700_000_000, 123_000_000));
    }
}

#[test]
fn test_down_target_with_sample_limit() {
    let mut group = scrape_group(false);

    processor(100).process(&mut group);

    let names: Vec<_> = group
        .events()
        .iter()
        .filter_map(|event| event.as_metric())
        .map(|event| event.tag(NAME_LABEL).to_owned())
        .collect();
    similar_asserts::assert_eq!(
        names,
        [
            "node_load1",
            "scrape_duration_seconds",
            "scrape_response_size_bytes",
            "scrape_samples_limit",
            "scrape_samples_scraped",
            "scrape_timeout_seconds",
            "scrape_state",
            "up",
        ]
    );

    let len = group.len();
    let state = group.events()[len - 2].as_metric().unwrap();
    assert_eq!(state.tag("status"), "ERR_TIMEOUT");
    assert_eq!(state.value().as_f64(), 0.0);
    let up = group.events()[len - 1].as_metric().unwrap();
    assert_eq!(up.value().as_f64(), 0.0);
}

#[test]
fn test_missing_timestamp_skips_auto_metrics() {
    gleaner_test::setup();
    let mut group = EventGroup::new();
    group.set_metadata(GroupMetadataKey::StreamTotal, "1");
    group.add_metric_event().set_name("m");

    let captures = gleaner_statsd::with_capturing_test_client(|| {
        processor(0).process(&mut group);
    });

    assert_eq!(group.len(), 1);
    assert_eq!(captures, ["relabel.auto_metrics_skipped:1|c"]);
}

#[test]
fn test_no_stream_total_no_auto_metrics() {
    let mut group = EventGroup::new();
    group.set_tag("job", "node");
    group.set_metadata(GroupMetadataKey::ScrapeTimestampMillis, "1700000000123");
    group.add_metric_event().set_name("m");

    processor(0).process(&mut group);
    assert_eq!(group.len(), 1);
}
