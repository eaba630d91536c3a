//! Reader for the line-oriented Prometheus text exposition format.
//!
//! Only sample lines are interpreted: `name{label="value",...} value [timestamp_ms]`. Comments,
//! `# HELP` and `# TYPE` lines and blank lines are skipped. A line that does not parse is skipped
//! and counted, it never fails the scrape.

use std::borrow::Cow;

use gleaner_event::{EventGroup, MetricValue, NAME_LABEL, Timestamp};

/// Result of reading one response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Number of sample lines added to the group.
    pub samples: usize,
    /// Number of malformed lines skipped.
    pub skipped: usize,
}

struct Sample<'a> {
    name: &'a str,
    labels: Vec<(&'a str, Cow<'a, str>)>,
    value: f64,
    timestamp: Option<Timestamp>,
}

/// Appends one metric event per sample line in `body` to `group`.
///
/// Samples without an explicit timestamp take `scrape_time`.
pub fn read_exposition(body: &str, group: &mut EventGroup, scrape_time: Timestamp) -> ReadSummary {
    let mut summary = ReadSummary::default();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(sample) = parse_line(line) else {
            gleaner_log::trace!(line, "skipping malformed exposition line");
            summary.skipped += 1;
            continue;
        };

        let event = group.add_metric_event();
        event.set_name(sample.name);
        event.set_value(MetricValue::Untyped(sample.value));
        event.set_timestamp(sample.timestamp.unwrap_or(scrape_time));
        event.set_tag(NAME_LABEL, sample.name);
        for (key, value) in sample.labels {
            event.set_tag(key, value.into_owned());
        }
        summary.samples += 1;
    }

    summary
}

fn parse_line(line: &str) -> Option<Sample<'_>> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_ascii_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_metric_name(name) {
        return None;
    }

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if let Some(inner) = rest.strip_prefix('{') {
        rest = parse_labels(inner, &mut labels)?;
    }

    let mut fields = rest.split_ascii_whitespace();
    let value = parse_value(fields.next()?)?;
    let timestamp = match fields.next() {
        Some(ts) => Some(parse_timestamp(ts)?),
        None => None,
    };
    if fields.next().is_some() {
        return None;
    }

    Some(Sample {
        name,
        labels,
        value,
        timestamp,
    })
}

/// Parses the label set after the opening brace and returns the remainder after the closing one.
fn parse_labels<'a>(
    mut input: &'a str,
    labels: &mut Vec<(&'a str, Cow<'a, str>)>,
) -> Option<&'a str> {
    loop {
        input = input.trim_start();
        if let Some(rest) = input.strip_prefix('}') {
            return Some(rest);
        }

        let (key, rest) = input.split_once('=')?;
        let key = key.trim();
        if !is_label_name(key) {
            return None;
        }

        let rest = rest.trim_start().strip_prefix('"')?;
        let (value, rest) = parse_quoted(rest)?;
        labels.push((key, value));

        input = rest.trim_start();
        if let Some(rest) = input.strip_prefix(',') {
            input = rest;
        } else if !input.starts_with('}') {
            return None;
        }
    }
}

/// Reads a quoted label value up to the closing quote, resolving escapes.
fn parse_quoted(input: &str) -> Option<(Cow<'_, str>, &str)> {
    let mut escaped: Option<String> = None;
    let mut chars = input.char_indices();

    while let Some((index, c)) = chars.next() {
        match c {
            '"' => {
                let value = match escaped {
                    Some(owned) => Cow::Owned(owned),
                    None => Cow::Borrowed(&input[..index]),
                };
                return Some((value, &input[index + 1..]));
            }
            '\\' => {
                let owned = escaped.get_or_insert_with(|| input[..index].to_owned());
                match chars.next()?.1 {
                    'n' => owned.push('\n'),
                    '\\' => owned.push('\\'),
                    '"' => owned.push('"'),
                    other => {
                        owned.push('\\');
                        owned.push(other);
                    }
                }
            }
            c => {
                if let Some(owned) = escaped.as_mut() {
                    owned.push(c);
                }
            }
        }
    }

    None
}

fn parse_value(input: &str) -> Option<f64> {
    match input {
        "NaN" => Some(f64::NAN),
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        _ => input.parse().ok().filter(|value: &f64| !value.is_nan()),
    }
}

fn parse_timestamp(input: &str) -> Option<Timestamp> {
    let millis: i64 = input.parse().ok()?;
    u64::try_from(millis).ok().map(Timestamp::from_millis)
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use gleaner_event::MetricEvent;

    use super::*;

    fn read(body: &str) -> (EventGroup, ReadSummary) {
        let mut group = EventGroup::new();
        let summary = read_exposition(body, &mut group, Timestamp::from_millis(1_000));
        (group, summary)
    }

    fn describe(event: &MetricEvent) -> String {
        let tags: Vec<_> = event.tags().iter().map(|(k, v)| format!("{k}={v:?}")).collect();
        format!(
            "{} {} @{} [{}]",
            event.name(),
            event.value().as_f64(),
            event.timestamp().as_millis(),
            tags.join(",")
        )
    }

    fn describe_all(group: &EventGroup) -> Vec<String> {
        group
            .events()
            .iter()
            .filter_map(|event| event.as_metric())
            .map(describe)
            .collect()
    }

    #[test]
    fn test_read_samples() {
        let body = r#"
# HELP http_requests_total The total number of HTTP requests.
# TYPE http_requests_total counter
http_requests_total{method="post",code="200"} 1027 1395066363000
http_requests_total{method="post",code="400"}    3 1395066363000

process_start_time_seconds 1.7e9
node:cpu_seconds:rate5m{ cpu = "0" , } 0.25
"#;
        let (group, summary) = read(body);

        assert_eq!(summary, ReadSummary { samples: 4, skipped: 0 });
        insta::assert_debug_snapshot!(describe_all(&group), @r###"
        [
            "http_requests_total 1027 @1395066363000 [__name__=\"http_requests_total\",method=\"post\",code=\"200\"]",
            "http_requests_total 3 @1395066363000 [__name__=\"http_requests_total\",method=\"post\",code=\"400\"]",
            "process_start_time_seconds 1700000000 @1000 [__name__=\"process_start_time_seconds\"]",
            "node:cpu_seconds:rate5m 0.25 @1000 [__name__=\"node:cpu_seconds:rate5m\",cpu=\"0\"]",
        ]
        "###);
    }

    #[test]
    fn test_read_escapes() {
        let body = r#"msdos_file_access_time_seconds{path="C:\\DIR\\FILE.TXT",error="Cannot find file:\n\"FILE.TXT\""} 1.458255915e9"#;
        let (group, summary) = read(body);

        assert_eq!(summary.samples, 1);
        let event = group.events()[0].as_metric().unwrap();
        assert_eq!(event.tag("path"), r"C:\DIR\FILE.TXT");
        assert_eq!(event.tag("error"), "Cannot find file:\n\"FILE.TXT\"");
    }

    #[test]
    fn test_read_special_values() {
        let body = "a NaN\nb +Inf\nc -Inf\nd Inf";
        let (group, _) = read(body);

        let values: Vec<_> = group
            .events()
            .iter()
            .filter_map(|event| event.as_metric())
            .map(|event| event.value().as_f64())
            .collect();
        assert!(values[0].is_nan());
        assert_eq!(values[1..], [f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY]);
    }

    #[test]
    fn test_skip_malformed() {
        let body = "\
good 1
9bad_name 1
missing_value
bad_value abc
unterminated{a=\"b} 1
missing_quote{a=b} 1
bad_label{9a=\"b\"} 1
trailing 1 2 3
negative_ts 1 -5
also_good{a=\"b\"} 2
";
        let (group, summary) = read(body);

        assert_eq!(summary, ReadSummary { samples: 2, skipped: 8 });
        let names: Vec<_> = group
            .events()
            .iter()
            .filter_map(|event| event.as_metric())
            .map(|event| event.name().to_owned())
            .collect();
        assert_eq!(names, ["good", "also_good"]);
    }

    #[test]
    fn test_tracked_size_matches_labels() {
        let (group, _) = read(r#"up{job="node"} 1"#);
        let event = group.events()[0].as_metric().unwrap();
        assert_eq!(
            event.tags().tracked_size(),
            "__name__".len() + "up".len() + "job".len() + "node".len()
        );
    }
}
