use std::hash::Hasher as _;

use hash32::{FnvHasher, Hasher as _};
use indexmap::IndexMap;

/// Identity of a scrape target.
///
/// A target is immutable for the lifetime of its scheduler. When the target set changes, the
/// scheduler is cancelled and a new one is constructed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromTargetInfo {
    /// Target labels, pushed down onto every scraped sample as ambient tags.
    pub labels: IndexMap<String, String>,
    /// The `host:port` address of the target.
    pub instance: String,
    /// Content hash identifying the target within its job.
    pub hash: String,
    /// Hash used to distribute targets across agents.
    pub hash_for_operator: String,
    /// Offset in milliseconds added to the first scrape after a rebalance.
    pub rebalance_ms: u64,
}

impl PromTargetInfo {
    /// Creates a target from its labels and instance, deriving both hashes from the content.
    pub fn new(instance: impl Into<String>, labels: IndexMap<String, String>) -> Self {
        let instance = instance.into();
        let hash = format!("{:08x}", content_hash(&instance, &labels));

        Self {
            labels,
            hash_for_operator: hash.clone(),
            hash,
            instance,
            rebalance_ms: 0,
        }
    }

    /// Splits [`instance`](Self::instance) into host and port.
    ///
    /// Returns `None` if the instance has no numeric port.
    pub fn host_port(&self) -> Option<(&str, u16)> {
        let (host, port) = self.instance.rsplit_once(':')?;
        let port = port.parse().ok()?;
        Some((host.trim_start_matches('[').trim_end_matches(']'), port))
    }
}

/// Stable hash over the instance and the sorted labels.
fn content_hash(instance: &str, labels: &IndexMap<String, String>) -> u32 {
    let mut sorted: Vec<_> = labels.iter().collect();
    sorted.sort();

    let mut hasher = FnvHasher::default();
    hasher.write(instance.as_bytes());
    for (key, value) in sorted {
        hasher.write(&[0xff]);
        hasher.write(key.as_bytes());
        hasher.write(&[0xfe]);
        hasher.write(value.as_bytes());
    }
    hasher.finish32()
}

/// Returns the phase of `hash` within `interval_ms`.
///
/// Targets with the same interval but different hashes land on different phases, which spreads
/// their scrapes across the interval.
pub(crate) fn phase_offset_ms(hash: &str, interval_ms: u64) -> u64 {
    if interval_ms == 0 {
        return 0;
    }

    let mut hasher = FnvHasher::default();
    hasher.write(hash.as_bytes());
    u64::from(hasher.finish32()) % interval_ms
}

/// Returns the delay until the first scrape of a target, given the current wall clock.
///
/// The first scrape happens at the next wall clock instant matching the target's phase, shifted
/// by the rebalance offset.
pub(crate) fn first_scrape_delay_ms(
    hash: &str,
    interval_ms: u64,
    rebalance_ms: u64,
    now_ms: u64,
) -> u64 {
    if interval_ms == 0 {
        return rebalance_ms;
    }

    let offset = phase_offset_ms(hash, interval_ms);
    let jitter = (offset + interval_ms - now_ms % interval_ms) % interval_ms;
    rebalance_ms + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_hash_ignores_label_order() {
        let a = PromTargetInfo::new("h:1", labels(&[("job", "a"), ("zone", "b")]));
        let b = PromTargetInfo::new("h:1", labels(&[("zone", "b"), ("job", "a")]));
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 8);
        assert_eq!(a.hash_for_operator, a.hash);
    }

    #[test]
    fn test_hash_depends_on_content() {
        let a = PromTargetInfo::new("h:1", labels(&[("job", "a")]));
        let b = PromTargetInfo::new("h:2", labels(&[("job", "a")]));
        let c = PromTargetInfo::new("h:1", labels(&[("job", "b")]));
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_host_port() {
        let target = PromTargetInfo::new("10.0.0.1:9100", IndexMap::new());
        assert_eq!(target.host_port(), Some(("10.0.0.1", 9100)));

        let target = PromTargetInfo::new("[::1]:8080", IndexMap::new());
        assert_eq!(target.host_port(), Some(("::1", 8080)));

        let target = PromTargetInfo::new("localhost", IndexMap::new());
        assert_eq!(target.host_port(), None);
    }

    #[test]
    fn test_first_delay_aligns_to_phase() {
        let interval = 15_000;
        let offset = phase_offset_ms("abc", interval);

        for now in [0, 1, offset, offset + 1, 1_700_000_000_123] {
            let delay = first_scrape_delay_ms("abc", interval, 0, now);
            assert!(delay < interval);
            assert_eq!((now + delay) % interval, offset);
        }
    }

    #[test]
    fn test_first_delay_adds_rebalance() {
        let without = first_scrape_delay_ms("abc", 10_000, 0, 42);
        let with = first_scrape_delay_ms("abc", 10_000, 2_500, 42);
        assert_eq!(with, without + 2_500);
    }

    #[test]
    fn test_zero_interval() {
        assert_eq!(phase_offset_ms("abc", 0), 0);
        assert_eq!(first_scrape_delay_ms("abc", 0, 7, 42), 7);
    }
}
