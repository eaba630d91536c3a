//! Relabeling of scraped metrics.
//!
//! The [`RelabelProcessor`] turns a raw scrape result into the exported metric set. It pushes the
//! target labels of a group down onto each metric, resolving collisions according to
//! `honor_labels`, runs the configured [`RelabelRules`], strips internal labels and finally
//! synthesizes the auto-metrics that describe the scrape itself.
//!
//! ```
//! use gleaner_config::ScrapeConfig;
//! use gleaner_event::EventGroup;
//! use gleaner_relabel::RelabelProcessor;
//!
//! let config = ScrapeConfig {
//!     job_name: "node".to_owned(),
//!     ..Default::default()
//! };
//! let processor = RelabelProcessor::new(&config).unwrap();
//!
//! let mut group = EventGroup::new();
//! group.set_tag("job", "node");
//! group.add_metric_event().set_name("node_load1");
//!
//! processor.process(&mut group);
//!
//! let event = group.events()[0].as_metric().unwrap();
//! assert_eq!(event.tag("job"), "node");
//! assert!(group.tags().is_empty());
//! ```
#![warn(missing_docs)]

mod processor;
mod rule;
mod statsd;

pub use self::processor::*;
pub use self::rule::*;
