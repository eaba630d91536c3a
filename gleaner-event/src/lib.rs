//! Events, event groups and the pool recycling them.
//!
//! Every scraped sample becomes a [`MetricEvent`] inside an [`EventGroup`]. Events carry their
//! labels in a [`SizedTags`] container that tracks its own byte footprint, so memory accounting
//! never needs to walk the labels.
//!
//! Events are allocated through an event pool. The pool keeps released events on per-variant
//! free-lists and hands them out again, which keeps steady-state allocation close to zero under
//! high scrape frequencies. Two flavours exist and the choice is made at construction:
//!
//!  - [`EventPool`] for a single owning task. It takes `&mut self` and never locks.
//!  - [`SharedEventPool`] for concurrent producers plus one maintenance task. Releases go to a
//!    staging list so producers do not contend with garbage collection.
//!
//! [`PoolHandle::from_config`] picks the flavour from the pool configuration and is what event
//! groups and schedulers hold.
//!
//! ```
//! use std::sync::Arc;
//!
//! use gleaner_event::{EventGroup, EventVariant, SharedEventPool};
//!
//! let pool = Arc::new(SharedEventPool::new());
//! let mut group = EventGroup::with_pool(pool.clone());
//!
//! let event = group.add_metric_event();
//! event.set_name("up");
//! event.set_tag("instance", "localhost:9100");
//!
//! drop(group);
//! assert_eq!(pool.staged(EventVariant::Metric), 1);
//! ```
#![warn(missing_docs)]

mod event;
mod group;
mod pool;
mod statsd;
mod tags;

pub use self::event::*;
pub use self::group::*;
pub use self::pool::*;
pub use self::tags::*;
