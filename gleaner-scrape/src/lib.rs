//! Per-target scrape scheduling.
//!
//! A [`ScrapeScheduler`] owns the scrape loop of one [`PromTargetInfo`]. All schedulers of an
//! agent share one [`Timer`], which fires their scrape cycles, and one [`ScrapeClient`], which
//! performs the requests. Each scrape produces an [`EventGroup`](gleaner_event::EventGroup) with
//! the parsed samples, the target labels as ambient tags and the scrape metadata that the
//! relabel processor turns into auto-metrics.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gleaner_config::{EventPoolConfig, ScrapeConfig};
//! use gleaner_event::PoolHandle;
//! use gleaner_scrape::{
//!     HttpScrapeClient, PromTargetInfo, ScrapeComponents, ScrapeScheduler, Timer,
//! };
//!
//! # async fn run(config: ScrapeConfig, pool_config: EventPoolConfig) {
//! let pool = PoolHandle::from_config(&pool_config);
//! let _gc = pool.spawn_gc(&pool_config);
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let components = ScrapeComponents {
//!     timer: Timer::start(),
//!     client: Arc::new(HttpScrapeClient::new()),
//!     pool: Some(pool),
//!     sink: Arc::new(tx),
//! };
//!
//! let target = PromTargetInfo::new("10.0.0.1:9100", Default::default());
//! let scheduler = ScrapeScheduler::new(Arc::new(config), target, components);
//! scheduler.start();
//!
//! while let Some(group) = rx.recv().await {
//!     // Relabel and forward the group.
//! #   drop(group);
//! }
//! # }
//! ```
#![warn(missing_docs)]

mod client;
mod exposition;
mod scheduler;
mod statsd;
mod target;
mod timer;

pub use self::client::*;
pub use self::exposition::*;
pub use self::scheduler::*;
pub use self::target::PromTargetInfo;
pub use self::timer::{Timer, TimerEvent, TimerHandle};
