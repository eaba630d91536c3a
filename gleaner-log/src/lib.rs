//! Logging facade for the gleaner scrape pipeline.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be embedded into the agent's configuration.
//!
//! ```
//! # #[cfg(feature = "init")] {
//! use gleaner_log::LogConfig;
//!
//! let log_config = LogConfig {
//!     enable_backtraces: true,
//!     ..LogConfig::default()
//! };
//!
//! gleaner_log::init(&log_config);
//! # }
//! ```
//!
//! # Logging
//!
//! Use the five logging macros [`error!`], [`warn!`], [`info!`], [`debug!`] and [`trace!`].
//!
//! ## Conventions
//!
//! Messages are lowercase, short, and carry no trailing punctuation. Levels are used as follows:
//!
//! - [`error!`] when the pipeline itself misbehaves.
//! - [`warn!`] for undesirable behavior, such as a target that cannot keep up with its interval.
//! - [`info!`] for lifecycle events such as starting the metrics client.
//! - [`debug!`] for messages usually relevant to debugging, such as failed scrapes.
//! - [`trace!`] for per-line detail, such as skipped exposition lines.
//!
//! Errors are attached as structured fields rather than formatted into the message:
//!
//! ```
//! let error = std::io::Error::other("connection reset");
//! gleaner_log::debug!(
//!     error = &error as &dyn std::error::Error,
//!     instance = "10.0.0.1:9100",
//!     "scrape failed"
//! );
//! ```
//!
//! # Testing
//!
//! Tests call [`init_test!`] first. Logs then go to the test writer with every level enabled for
//! the pipeline crates.
//!
//! ```ignore
//! #[test]
//! fn test_something() {
//!     gleaner_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
pub use test::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
