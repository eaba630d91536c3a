//! Configuration for the gleaner scrape pipeline.
//!
//! All configuration is read-only from the pipeline's perspective. The embedding agent builds a
//! [`Config`] from a JSON value or a YAML document, and every section is validated once at
//! construction. Loading files and parsing command line arguments is left to the embedder.
//!
//! # Example
//!
//! ```
//! use gleaner_config::Config;
//!
//! let config = Config::from_yaml_str(
//!     r#"
//! scrape_configs:
//!   - job_name: node
//!     scrape_interval: 15
//!     scrape_timeout: 5
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.scrape_configs()[0].scrape_interval().as_secs(), 15);
//! ```
#![warn(missing_docs)]

mod config;
mod pool;
mod relabel;
mod remote_write;
mod scrape;

pub use self::config::*;
pub use self::pool::*;
pub use self::relabel::*;
pub use self::remote_write::*;
pub use self::scrape::*;
