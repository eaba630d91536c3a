//! Helpers for testing the scrape pipeline.
//!
//! In every test that exercises logging code paths, call [`setup`]. This sets up the logger so
//! that all console output is captured by the test runner. Logs emitted through [`gleaner_log`]
//! show up for failing tests or when run with `--nocapture`.
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     gleaner_test::setup();
//!
//!     gleaner_log::debug!("hello, world!");
//! }
//! ```

/// Sets up the test environment.
///
///  - Initializes logs: the logger captures all `gleaner*` crates at trace level and mutes other
///    crates.
pub fn setup() {
    gleaner_log::init_test!();
}
