//! Helpers for testing telemeter crates.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner. All logs emitted with
//!    [`telemeter_log`] will show up for test failures or when run with
//!    `--nocapture`.
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     telemeter_test::setup();
//!
//!     telemeter_log::debug!("hello, world!");
//! }
//! ```

#![warn(missing_docs)]

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this crate and
///    mutes all other logs.
pub fn setup() {
    telemeter_log::init_test!();
}
