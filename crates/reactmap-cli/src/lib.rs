//! reactmap command-line support: configuration and logging setup.
//!
//! Separated from main.rs so the configuration loader can be integration tested.

pub mod config;
pub mod logging;
