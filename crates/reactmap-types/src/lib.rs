//! Shared types for the reactmap reaction clustering engine.

mod algorithm;
mod context;
mod run;

pub use algorithm::*;
pub use context::*;
pub use run::*;
