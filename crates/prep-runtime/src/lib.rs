//! Runtime layer of the Statbel preparation pipeline.
//!
//! Turns [`Settings`](prep_core::settings::Settings) into pipeline options,
//! runs the stages in order and reports a summary.

pub mod pipeline;
pub mod prompt;

pub use prep_core as core;
pub use prep_data as data;
