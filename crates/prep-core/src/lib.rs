//! Shared model and helpers for the Statbel data preparation pipeline.
//!
//! Holds the output data model, the error type, the settings layer and the
//! pure transformations (rounding, COICOP codes, text folding, grouping
//! resolution) used by the data and runtime crates.

pub mod coicop;
pub mod error;
pub mod grouping;
pub mod models;
pub mod rounding;
pub mod settings;
pub mod text;
pub mod timescale;

pub use error::{PrepError, Result};
