//! Data layer of the Statbel preparation pipeline.
//!
//! Reads the CPI and household budget survey workbooks, normalizes survey
//! sheets into subgroup tables (cached on disk), joins spending onto the
//! category registry and writes the output document.

pub mod aggregator;
pub mod cache;
pub mod cpi;
pub mod sheet;
pub mod survey;
pub mod workbook;
pub mod writer;

pub use prep_core as core;
