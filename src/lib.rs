// src/lib.rs

/// YAML pipeline configuration + environment overrides
pub mod config;
/// Grouped aggregates over the daily quota facts
pub mod curated;
pub mod diagnostics;
/// Reference tables built from the configuration
pub mod dimensions;
pub mod error;
/// Month window, archive URLs and downloading
pub mod fetch;
pub mod filter;
/// CSV / Parquet / JSON writers
pub mod output;
pub mod pipeline;
/// Archive extraction, column mapping and the per-family parsers
pub mod process;
pub mod table;
/// BigQuery loads
pub mod warehouse;

#[cfg(test)]
mod testutil;
