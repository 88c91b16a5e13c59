//! BreadthLab Core: domain types, indicator engine, storage and breadth analysis.
//!
//! This crate contains the numerical heart of the system:
//! - Domain types (bars, segments, indicator snapshots)
//! - Null-aware series math with reset-on-gap semantics
//! - Indicator implementations and the engine composing them
//! - Storage traits with in-memory and Parquet implementations
//! - Breadth sentiment, the uptrend screen and bar aggregation

pub mod analysis;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod series;
