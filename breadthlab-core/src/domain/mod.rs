//! Domain types for BreadthLab

pub mod bar;
pub mod segment;
pub mod snapshot;

pub use bar::{is_storable_symbol, PriceBar};
pub use segment::{MarketSegment, SegmentParseError};
pub use snapshot::IndicatorSnapshot;
