//! Bar and snapshot storage, CSV ingestion and synthetic data.

pub mod cache;
pub mod ingest;
pub mod memory;
pub mod provider;
pub mod synthetic;

pub use cache::{CacheMeta, ParquetStore};
pub use ingest::{import_csv, import_csv_file, ImportReport};
pub use memory::MemoryStore;
pub use provider::{BarSink, BarSource, DataError, MarketStore, SnapshotStore};
pub use synthetic::{SyntheticConfig, SyntheticUniverse};
