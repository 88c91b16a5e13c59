//! BreadthLab Runner: daily refresh, query facade, result cache, export.
//!
//! This crate builds on `breadthlab-core` to provide:
//! - TOML configuration with defaults for every key
//! - The daily refresh job (parallel, isolated per symbol)
//! - A query facade resolving dates and memoizing results with a TTL
//! - JSON and CSV export of query results

pub mod cache;
pub mod config;
pub mod export;
pub mod query;
pub mod refresh;

pub use cache::ResultCache;
pub use config::{CacheConfig, Config, ConfigError, RefreshConfig, SentimentConfig, StorageConfig};
pub use query::{MoversResult, QueryError, QueryService, ScreenResult};
pub use refresh::{
    RefreshError, RefreshFailure, RefreshJob, RefreshProgress, RefreshSummary, StdoutProgress,
    TracingProgress,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn services_are_send_sync() {
        assert_send::<RefreshJob>();
        assert_sync::<RefreshJob>();
        assert_send::<QueryService>();
        assert_sync::<QueryService>();
        assert_send::<ResultCache>();
        assert_sync::<ResultCache>();
    }
}
