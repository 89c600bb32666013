use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{MetricKind, Sample};

pub mod memory;

pub use memory::InMemoryMetricsStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("metric write failed: {0}")]
    WriteFailed(String),
    #[error("metric query failed: {0}")]
    QueryFailed(String),
}

/// The narrow persistence interface the pipeline consumes. The real
/// relational store lives behind this trait; the crate ships an in-memory
/// implementation for local operation and tests.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Bulk durable append of one tick's rows. Safe to call concurrently
    /// for different sites.
    async fn insert_metrics(&self, rows: Vec<Sample>) -> Result<(), StoreError>;

    /// The most recent sample per metric type for a site. Used to hydrate
    /// a client's first push after subscribing, independent of tick cadence.
    async fn latest_metrics(&self, site_id: &str)
        -> Result<HashMap<MetricKind, Sample>, StoreError>;

    /// History backfill for the reporting endpoints (out of scope here).
    async fn recent_metrics(
        &self,
        site_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError>;
}
