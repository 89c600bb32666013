use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

use crate::models::{MetricKind, Sample};

use super::{MetricsStore, StoreError};

/// Rows kept per site before the oldest are discarded. At the default
/// 10-minute tick this covers roughly a week of history.
const MAX_ROWS_PER_SITE: usize = 12 * 1024;

/// DashMap-backed store: one append-only row vector per site.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    rows: DashMap<String, Vec<Sample>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn insert_metrics(&self, rows: Vec<Sample>) -> Result<(), StoreError> {
        for row in rows {
            let mut entry = self.rows.entry(row.site_id.clone()).or_default();
            entry.push(row);
            if entry.len() > MAX_ROWS_PER_SITE {
                let excess = entry.len() - MAX_ROWS_PER_SITE;
                entry.drain(..excess);
            }
        }
        Ok(())
    }

    async fn latest_metrics(
        &self,
        site_id: &str,
    ) -> Result<HashMap<MetricKind, Sample>, StoreError> {
        let mut latest: HashMap<MetricKind, Sample> = HashMap::new();
        if let Some(entry) = self.rows.get(site_id) {
            for row in entry.iter() {
                match latest.get(&row.metric) {
                    Some(existing) if existing.time >= row.time => {}
                    _ => {
                        latest.insert(row.metric, row.clone());
                    }
                }
            }
        }
        Ok(latest)
    }

    async fn recent_metrics(
        &self,
        site_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        let mut out = Vec::new();
        if let Some(entry) = self.rows.get(site_id) {
            out.extend(entry.iter().filter(|row| row.time >= since).cloned());
        }
        out.sort_by_key(|row| row.time);
        Ok(out)
    }
}
