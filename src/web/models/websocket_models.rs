use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::models::{AlertEvent, MetricKind, Sample, Severity, Snapshot};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub value: f64,
    pub unit: String,
}

/// One site's metrics as pushed to the dashboard, both for the initial
/// hydration after a join and for the per-tick update.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub site_id: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<MetricKind, MetricValue>,
}

impl SnapshotPayload {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let metrics = snapshot
            .values
            .iter()
            .map(|(kind, value)| {
                (
                    *kind,
                    MetricValue {
                        value: *value,
                        unit: kind.unit().to_string(),
                    },
                )
            })
            .collect();
        Self {
            site_id: snapshot.site_id.clone(),
            timestamp: snapshot.time,
            metrics,
        }
    }

    /// Builds the hydration payload from a `latest_metrics` result. With no
    /// rows yet the metrics map is empty and the timestamp is `now`.
    pub fn from_latest(site_id: &str, latest: HashMap<MetricKind, Sample>) -> Self {
        let timestamp = latest
            .values()
            .map(|s| s.time)
            .max()
            .unwrap_or_else(Utc::now);
        let metrics = latest
            .into_iter()
            .map(|(kind, sample)| {
                (
                    kind,
                    MetricValue {
                        value: sample.value,
                        unit: sample.unit,
                    },
                )
            })
            .collect();
        Self {
            site_id: site_id.to_string(),
            timestamp,
            metrics,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub id: Uuid,
    pub site_id: String,
    pub severity: Severity,
    pub message: String,
    pub metric_type: MetricKind,
    pub threshold: f64,
    pub observed_value: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&AlertEvent> for AlertPayload {
    fn from(alert: &AlertEvent) -> Self {
        Self {
            id: alert.id,
            site_id: alert.site_id.clone(),
            severity: alert.severity,
            message: alert.message.clone(),
            metric_type: alert.metric,
            threshold: alert.threshold,
            observed_value: alert.observed_value,
            timestamp: alert.time,
        }
    }
}

/// Server → client messages on the push channel.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum WsMessage {
    /// Initial hydration, sent exactly once per join.
    SiteData(SnapshotPayload),
    /// Per-tick update for subscribed and global listeners.
    MetricsUpdate(SnapshotPayload),
    /// Derived power-quality alert; bypasses client throttling.
    Alert(AlertPayload),
}

/// Client → server messages. Disconnecting implies leave-all.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    SubscribeSite { site_id: String },
    #[serde(rename_all = "camelCase")]
    UnsubscribeSite { site_id: String },
    SubscribeGlobal,
}
