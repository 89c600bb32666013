use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Activity status of a site. Only `online` sites are sampled; the status
/// itself is managed by the CRUD layer and read-only here.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Online,
    Offline,
    Maintenance,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    pub status: SiteStatus,
}

impl Site {
    pub fn is_online(&self) -> bool {
        self.status == SiteStatus::Online
    }
}

/// The metric types produced for every site on each tick.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    PvGeneration,
    NetLoad,
    GridDraw,
    BatteryDischarge,
    Soc,
    Voltage,
    Current,
    Frequency,
    Thd,
    PowerFactor,
    VoltageUnbalance,
    TempC,
}

impl MetricKind {
    pub const ALL: [MetricKind; 12] = [
        MetricKind::PvGeneration,
        MetricKind::NetLoad,
        MetricKind::GridDraw,
        MetricKind::BatteryDischarge,
        MetricKind::Soc,
        MetricKind::Voltage,
        MetricKind::Current,
        MetricKind::Frequency,
        MetricKind::Thd,
        MetricKind::PowerFactor,
        MetricKind::VoltageUnbalance,
        MetricKind::TempC,
    ];

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::PvGeneration
            | MetricKind::NetLoad
            | MetricKind::GridDraw
            | MetricKind::BatteryDischarge => "kW",
            MetricKind::Soc | MetricKind::Thd | MetricKind::VoltageUnbalance => "%",
            MetricKind::Voltage => "V",
            MetricKind::Current => "A",
            MetricKind::Frequency => "Hz",
            MetricKind::PowerFactor => "",
            MetricKind::TempC => "°C",
        }
    }
}

/// One typed measurement, immutable once written to the store.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub site_id: String,
    pub metric: MetricKind,
    pub value: f64,
    pub unit: String,
    pub time: DateTime<Utc>,
}

/// All samples produced for one site in one tick, sharing a timestamp.
/// This is the unit of broadcast.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub site_id: String,
    pub time: DateTime<Utc>,
    pub values: BTreeMap<MetricKind, f64>,
}

impl Snapshot {
    pub fn empty(site_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            site_id: site_id.into(),
            time,
            values: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, metric: MetricKind) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    /// Expands the snapshot into store rows, one per metric.
    pub fn samples(&self) -> Vec<Sample> {
        self.values
            .iter()
            .map(|(metric, value)| Sample {
                site_id: self.site_id.clone(),
                metric: *metric,
                value: *value,
                unit: metric.unit().to_string(),
                time: self.time,
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// A derived power-quality alert. Ephemeral: pushed once, never persisted
/// or re-delivered by this crate.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: Uuid,
    pub site_id: String,
    pub severity: Severity,
    pub message: String,
    pub metric: MetricKind,
    pub threshold: f64,
    pub observed_value: f64,
    pub time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_expands_to_one_sample_per_metric() {
        let now = Utc::now();
        let mut snapshot = Snapshot::empty("site-1", now);
        snapshot.values.insert(MetricKind::Frequency, 50.02);
        snapshot.values.insert(MetricKind::Soc, 71.5);

        let samples = snapshot.samples();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.site_id == "site-1" && s.time == now));
        let freq = samples.iter().find(|s| s.metric == MetricKind::Frequency).unwrap();
        assert_eq!(freq.unit, "Hz");
        assert_eq!(freq.value, 50.02);
    }

    #[test]
    fn metric_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MetricKind::PvGeneration).unwrap();
        assert_eq!(json, "\"pv_generation\"");
        let json = serde_json::to_string(&MetricKind::VoltageUnbalance).unwrap();
        assert_eq!(json, "\"voltage_unbalance\"");
    }
}
