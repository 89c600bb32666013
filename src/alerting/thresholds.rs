use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{AlertEvent, MetricKind, Severity, Snapshot};

/// Power-quality limits a snapshot is checked against after every tick.
#[derive(Deserialize, Debug, Clone)]
pub struct AlertThresholds {
    #[serde(default = "default_frequency_min_hz")]
    pub frequency_min_hz: f64,
    #[serde(default = "default_frequency_max_hz")]
    pub frequency_max_hz: f64,
    #[serde(default = "default_thd_max_percent")]
    pub thd_max_percent: f64,
    #[serde(default = "default_voltage_unbalance_max_percent")]
    pub voltage_unbalance_max_percent: f64,
}

fn default_frequency_min_hz() -> f64 {
    49.5
}

fn default_frequency_max_hz() -> f64 {
    50.5
}

fn default_thd_max_percent() -> f64 {
    5.0
}

fn default_voltage_unbalance_max_percent() -> f64 {
    2.0
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            frequency_min_hz: default_frequency_min_hz(),
            frequency_max_hz: default_frequency_max_hz(),
            thd_max_percent: default_thd_max_percent(),
            voltage_unbalance_max_percent: default_voltage_unbalance_max_percent(),
        }
    }
}

impl AlertThresholds {
    /// Half-width of the allowed frequency band; the unit of "allowed
    /// deviation" when grading frequency breaches.
    fn frequency_allowed_deviation(&self) -> f64 {
        (self.frequency_max_hz - self.frequency_min_hz) / 2.0
    }

    fn frequency_nominal(&self) -> f64 {
        (self.frequency_max_hz + self.frequency_min_hz) / 2.0
    }
}

/// Evaluates one freshly produced snapshot against the thresholds and
/// returns zero or more alert events. Each metric is checked exactly once,
/// so a single breach can never fire twice within one tick's evaluation.
/// Repeats across ticks are not suppressed here; that policy belongs to a
/// higher layer.
pub fn evaluate_snapshot(snapshot: &Snapshot, thresholds: &AlertThresholds) -> Vec<AlertEvent> {
    let mut alerts = Vec::new();

    if let Some(frequency) = snapshot.get(MetricKind::Frequency) {
        if frequency < thresholds.frequency_min_hz || frequency > thresholds.frequency_max_hz {
            let deviation = (frequency - thresholds.frequency_nominal()).abs();
            let breached_bound = if frequency < thresholds.frequency_min_hz {
                thresholds.frequency_min_hz
            } else {
                thresholds.frequency_max_hz
            };
            alerts.push(alert(
                snapshot,
                MetricKind::Frequency,
                breached_bound,
                frequency,
                grade(deviation, thresholds.frequency_allowed_deviation()),
                format!(
                    "Frequency {:.2} Hz outside allowed band {:.1}-{:.1} Hz",
                    frequency, thresholds.frequency_min_hz, thresholds.frequency_max_hz
                ),
            ));
        }
    }

    if let Some(thd) = snapshot.get(MetricKind::Thd) {
        if thd > thresholds.thd_max_percent {
            alerts.push(alert(
                snapshot,
                MetricKind::Thd,
                thresholds.thd_max_percent,
                thd,
                grade(thd, thresholds.thd_max_percent),
                format!(
                    "Total harmonic distortion {:.2}% above limit {:.1}%",
                    thd, thresholds.thd_max_percent
                ),
            ));
        }
    }

    if let Some(unbalance) = snapshot.get(MetricKind::VoltageUnbalance) {
        if unbalance > thresholds.voltage_unbalance_max_percent {
            alerts.push(alert(
                snapshot,
                MetricKind::VoltageUnbalance,
                thresholds.voltage_unbalance_max_percent,
                unbalance,
                grade(unbalance, thresholds.voltage_unbalance_max_percent),
                format!(
                    "Voltage unbalance {:.2}% above limit {:.1}%",
                    unbalance, thresholds.voltage_unbalance_max_percent
                ),
            ));
        }
    }

    alerts
}

/// `high` when the observation exceeds twice the allowed deviation.
fn grade(observed_deviation: f64, allowed_deviation: f64) -> Severity {
    if observed_deviation > 2.0 * allowed_deviation {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn alert(
    snapshot: &Snapshot,
    metric: MetricKind,
    threshold: f64,
    observed_value: f64,
    severity: Severity,
    message: String,
) -> AlertEvent {
    AlertEvent {
        id: Uuid::new_v4(),
        site_id: snapshot.site_id.clone(),
        severity,
        message,
        metric,
        threshold,
        observed_value,
        time: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot_with(metric: MetricKind, value: f64) -> Snapshot {
        let mut snapshot = Snapshot::empty("site-1", Utc::now());
        snapshot.values.insert(metric, value);
        snapshot
    }

    #[test]
    fn low_frequency_fires_exactly_one_medium_alert() {
        let snapshot = snapshot_with(MetricKind::Frequency, 49.2);
        let alerts = evaluate_snapshot(&snapshot, &AlertThresholds::default());

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.metric, MetricKind::Frequency);
        assert_eq!(alert.threshold, 49.5);
        assert_eq!(alert.observed_value, 49.2);
        // Deviation 0.8 Hz is under twice the 0.5 Hz allowed band.
        assert_eq!(alert.severity, Severity::Medium);
    }

    #[test]
    fn large_frequency_deviation_is_high() {
        let snapshot = snapshot_with(MetricKind::Frequency, 48.2);
        let alerts = evaluate_snapshot(&snapshot, &AlertThresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[test]
    fn thd_severity_scales_with_excess() {
        let medium = evaluate_snapshot(
            &snapshot_with(MetricKind::Thd, 7.0),
            &AlertThresholds::default(),
        );
        assert_eq!(medium[0].severity, Severity::Medium);

        let high = evaluate_snapshot(
            &snapshot_with(MetricKind::Thd, 11.0),
            &AlertThresholds::default(),
        );
        assert_eq!(high[0].severity, Severity::High);
    }

    #[test]
    fn healthy_snapshot_fires_nothing() {
        let mut snapshot = Snapshot::empty("site-1", Utc::now());
        snapshot.values.insert(MetricKind::Frequency, 50.02);
        snapshot.values.insert(MetricKind::Thd, 2.1);
        snapshot.values.insert(MetricKind::VoltageUnbalance, 0.6);
        assert!(evaluate_snapshot(&snapshot, &AlertThresholds::default()).is_empty());
    }

    #[test]
    fn multiple_breaches_fire_once_per_metric() {
        let mut snapshot = Snapshot::empty("site-1", Utc::now());
        snapshot.values.insert(MetricKind::Frequency, 51.0);
        snapshot.values.insert(MetricKind::VoltageUnbalance, 3.0);
        let alerts = evaluate_snapshot(&snapshot, &AlertThresholds::default());
        assert_eq!(alerts.len(), 2);
        let metrics: Vec<_> = alerts.iter().map(|a| a.metric).collect();
        assert!(metrics.contains(&MetricKind::Frequency));
        assert!(metrics.contains(&MetricKind::VoltageUnbalance));
    }
}
