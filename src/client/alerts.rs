use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::AlertEvent;

/// Client-side alert bookkeeping. Alerts bypass throttling entirely; the
/// only suppression is of literal re-deliveries (same event id). The
/// active set keeps exactly one instance per message text, so a repeat of
/// the same condition replaces its predecessor instead of stacking up.
#[derive(Debug, Default)]
pub struct AlertTracker {
    seen_ids: HashSet<Uuid>,
    active: HashMap<String, AlertEvent>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the alert should be rendered. Distinct ids are
    /// never suppressed, even with identical message text.
    pub fn apply(&mut self, alert: AlertEvent) -> bool {
        if !self.seen_ids.insert(alert.id) {
            return false;
        }
        self.active.insert(alert.message.clone(), alert);
        true
    }

    /// Clears an alert once the user or a status push resolves it.
    pub fn resolve(&mut self, message: &str) -> Option<AlertEvent> {
        self.active.remove(message)
    }

    pub fn active_alerts(&self) -> impl Iterator<Item = &AlertEvent> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, Severity};
    use chrono::Utc;

    fn alert(id: Uuid, message: &str) -> AlertEvent {
        AlertEvent {
            id,
            site_id: "site-1".to_string(),
            severity: Severity::Medium,
            message: message.to_string(),
            metric: MetricKind::Frequency,
            threshold: 49.5,
            observed_value: 49.2,
            time: Utc::now(),
        }
    }

    #[test]
    fn redelivered_alert_is_suppressed_by_id() {
        let mut tracker = AlertTracker::new();
        let id = Uuid::new_v4();
        assert!(tracker.apply(alert(id, "Frequency out of band")));
        assert!(!tracker.apply(alert(id, "Frequency out of band")));
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn distinct_ids_with_same_message_both_apply_but_one_stays_active() {
        let mut tracker = AlertTracker::new();
        assert!(tracker.apply(alert(Uuid::new_v4(), "Frequency out of band")));
        assert!(tracker.apply(alert(Uuid::new_v4(), "Frequency out of band")));
        // Both rendered, but the in-memory active set holds one instance
        // per (message, active) signature.
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn different_messages_accumulate() {
        let mut tracker = AlertTracker::new();
        assert!(tracker.apply(alert(Uuid::new_v4(), "Frequency out of band")));
        assert!(tracker.apply(alert(Uuid::new_v4(), "THD above limit")));
        assert_eq!(tracker.active_count(), 2);
    }

    #[test]
    fn resolve_removes_from_active_set() {
        let mut tracker = AlertTracker::new();
        tracker.apply(alert(Uuid::new_v4(), "THD above limit"));
        assert!(tracker.resolve("THD above limit").is_some());
        assert_eq!(tracker.active_count(), 0);
        assert!(tracker.resolve("THD above limit").is_none());
    }
}
