use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{AlertEvent, Snapshot};
use crate::server::registry::SubscriptionRegistry;
use crate::web::models::websocket_models::{AlertPayload, SnapshotPayload, WsMessage};

/// Fans one site's payload out to every room member and global listener.
/// Delivery is best-effort per connection: a failed or timed-out send
/// removes that connection and never disturbs the others. Tick order per
/// connection is preserved by the single outbound queue each connection
/// drains, combined with the scheduler's non-overlap rule.
pub struct SnapshotBroadcaster {
    registry: Arc<SubscriptionRegistry>,
}

impl SnapshotBroadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn broadcast_snapshot(&self, snapshot: &Snapshot) {
        let message = WsMessage::MetricsUpdate(SnapshotPayload::from_snapshot(snapshot));
        self.deliver(&snapshot.site_id, message).await;
    }

    /// Alerts ride the same per-site + global path as metric updates,
    /// immediately rather than batched with the next tick.
    pub async fn broadcast_alert(&self, alert: &AlertEvent) {
        let message = WsMessage::Alert(AlertPayload::from(alert));
        self.deliver(&alert.site_id, message).await;
    }

    async fn deliver(&self, site_id: &str, message: WsMessage) {
        let recipients = self.registry.recipients_for(site_id);
        if recipients.is_empty() {
            debug!(site_id, "No subscribers for broadcast.");
            return;
        }

        let sends = recipients.into_iter().map(|handle| {
            let message = message.clone();
            async move { (handle.id(), handle.send(message).await) }
        });

        for (connection_id, result) in join_all(sends).await {
            if let Err(e) = result {
                warn!(connection_id = %connection_id, site_id, error = %e,
                    "Delivery failed; removing connection from registry.");
                self.registry.remove_connection(connection_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, Severity};
    use crate::store::InMemoryMetricsStore;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn setup() -> (Arc<SubscriptionRegistry>, SnapshotBroadcaster) {
        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::new(InMemoryMetricsStore::new()),
            Duration::from_millis(100),
        ));
        let broadcaster = SnapshotBroadcaster::new(registry.clone());
        (registry, broadcaster)
    }

    fn snapshot(site_id: &str) -> Snapshot {
        let mut snapshot = Snapshot::empty(site_id, Utc::now());
        snapshot.values.insert(MetricKind::Frequency, 50.0);
        snapshot
    }

    #[tokio::test]
    async fn members_receive_updates_after_join_but_not_after_leave() {
        let (registry, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = registry.register(tx);
        registry.join(handle.id(), "site-1").await;
        let _ = rx.recv().await; // discard hydration

        broadcaster.broadcast_snapshot(&snapshot("site-1")).await;
        assert!(matches!(rx.try_recv(), Ok(WsMessage::MetricsUpdate(_))));

        registry.leave(handle.id(), "site-1");
        broadcaster.broadcast_snapshot(&snapshot("site-1")).await;
        assert!(rx.try_recv().is_err(), "no delivery after leave");
    }

    #[tokio::test]
    async fn dead_connection_is_removed_without_disturbing_others() {
        let (registry, broadcaster) = setup();

        let (tx_dead, rx_dead) = mpsc::channel(8);
        let dead = registry.register(tx_dead);
        registry.join(dead.id(), "site-1").await;
        drop(rx_dead); // client disconnects after joining

        let (tx_live, mut rx_live) = mpsc::channel(8);
        let live = registry.register(tx_live);
        registry.join(live.id(), "site-1").await;
        let _ = rx_live.recv().await;

        broadcaster.broadcast_snapshot(&snapshot("site-1")).await;

        assert!(matches!(rx_live.try_recv(), Ok(WsMessage::MetricsUpdate(_))));
        let members = registry.members("site-1");
        assert_eq!(members, vec![live.id()]);
        assert!(!members.contains(&dead.id()));
    }

    #[tokio::test]
    async fn global_listeners_receive_every_site_and_alerts() {
        let (registry, broadcaster) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = registry.register(tx);
        registry.subscribe_global(handle.id());

        broadcaster.broadcast_snapshot(&snapshot("site-1")).await;
        broadcaster.broadcast_snapshot(&snapshot("site-2")).await;
        assert!(matches!(rx.try_recv(), Ok(WsMessage::MetricsUpdate(_))));
        assert!(matches!(rx.try_recv(), Ok(WsMessage::MetricsUpdate(_))));

        let alert = AlertEvent {
            id: Uuid::new_v4(),
            site_id: "site-1".to_string(),
            severity: Severity::Medium,
            message: "Frequency out of range".to_string(),
            metric: MetricKind::Frequency,
            threshold: 49.5,
            observed_value: 49.2,
            time: Utc::now(),
        };
        broadcaster.broadcast_alert(&alert).await;
        assert!(matches!(rx.try_recv(), Ok(WsMessage::Alert(_))));
    }
}
