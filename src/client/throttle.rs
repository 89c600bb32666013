use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Which feed a push arrived on. Initial snapshots (the post-join
/// hydration) always apply; periodic updates are throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    InitialSnapshot,
    PeriodicUpdate,
}

/// Client-side update acceptance, independent of server cadence and of any
/// transport. One instance per connected client; state is keyed by
/// `(site_id, feed_kind)`.
#[derive(Debug)]
pub struct AcceptancePolicy {
    min_interval: Duration,
    last_applied: HashMap<(String, FeedKind), DateTime<Utc>>,
}

impl AcceptancePolicy {
    /// `min_interval = tick_interval - slack`: the slack tolerates server
    /// ticks arriving slightly early.
    pub fn new(tick_interval: std::time::Duration, slack: std::time::Duration) -> Self {
        let min_interval = tick_interval.saturating_sub(slack);
        Self {
            min_interval: Duration::from_std(min_interval).unwrap_or_else(|_| Duration::zero()),
            last_applied: HashMap::new(),
        }
    }

    /// Decides whether an incoming snapshot should be applied (update local
    /// state, re-render) or silently discarded. Applying records `now` as
    /// the new baseline for the pair.
    pub fn should_apply(&mut self, site_id: &str, kind: FeedKind, now: DateTime<Utc>) -> bool {
        match kind {
            FeedKind::InitialSnapshot => {
                // Always applied; seeds the periodic clock too, so the
                // hydration counts as the baseline for throttling.
                self.last_applied
                    .insert((site_id.to_string(), FeedKind::InitialSnapshot), now);
                self.last_applied
                    .insert((site_id.to_string(), FeedKind::PeriodicUpdate), now);
                true
            }
            FeedKind::PeriodicUpdate => {
                let key = (site_id.to_string(), FeedKind::PeriodicUpdate);
                match self.last_applied.get(&key) {
                    Some(last) if now - *last < self.min_interval => false,
                    _ => {
                        self.last_applied.insert(key, now);
                        true
                    }
                }
            }
        }
    }

    /// Forgets a site's baseline, e.g. after unsubscribing, so a future
    /// re-join starts fresh.
    pub fn reset_site(&mut self, site_id: &str) {
        self.last_applied.retain(|(site, _), _| site != site_id);
    }
}
