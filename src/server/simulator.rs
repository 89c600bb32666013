use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use tracing::warn;

use crate::models::{MetricKind, Site, Snapshot};

/// Nameplate PV capacity assumed per site, in kW.
const PV_CAPACITY_KW: f64 = 250.0;

/// Produces one physically plausible snapshot for a site at `now`.
/// Pure computation, no I/O: solar output follows a daylight-shaped curve
/// keyed on hour-of-day, state of charge stays within [0, 100], grid draw
/// never goes negative. A malformed site yields an empty snapshot so the
/// tick can proceed for the other sites.
pub fn generate_snapshot(site: &Site, now: DateTime<Utc>) -> Snapshot {
    if site.id.trim().is_empty() {
        warn!(site_name = %site.name, "Site has an empty id; producing empty snapshot.");
        return Snapshot::empty(site.id.clone(), now);
    }

    let mut rng = rand::rng();
    let mut snapshot = Snapshot::empty(site.id.clone(), now);

    let hour = now.hour() as f64 + now.minute() as f64 / 60.0;

    // Daylight-shaped PV curve: zero outside 06:00-18:00, peaking at noon.
    let daylight = if (6.0..18.0).contains(&hour) {
        ((hour - 6.0) / 12.0 * std::f64::consts::PI).sin()
    } else {
        0.0
    };
    let pv_generation = PV_CAPACITY_KW * daylight * rng.random_range(0.85..1.0);

    let net_load = rng.random_range(150.0..300.0);

    // The battery covers part of any shortfall; the grid takes the rest.
    let shortfall = (net_load - pv_generation).max(0.0);
    let battery_discharge = (shortfall * rng.random_range(0.2..0.6)).min(shortfall);
    let grid_draw = (shortfall - battery_discharge).max(0.0);

    // SOC drifts up through the day and down in the evening.
    let soc = (55.0 + 35.0 * ((hour - 9.0) / 12.0 * std::f64::consts::PI).sin()
        + rng.random_range(-3.0..3.0))
    .clamp(0.0, 100.0);

    snapshot.values.insert(MetricKind::PvGeneration, round2(pv_generation));
    snapshot.values.insert(MetricKind::NetLoad, round2(net_load));
    snapshot.values.insert(MetricKind::GridDraw, round2(grid_draw));
    snapshot
        .values
        .insert(MetricKind::BatteryDischarge, round2(battery_discharge));
    snapshot.values.insert(MetricKind::Soc, round2(soc));
    snapshot
        .values
        .insert(MetricKind::Voltage, round2(rng.random_range(229.0..231.0)));
    snapshot
        .values
        .insert(MetricKind::Current, round2(rng.random_range(95.0..105.0)));
    snapshot
        .values
        .insert(MetricKind::Frequency, round2(rng.random_range(49.9..50.1)));
    snapshot
        .values
        .insert(MetricKind::Thd, round2(rng.random_range(1.0..4.0)));
    snapshot
        .values
        .insert(MetricKind::PowerFactor, round2(rng.random_range(0.92..0.99)));
    snapshot.values.insert(
        MetricKind::VoltageUnbalance,
        round2(rng.random_range(0.2..1.5)),
    );
    snapshot
        .values
        .insert(MetricKind::TempC, round2(rng.random_range(30.0..35.0)));

    snapshot
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteStatus;
    use chrono::TimeZone;

    fn site(id: &str) -> Site {
        Site {
            id: id.to_string(),
            name: "Test Site".to_string(),
            status: SiteStatus::Online,
        }
    }

    #[test]
    fn snapshot_covers_every_metric_kind() {
        let now = Utc::now();
        let snapshot = generate_snapshot(&site("site-1"), now);
        assert_eq!(snapshot.site_id, "site-1");
        assert_eq!(snapshot.time, now);
        for kind in MetricKind::ALL {
            assert!(snapshot.get(kind).is_some(), "missing {kind:?}");
        }
    }

    #[test]
    fn pv_is_zero_at_night_and_positive_at_noon() {
        let midnight = Utc.with_ymd_and_hms(2026, 6, 15, 0, 30, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap();

        let night = generate_snapshot(&site("site-1"), midnight);
        assert_eq!(night.get(MetricKind::PvGeneration), Some(0.0));

        let day = generate_snapshot(&site("site-1"), noon);
        assert!(day.get(MetricKind::PvGeneration).unwrap() > 0.0);
    }

    #[test]
    fn physical_bounds_hold() {
        let now = Utc::now();
        for _ in 0..50 {
            let snapshot = generate_snapshot(&site("site-1"), now);
            let soc = snapshot.get(MetricKind::Soc).unwrap();
            assert!((0.0..=100.0).contains(&soc));
            assert!(snapshot.get(MetricKind::GridDraw).unwrap() >= 0.0);
            assert!(snapshot.get(MetricKind::BatteryDischarge).unwrap() >= 0.0);
        }
    }

    #[test]
    fn malformed_site_yields_empty_snapshot() {
        let bad = Site {
            id: "  ".to_string(),
            name: "No Id".to_string(),
            status: SiteStatus::Online,
        };
        let snapshot = generate_snapshot(&bad, Utc::now());
        assert!(snapshot.is_empty());
    }
}
