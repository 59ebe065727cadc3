//! Multi-key reservation index and category assignment

use super::record::{ReservationRecord, ReservationSummary};
use crate::models::{Category, MatchKey, ResourceRecord};
use crate::observability::EngineMetrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Index from match key to reservation positions
///
/// Two maps are kept: one keyed by availability zone, holding the zonal
/// reservations, and one keyed by region, holding every reservation. A
/// resource whose zone misses can still fall back to a zonal reservation
/// elsewhere in its region. Candidates under one key keep insertion order,
/// so the first purchased reservation is matched first.
///
/// Consumption counters only grow. Build a fresh index (or call
/// [`ReservationIndex::reset_consumption`]) before classifying the same
/// resources again, otherwise capacity is counted twice.
pub struct ReservationIndex {
    records: Vec<ReservationRecord>,
    by_zone: HashMap<MatchKey, Vec<usize>>,
    by_region: HashMap<MatchKey, Vec<usize>>,
    metrics: EngineMetrics,
}

impl ReservationIndex {
    /// Index every reservation under its region key, and zonal ones under their zone key too
    pub fn build(reservations: Vec<ReservationRecord>) -> Self {
        let mut by_zone: HashMap<MatchKey, Vec<usize>> = HashMap::new();
        let mut by_region: HashMap<MatchKey, Vec<usize>> = HashMap::new();

        for (position, reservation) in reservations.iter().enumerate() {
            if let Some(zone_key) = reservation.zone_key() {
                by_zone.entry(zone_key).or_default().push(position);
            }
            by_region
                .entry(reservation.region_key())
                .or_default()
                .push(position);
        }

        debug!(
            reservations = reservations.len(),
            zone_keys = by_zone.len(),
            region_keys = by_region.len(),
            "Reservation index built"
        );

        Self {
            records: reservations,
            by_zone,
            by_region,
            metrics: EngineMetrics::new(),
        }
    }

    /// Decide the ownership category of a resource, consuming capacity on a match
    ///
    /// Returns `None` for resources that are not running: they never
    /// consume reservations.
    pub fn classify(&mut self, resource: &ResourceRecord, now: DateTime<Utc>) -> Option<Category> {
        if !resource.is_running() {
            return None;
        }

        if resource.is_spot() {
            return Some(Category::Spot);
        }

        let matched = consume_first(&self.by_zone, &mut self.records, &resource.zone_key(), now)
            .or_else(|| {
                consume_first(&self.by_region, &mut self.records, &resource.region_key(), now)
            });

        match matched {
            Some(position) => {
                self.metrics.inc_reservations_consumed();
                debug!(
                    resource_id = %resource.id(),
                    reservation_id = %self.records[position].id(),
                    "Resource matched to reservation"
                );
                Some(Category::Reserved)
            }
            None => Some(Category::OnDemand),
        }
    }

    pub fn records(&self) -> &[ReservationRecord] {
        &self.records
    }

    pub fn get(&self, reservation_id: &str) -> Option<&ReservationRecord> {
        self.records.iter().find(|r| r.id() == reservation_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Zero every consumption counter so the index can serve another run
    pub fn reset_consumption(&mut self) {
        for record in &mut self.records {
            record.reset_consumed();
        }
    }

    /// Reporting view of every reservation, in insertion order
    pub fn summaries(
        &self,
        now: DateTime<Utc>,
        expiry_days: u32,
        capacity_threshold_percent: f64,
    ) -> Vec<ReservationSummary> {
        self.records
            .iter()
            .map(|r| r.summary(now, expiry_days, capacity_threshold_percent))
            .collect()
    }

    pub fn into_records(self) -> Vec<ReservationRecord> {
        self.records
    }
}

/// Consume one unit from the first available candidate under `key`
fn consume_first(
    map: &HashMap<MatchKey, Vec<usize>>,
    records: &mut [ReservationRecord],
    key: &MatchKey,
    now: DateTime<Utc>,
) -> Option<usize> {
    map.get(key)?
        .iter()
        .copied()
        .find(|&position| records[position].try_consume(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceDescriptor, ResourceKind, ResourceState};
    use crate::reservation::ReservationDescriptor;
    use chrono::Duration;

    fn reservation(
        id: &str,
        zone: Option<&str>,
        count: u32,
        end: DateTime<Utc>,
    ) -> ReservationRecord {
        ReservationRecord::new(ReservationDescriptor {
            id: id.to_string(),
            state: "active".to_string(),
            region: "us-east-1".to_string(),
            availability_zone: zone.map(str::to_string),
            tenancy: "default".to_string(),
            instance_type: "t3.micro".to_string(),
            platform: "Linux/UNIX".to_string(),
            purchased_count: count,
            start: end - Duration::days(365),
            end,
        })
        .unwrap()
    }

    fn instance(id: &str, zone: &str) -> ResourceRecord {
        ResourceRecord::new(ResourceDescriptor {
            id: id.to_string(),
            kind: ResourceKind::ComputeInstance,
            state: ResourceState::Running,
            region: "us-east-1".to_string(),
            availability_zone: zone.to_string(),
            tenancy: "default".to_string(),
            instance_type: "t3.micro".to_string(),
            platform: "Linux/UNIX".to_string(),
            spot_request_id: None,
        })
        .unwrap()
    }

    #[test]
    fn test_capacity_exhaustion_scenario() {
        let now = Utc::now();
        let mut index = ReservationIndex::build(vec![reservation(
            "ri-1",
            Some("us-east-1a"),
            2,
            now + Duration::days(30),
        )]);

        assert_eq!(index.classify(&instance("i-1", "us-east-1a"), now), Some(Category::Reserved));
        assert_eq!(index.classify(&instance("i-2", "us-east-1a"), now), Some(Category::Reserved));
        assert_eq!(index.get("ri-1").unwrap().consumed(), 2);

        assert_eq!(index.classify(&instance("i-3", "us-east-1a"), now), Some(Category::OnDemand));
        assert_eq!(index.get("ri-1").unwrap().consumed(), 2);
    }

    #[test]
    fn test_region_fallback() {
        let now = Utc::now();
        let mut index =
            ReservationIndex::build(vec![reservation("ri-r", None, 1, now + Duration::days(30))]);

        assert_eq!(index.classify(&instance("i-1", "us-east-1c"), now), Some(Category::Reserved));
        assert_eq!(index.get("ri-r").unwrap().consumed(), 1);
    }

    #[test]
    fn test_zone_match_preferred_over_region() {
        let now = Utc::now();
        let end = now + Duration::days(30);
        let mut index = ReservationIndex::build(vec![
            reservation("ri-region", None, 1, end),
            reservation("ri-zone", Some("us-east-1b"), 1, end),
        ]);

        index.classify(&instance("i-1", "us-east-1b"), now);
        assert_eq!(index.get("ri-zone").unwrap().consumed(), 1);
        assert_eq!(index.get("ri-region").unwrap().consumed(), 0);

        // Zone exhausted, falls back to the regional reservation
        index.classify(&instance("i-2", "us-east-1b"), now);
        assert_eq!(index.get("ri-region").unwrap().consumed(), 1);
    }

    #[test]
    fn test_zonal_reservation_reached_through_region_fallback() {
        let now = Utc::now();
        let mut index = ReservationIndex::build(vec![reservation(
            "ri-1a",
            Some("us-east-1a"),
            2,
            now + Duration::days(30),
        )]);

        // No reservation in 1b, but the 1a reservation shares the region key
        assert_eq!(index.classify(&instance("i-1", "us-east-1b"), now), Some(Category::Reserved));
        assert_eq!(index.get("ri-1a").unwrap().consumed(), 1);

        // Zone and region paths draw on the same counter
        assert_eq!(index.classify(&instance("i-2", "us-east-1a"), now), Some(Category::Reserved));
        assert_eq!(index.classify(&instance("i-3", "us-east-1b"), now), Some(Category::OnDemand));
        assert_eq!(index.get("ri-1a").unwrap().consumed(), 2);
    }

    #[test]
    fn test_first_purchased_first_matched() {
        let now = Utc::now();
        let end = now + Duration::days(30);
        let mut index = ReservationIndex::build(vec![
            reservation("ri-a", Some("us-east-1a"), 1, end),
            reservation("ri-b", Some("us-east-1a"), 1, end),
        ]);

        index.classify(&instance("i-1", "us-east-1a"), now);
        assert_eq!(index.get("ri-a").unwrap().consumed(), 1);
        assert_eq!(index.get("ri-b").unwrap().consumed(), 0);
    }

    #[test]
    fn test_expired_candidate_skipped() {
        let now = Utc::now();
        let mut index = ReservationIndex::build(vec![
            reservation("ri-old", Some("us-east-1a"), 5, now - Duration::days(1)),
            reservation("ri-new", Some("us-east-1a"), 1, now + Duration::days(10)),
        ]);

        assert_eq!(index.classify(&instance("i-1", "us-east-1a"), now), Some(Category::Reserved));
        assert_eq!(index.get("ri-old").unwrap().consumed(), 0);
        assert_eq!(index.get("ri-new").unwrap().consumed(), 1);
    }

    #[test]
    fn test_spot_precedes_reservation() {
        let now = Utc::now();
        let mut index = ReservationIndex::build(vec![reservation(
            "ri-1",
            Some("us-east-1a"),
            1,
            now + Duration::days(30),
        )]);

        let mut d = ResourceDescriptor {
            id: "i-spot".to_string(),
            kind: ResourceKind::ComputeInstance,
            state: ResourceState::Running,
            region: "us-east-1".to_string(),
            availability_zone: "us-east-1a".to_string(),
            tenancy: "default".to_string(),
            instance_type: "t3.micro".to_string(),
            platform: "Linux/UNIX".to_string(),
            spot_request_id: Some("sir-1".to_string()),
        };
        let spot = ResourceRecord::new(d.clone()).unwrap();
        assert_eq!(index.classify(&spot, now), Some(Category::Spot));
        assert_eq!(index.get("ri-1").unwrap().consumed(), 0);

        d.state = ResourceState::Stopped;
        let stopped = ResourceRecord::new(d).unwrap();
        assert_eq!(index.classify(&stopped, now), None);
    }

    #[test]
    fn test_reset_allows_rerun_without_double_count() {
        let now = Utc::now();
        let mut index = ReservationIndex::build(vec![reservation(
            "ri-1",
            Some("us-east-1a"),
            1,
            now + Duration::days(30),
        )]);
        let resource = instance("i-1", "us-east-1a");

        assert_eq!(index.classify(&resource, now), Some(Category::Reserved));
        // Without a reset the same resource no longer fits
        assert_eq!(index.classify(&resource, now), Some(Category::OnDemand));

        index.reset_consumption();
        assert_eq!(index.classify(&resource, now), Some(Category::Reserved));
        assert_eq!(index.records()[0].consumed(), 1);
    }

    #[test]
    fn test_capacity_invariant_holds() {
        let now = Utc::now();
        let end = now + Duration::days(30);
        let mut index = ReservationIndex::build(vec![
            reservation("ri-a", Some("us-east-1a"), 3, end),
            reservation("ri-b", None, 2, end),
            reservation("ri-c", Some("us-east-1b"), 1, end),
        ]);

        for i in 0..20 {
            let zone = if i % 2 == 0 { "us-east-1a" } else { "us-east-1b" };
            index.classify(&instance(&format!("i-{i}"), zone), now);
            for record in index.records() {
                assert!(record.consumed() <= record.purchased_count());
            }
        }

        let consumed: u32 = index.records().iter().map(|r| r.consumed()).sum();
        assert_eq!(consumed, 6);
    }
}
