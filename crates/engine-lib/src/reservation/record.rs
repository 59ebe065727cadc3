//! Purchased capacity records

use crate::error::{EngineError, Result};
use crate::models::MatchKey;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Reservation description as produced by the discovery collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationDescriptor {
    pub id: String,
    #[serde(default = "default_state")]
    pub state: String,
    pub region: String,
    /// Absent for reservations purchased with regional scope
    #[serde(default)]
    pub availability_zone: Option<String>,
    pub tenancy: String,
    pub instance_type: String,
    pub platform: String,
    pub purchased_count: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn default_state() -> String {
    "active".to_string()
}

/// Where a reservation's capacity applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationScope {
    /// Bound to one availability zone
    Zonal,
    /// Usable in any zone of its region
    Regional,
}

/// A block of purchased capacity with its consumption counter
///
/// Invariant: `0 <= consumed <= purchased_count`. The counter only grows,
/// and only through `ReservationIndex` matching.
#[derive(Debug, Clone)]
pub struct ReservationRecord {
    id: String,
    state: String,
    region: String,
    availability_zone: Option<String>,
    tenancy: String,
    instance_type: String,
    platform: String,
    purchased_count: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    consumed: u32,
}

impl ReservationRecord {
    /// Validate a descriptor and build the record with nothing consumed
    pub fn new(descriptor: ReservationDescriptor) -> Result<Self> {
        let required = [
            ("id", &descriptor.id),
            ("region", &descriptor.region),
            ("tenancy", &descriptor.tenancy),
            ("instance_type", &descriptor.instance_type),
            ("platform", &descriptor.platform),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(EngineError::invalid_record(format!(
                "reservation '{}' is missing {}",
                descriptor.id, field
            )));
        }
        if descriptor.purchased_count == 0 {
            return Err(EngineError::invalid_record(format!(
                "reservation {} has no purchased capacity",
                descriptor.id
            )));
        }
        if descriptor.start >= descriptor.end {
            return Err(EngineError::invalid_record(format!(
                "reservation {} ends before it starts",
                descriptor.id
            )));
        }

        Ok(Self {
            id: descriptor.id,
            state: descriptor.state,
            region: descriptor.region,
            availability_zone: descriptor.availability_zone.filter(|z| !z.trim().is_empty()),
            tenancy: descriptor.tenancy,
            instance_type: descriptor.instance_type,
            platform: descriptor.platform,
            purchased_count: descriptor.purchased_count,
            start: descriptor.start,
            end: descriptor.end,
            consumed: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn availability_zone(&self) -> Option<&str> {
        self.availability_zone.as_deref()
    }

    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    pub fn purchased_count(&self) -> u32 {
        self.purchased_count
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn remaining(&self) -> u32 {
        self.purchased_count - self.consumed
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn scope(&self) -> ReservationScope {
        if self.availability_zone.is_some() {
            ReservationScope::Zonal
        } else {
            ReservationScope::Regional
        }
    }

    /// Zone-level key, present only for zonal reservations
    pub fn zone_key(&self) -> Option<MatchKey> {
        self.availability_zone
            .as_deref()
            .map(|zone| MatchKey::new(zone, &self.tenancy, &self.instance_type, &self.platform))
    }

    /// Region-level key; every reservation has one
    pub fn region_key(&self) -> MatchKey {
        MatchKey::new(&self.region, &self.tenancy, &self.instance_type, &self.platform)
    }

    /// Active until the end instant; expiry wins over remaining capacity
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.end
    }

    pub fn has_remaining_capacity(&self) -> bool {
        self.consumed < self.purchased_count
    }

    /// True when the reservation ends within `days` days of `now`
    pub fn is_expiring_within(&self, days: u32, now: DateTime<Utc>) -> bool {
        self.end - Duration::days(i64::from(days)) < now
    }

    /// Consumed capacity as a percentage of purchased capacity
    pub fn utilization_percent(&self) -> f64 {
        f64::from(self.consumed) / f64::from(self.purchased_count) * 100.0
    }

    /// True when consumption is at or below `threshold_percent`
    pub fn is_under_capacity(&self, threshold_percent: f64) -> bool {
        self.utilization_percent() <= threshold_percent
    }

    /// Take one unit of capacity if the reservation is active and not exhausted
    pub(super) fn try_consume(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_active(now) && self.has_remaining_capacity() {
            self.consumed += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn reset_consumed(&mut self) {
        self.consumed = 0;
    }

    /// Reporting view of this reservation
    pub fn summary(
        &self,
        now: DateTime<Utc>,
        expiry_days: u32,
        capacity_threshold_percent: f64,
    ) -> ReservationSummary {
        let active = self.is_active(now);
        ReservationSummary {
            reservation_id: self.id.clone(),
            state: self.state.clone(),
            instance_type: self.instance_type.clone(),
            region: self.region.clone(),
            availability_zone: self.availability_zone.clone(),
            scope: self.scope(),
            purchased: self.purchased_count,
            consumed: self.consumed,
            remaining: self.remaining(),
            utilization_percent: self.utilization_percent(),
            active,
            expiring_soon: active && self.is_expiring_within(expiry_days, now),
            under_capacity: self.is_under_capacity(capacity_threshold_percent),
            start: self.start,
            end: self.end,
        }
    }
}

/// Capacity and validity of one reservation after a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationSummary {
    pub reservation_id: String,
    /// Provider lifecycle state as discovered
    pub state: String,
    pub instance_type: String,
    pub region: String,
    pub availability_zone: Option<String>,
    pub scope: ReservationScope,
    pub purchased: u32,
    pub consumed: u32,
    pub remaining: u32,
    pub utilization_percent: f64,
    pub active: bool,
    /// Active and ending within the configured window
    pub expiring_soon: bool,
    pub under_capacity: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(now: DateTime<Utc>) -> ReservationDescriptor {
        ReservationDescriptor {
            id: "ri-1".to_string(),
            state: "active".to_string(),
            region: "us-east-1".to_string(),
            availability_zone: Some("us-east-1a".to_string()),
            tenancy: "default".to_string(),
            instance_type: "t3.micro".to_string(),
            platform: "Linux/UNIX".to_string(),
            purchased_count: 2,
            start: now - Duration::days(335),
            end: now + Duration::days(30),
        }
    }

    #[test]
    fn test_validation() {
        let now = Utc::now();
        assert!(ReservationRecord::new(descriptor(now)).is_ok());

        let mut d = descriptor(now);
        d.purchased_count = 0;
        assert!(ReservationRecord::new(d).is_err());

        let mut d = descriptor(now);
        d.end = d.start;
        assert!(ReservationRecord::new(d).is_err());

        let mut d = descriptor(now);
        d.platform = "  ".to_string();
        let err = ReservationRecord::new(d).unwrap_err();
        assert!(err.to_string().contains("platform"));
    }

    #[test]
    fn test_scope_and_match_keys() {
        let now = Utc::now();
        let zonal = ReservationRecord::new(descriptor(now)).unwrap();
        assert_eq!(zonal.scope(), ReservationScope::Zonal);
        assert_eq!(zonal.zone_key().unwrap().location, "us-east-1a");
        // Zonal reservations also carry a region key for fallback matching
        assert_eq!(zonal.region_key().location, "us-east-1");

        let mut d = descriptor(now);
        d.availability_zone = Some(String::new());
        let regional = ReservationRecord::new(d).unwrap();
        assert_eq!(regional.scope(), ReservationScope::Regional);
        assert!(regional.zone_key().is_none());
        assert_eq!(regional.region_key().location, "us-east-1");
    }

    #[test]
    fn test_consume_stops_at_capacity() {
        let now = Utc::now();
        let mut record = ReservationRecord::new(descriptor(now)).unwrap();

        assert!(record.try_consume(now));
        assert!(record.try_consume(now));
        assert!(!record.try_consume(now));
        assert_eq!(record.consumed(), 2);
        assert_eq!(record.remaining(), 0);
    }

    #[test]
    fn test_expired_reservation_is_not_consumed() {
        let now = Utc::now();
        let record_end = descriptor(now).end;
        let mut record = ReservationRecord::new(descriptor(now)).unwrap();

        // Expiry takes precedence over remaining capacity
        assert!(!record.try_consume(record_end));
        assert!(!record.try_consume(record_end + Duration::seconds(1)));
        assert_eq!(record.consumed(), 0);
        assert!(record.has_remaining_capacity());
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let record = ReservationRecord::new(descriptor(now)).unwrap();

        assert!(!record.is_expiring_within(14, now));
        assert!(record.is_expiring_within(31, now));
    }

    #[test]
    fn test_summary_capacity() {
        let now = Utc::now();
        let mut record = ReservationRecord::new(descriptor(now)).unwrap();
        record.try_consume(now);

        let summary = record.summary(now, 14, 50.0);
        assert_eq!(summary.state, "active");
        assert_eq!(summary.consumed, 1);
        assert_eq!(summary.remaining, 1);
        assert_eq!(summary.start, descriptor(now).start);
        assert_eq!(summary.utilization_percent, 50.0);
        assert!(summary.under_capacity);
        assert!(summary.active);
        assert!(!summary.expiring_soon);

        record.reset_consumed();
        assert_eq!(record.consumed(), 0);
    }

    #[test]
    fn test_expired_reservation_is_not_expiring_soon() {
        let now = Utc::now();
        let mut d = descriptor(now);
        d.start = now - Duration::days(400);
        d.end = now - Duration::days(2);
        d.state = "retired".to_string();
        let record = ReservationRecord::new(d).unwrap();

        // The raw window check holds once the end has passed
        assert!(record.is_expiring_within(14, now));

        let summary = record.summary(now, 14, 50.0);
        assert!(!summary.active);
        assert!(!summary.expiring_soon);
        assert_eq!(summary.state, "retired");
    }
}
