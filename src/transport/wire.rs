//! JSON wire formats.
//!
//! Two listings are understood:
//! - the backend scan endpoint (`/api/scan`), already filtered to the
//!   query's time window;
//! - the operator's raw events feed (`/online/events`), which carries
//!   capacities by operator code and is filtered client side.
//!
//! Records whose timestamps cannot be parsed are skipped with a warning
//! rather than failing the whole poll.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::trip::{Capacities, Trip, TripQuery};

/// Response body of `GET /api/scan`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResponse {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<ScanItem>,
}

/// One departure as returned by the backend.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanItem {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub car_spots: u32,
    #[serde(default)]
    pub passenger_spots: u32,
    #[serde(default)]
    pub bus_spots: u32,
}

impl ScanResponse {
    /// Converts the listing to trips, preserving order.
    #[must_use]
    pub fn into_trips(self) -> Vec<Trip> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let capacities = Capacities::new(item.car_spots, item.passenger_spots, item.bus_spots);
                Trip::from_timestamps(&item.start, &item.end, capacities)
                    .map_err(|e| warn!(start = %item.start, error = %e, "skipping scan item"))
                    .ok()
            })
            .collect()
    }
}

/// Response body of the operator's events feed.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<EventItem>,
}

/// One departure in the operator feed.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventItem {
    pub dtstart: String,
    pub dtend: String,
    #[serde(default)]
    pub capacities: EventCapacities,
}

/// Operator capacity counters, keyed by vehicle class code.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EventCapacities {
    /// Cars.
    #[serde(default)]
    pub sv: u32,
    /// Passengers.
    #[serde(default)]
    pub pcs: u32,
    /// Buses.
    #[serde(default)]
    pub bv: u32,
}

impl EventsResponse {
    /// Converts the feed to trips inside the query's time window, preserving order.
    #[must_use]
    pub fn into_trips(self, query: &TripQuery) -> Vec<Trip> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let c = item.capacities;
                Trip::from_timestamps(&item.dtstart, &item.dtend, Capacities::new(c.sv, c.pcs, c.bv))
                    .map_err(|e| warn!(start = %item.dtstart, error = %e, "skipping feed item"))
                    .ok()
            })
            .filter(|trip| query.window_contains(trip.departure_time()))
            .collect()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::trip::Direction;

    #[test]
    fn scan_response_maps_all_counters() {
        let body = r#"{
            "date": "2026-01-07",
            "direction": "VK",
            "items": [
                {"start": "2026-01-07T10:00:00.000+0200", "end": "2026-01-07T10:30:00.000+0200",
                 "car_spots": 5, "passenger_spots": 120, "bus_spots": 1},
                {"start": "2026-01-07T12:00:00.000+0200", "end": "2026-01-07T12:30:00.000+0200",
                 "car_spots": 0}
            ]
        }"#;
        let resp: ScanResponse = serde_json::from_str(body).unwrap();
        let trips = resp.into_trips();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].capacities, Capacities::new(5, 120, 1));
        assert_eq!(trips[1].capacities, Capacities::new(0, 0, 0));
        assert_eq!(trips[1].id.as_str(), "2026-01-07T12:00:00.000+0200");
    }

    #[test]
    fn scan_response_null_items_is_empty() {
        let resp: ScanResponse =
            serde_json::from_str(r#"{"date": "2026-01-07", "direction": "HR", "items": null}"#).unwrap();
        assert!(resp.into_trips().is_empty());
    }

    #[test]
    fn scan_response_skips_unparseable_items() {
        let body = r#"{"items": [
            {"start": "soon", "end": "later", "car_spots": 3},
            {"start": "2026-01-07T08:00:00+02:00", "end": "2026-01-07T08:30:00+02:00", "car_spots": 3}
        ]}"#;
        let trips = serde_json::from_str::<ScanResponse>(body).unwrap().into_trips();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].departure_label(), "08:00");
    }

    #[test]
    fn events_feed_applies_time_window() {
        let body = r#"{"items": [
            {"dtstart": "2026-01-07T06:00:00.000+0200", "dtend": "2026-01-07T06:30:00.000+0200", "capacities": {"sv": 2}},
            {"dtstart": "2026-01-07T10:00:00.000+0200", "dtend": "2026-01-07T10:30:00.000+0200", "capacities": {"sv": 10, "pcs": 40, "bv": 2}},
            {"dtstart": "2026-01-07T19:55:00.000+0200", "dtend": "2026-01-07T20:25:00.000+0200"}
        ]}"#;
        let query = TripQuery::new(NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(), Direction::VirtsuKuivastu)
            .with_window(NaiveTime::from_hms_opt(9, 0, 0), NaiveTime::from_hms_opt(20, 0, 0))
            .unwrap();

        let trips = serde_json::from_str::<EventsResponse>(body).unwrap().into_trips(&query);
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].capacities, Capacities::new(10, 40, 2));
        assert_eq!(trips[1].departure_label(), "19:55");
        assert_eq!(trips[1].capacities, Capacities::default());
    }
}
