//! Trip, query and vehicle-type types.
//!
//! A [`Trip`] is an immutable snapshot of one departure as delivered by a
//! [`TripSource`](crate::transport::TripSource). Direction and vehicle type
//! are closed enums; unknown codes are rejected at parse time instead of
//! falling through to a default.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Stable identity of a trip: the raw departure timestamp from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(String);

impl TripId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TripId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Vehicle classes the operator reports capacity for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    /// Small vehicles (`sv`).
    #[serde(rename = "sv")]
    Car,
    /// Foot passengers (`pcs`).
    #[serde(rename = "pcs")]
    Passenger,
    /// Buses and other big vehicles (`bv`).
    #[serde(rename = "bv")]
    Bus,
}

impl VehicleClass {
    /// Operator code for this class.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Car => "sv",
            Self::Passenger => "pcs",
            Self::Bus => "bv",
        }
    }
}

/// Which capacity counter decides whether a trip is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VehicleTypeFilter {
    /// A single vehicle class.
    Class(VehicleClass),
    /// Any class with at least one spot.
    #[default]
    Any,
}

impl VehicleTypeFilter {
    /// Cars only.
    pub const CAR: Self = Self::Class(VehicleClass::Car);
    /// Passengers only.
    pub const PASSENGER: Self = Self::Class(VehicleClass::Passenger);
    /// Buses only.
    pub const BUS: Self = Self::Class(VehicleClass::Bus);

    /// Code used in preferences and on the command line.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Class(class) => class.code(),
            Self::Any => "any",
        }
    }
}

impl fmt::Display for VehicleTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for VehicleTypeFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sv" | "car" => Ok(Self::CAR),
            "pcs" | "passenger" => Ok(Self::PASSENGER),
            "bv" | "bus" => Ok(Self::BUS),
            "any" | "" => Ok(Self::Any),
            other => Err(ConfigError::invalid(
                "vehicle_type",
                format!("unknown vehicle type '{other}' (expected sv, pcs, bv or any)"),
            )),
        }
    }
}

impl Serialize for VehicleTypeFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for VehicleTypeFilter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-class free spots for one departure.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capacities {
    pub car: u32,
    pub passenger: u32,
    pub bus: u32,
}

impl Capacities {
    /// Car, passenger and bus counts, in that order.
    #[must_use]
    pub const fn new(car: u32, passenger: u32, bus: u32) -> Self {
        Self { car, passenger, bus }
    }

    /// Free spots for one class.
    #[must_use]
    pub const fn get(&self, class: VehicleClass) -> u32 {
        match class {
            VehicleClass::Car => self.car,
            VehicleClass::Passenger => self.passenger,
            VehicleClass::Bus => self.bus,
        }
    }

    /// Free spots summed over all classes.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.car as u64 + self.passenger as u64 + self.bus as u64
    }
}

/// One scheduled departure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    /// Stable identity across polls.
    pub id: TripId,
    /// Departure, in the feed's offset.
    pub start: DateTime<FixedOffset>,
    /// Arrival, in the feed's offset.
    pub end: DateTime<FixedOffset>,
    /// Free spots at fetch time.
    pub capacities: Capacities,
}

impl Trip {
    /// Builds a trip whose identity is the raw start timestamp.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if either timestamp is unparseable.
    pub fn from_timestamps(start: &str, end: &str, capacities: Capacities) -> Result<Self, ConfigError> {
        Ok(Self {
            id: TripId::new(start),
            start: parse_departure_time(start)?,
            end: parse_departure_time(end)?,
            capacities,
        })
    }

    /// Departure time of day in the feed's own offset.
    #[must_use]
    pub fn departure_time(&self) -> NaiveTime {
        self.start.time()
    }

    /// `HH:MM` departure label used in status and alert text.
    #[must_use]
    pub fn departure_label(&self) -> String {
        self.start.format("%H:%M").to_string()
    }
}

/// Parses a feed timestamp.
///
/// The operator emits `2026-01-07T19:55:00.000+0200`; RFC 3339 is accepted
/// as well.
pub fn parse_departure_time(raw: &str) -> Result<DateTime<FixedOffset>, ConfigError> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map_err(|e| ConfigError::invalid("departure_time", format!("'{raw}': {e}")))
}

/// Supported crossings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Heltermaa to Rohukula.
    #[serde(rename = "HR")]
    HeltermaaRohukula,
    /// Rohukula to Heltermaa.
    #[serde(rename = "RH")]
    RohukulaHeltermaa,
    /// Virtsu to Kuivastu.
    #[serde(rename = "VK")]
    VirtsuKuivastu,
    /// Kuivastu to Virtsu.
    #[serde(rename = "KV")]
    KuivastuVirtsu,
}

impl Direction {
    /// Operator direction code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::HeltermaaRohukula => "HR",
            Self::RohukulaHeltermaa => "RH",
            Self::VirtsuKuivastu => "VK",
            Self::KuivastuVirtsu => "KV",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Direction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HR" => Ok(Self::HeltermaaRohukula),
            "RH" => Ok(Self::RohukulaHeltermaa),
            "VK" => Ok(Self::VirtsuKuivastu),
            "KV" => Ok(Self::KuivastuVirtsu),
            other => Err(ConfigError::invalid(
                "direction",
                format!("unknown direction '{other}' (expected HR, RH, VK or KV)"),
            )),
        }
    }
}

/// What one monitoring session asks the trip source for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripQuery {
    /// Travel date.
    pub date: NaiveDate,
    /// Route and heading.
    pub direction: Direction,
    /// Earliest departure, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveTime>,
    /// Latest departure, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveTime>,
}

impl TripQuery {
    /// A whole-day query.
    #[must_use]
    pub const fn new(date: NaiveDate, direction: Direction) -> Self {
        Self {
            date,
            direction,
            from: None,
            to: None,
        }
    }

    /// Restricts the query to departures within `[from, to]`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidTimeWindow` if `from > to`.
    pub fn with_window(mut self, from: Option<NaiveTime>, to: Option<NaiveTime>) -> Result<Self, ConfigError> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ConfigError::InvalidTimeWindow {
                    from: f.format("%H:%M").to_string(),
                    to: t.format("%H:%M").to_string(),
                });
            }
        }
        self.from = from;
        self.to = to;
        Ok(self)
    }

    /// True if a departure at `time` falls inside the window.
    ///
    /// Times compare at minute resolution, both bounds inclusive.
    #[must_use]
    pub fn window_contains(&self, time: NaiveTime) -> bool {
        let minute = minute_of_day(time);
        let after_from = self.from.map_or(true, |f| minute >= minute_of_day(f));
        let before_to = self.to.map_or(true, |t| minute <= minute_of_day(t));
        after_from && before_to
    }

    /// Query string pairs for the backend scan endpoint.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("date", self.date.format("%Y-%m-%d").to_string()),
            ("direction", self.direction.code().to_string()),
        ];
        if let Some(from) = self.from {
            pairs.push(("from", from.format("%H:%M").to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.format("%H:%M").to_string()));
        }
        pairs
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Parses an `HH:MM` time of day.
pub fn parse_time_of_day(field: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| ConfigError::invalid(field, format!("'{raw}' is not HH:MM ({e})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_operator_timestamp_format() {
        let t = parse_departure_time("2026-01-07T19:55:00.000+0200").unwrap();
        assert_eq!(t.format("%H:%M").to_string(), "19:55");
        assert_eq!(t.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn parses_rfc3339_timestamp() {
        let t = parse_departure_time("2026-01-07T06:10:00+02:00").unwrap();
        assert_eq!(t.format("%H:%M").to_string(), "06:10");
    }

    #[test]
    fn rejects_garbage_timestamp() {
        let err = parse_departure_time("tomorrow morning").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "departure_time"));
    }

    #[test]
    fn trip_identity_is_raw_start() {
        let trip = Trip::from_timestamps(
            "2026-01-07T19:55:00.000+0200",
            "2026-01-07T20:25:00.000+0200",
            Capacities::new(3, 0, 0),
        )
        .unwrap();
        assert_eq!(trip.id.as_str(), "2026-01-07T19:55:00.000+0200");
        assert_eq!(trip.departure_label(), "19:55");
    }

    #[test]
    fn capacity_total_does_not_overflow() {
        let c = Capacities::new(u32::MAX, u32::MAX, 1);
        assert_eq!(c.total(), 2 * u64::from(u32::MAX) + 1);
        assert_eq!(c.get(VehicleClass::Bus), 1);
    }

    #[test]
    fn vehicle_filter_codes_round_trip() {
        for filter in [
            VehicleTypeFilter::CAR,
            VehicleTypeFilter::PASSENGER,
            VehicleTypeFilter::BUS,
            VehicleTypeFilter::Any,
        ] {
            assert_eq!(filter.code().parse::<VehicleTypeFilter>().unwrap(), filter);
        }
        assert!("truck".parse::<VehicleTypeFilter>().is_err());
        assert_eq!(serde_json::to_string(&VehicleTypeFilter::BUS).unwrap(), "\"bv\"");
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("hr".parse::<Direction>().unwrap(), Direction::HeltermaaRohukula);
        assert_eq!("KV".parse::<Direction>().unwrap(), Direction::KuivastuVirtsu);
        assert!("XX".parse::<Direction>().is_err());
    }

    #[test]
    fn window_is_inclusive_at_minute_resolution() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let q = TripQuery::new(date, Direction::VirtsuKuivastu)
            .with_window(Some(hm(8, 0)), Some(hm(12, 30)))
            .unwrap();
        assert!(q.window_contains(hm(8, 0)));
        assert!(q.window_contains(NaiveTime::from_hms_opt(12, 30, 45).unwrap()));
        assert!(!q.window_contains(hm(7, 59)));
        assert!(!q.window_contains(hm(12, 31)));

        let open = TripQuery::new(date, Direction::VirtsuKuivastu);
        assert!(open.window_contains(hm(0, 0)));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let err = TripQuery::new(date, Direction::HeltermaaRohukula)
            .with_window(Some(hm(18, 0)), Some(hm(9, 0)))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidTimeWindow {
                from: "18:00".to_string(),
                to: "09:00".to_string()
            }
        );
    }

    #[test]
    fn query_pairs_include_optional_bounds() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let q = TripQuery::new(date, Direction::RohukulaHeltermaa)
            .with_window(None, Some(hm(21, 5)))
            .unwrap();
        assert_eq!(
            q.query_pairs(),
            vec![
                ("date", "2026-01-07".to_string()),
                ("direction", "RH".to_string()),
                ("to", "21:05".to_string()),
            ]
        );
    }
}
