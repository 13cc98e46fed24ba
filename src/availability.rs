//! Availability predicate.
//!
//! Pure classification of a trip as open or full for a vehicle-type filter,
//! plus the short status text shown next to each departure.

use crate::trip::{Trip, VehicleClass, VehicleTypeFilter};

/// True if `trip` has at least one free spot for `filter`.
#[must_use]
pub fn has_spots(trip: &Trip, filter: VehicleTypeFilter) -> bool {
    match filter {
        VehicleTypeFilter::Class(class) => trip.capacities.get(class) > 0,
        VehicleTypeFilter::Any => trip.capacities.total() > 0,
    }
}

/// Deterministic user-facing availability text, e.g. `"3 car spots"` or `"FULL"`.
#[must_use]
pub fn describe_spots(trip: &Trip, filter: VehicleTypeFilter) -> String {
    if !has_spots(trip, filter) {
        return "FULL".to_string();
    }

    let c = &trip.capacities;
    match filter {
        VehicleTypeFilter::Class(VehicleClass::Car) => format!("{} car spots", c.car),
        VehicleTypeFilter::Class(VehicleClass::Bus) => format!("{} bus spots", c.bus),
        VehicleTypeFilter::Class(VehicleClass::Passenger) => format!("{} passengers", c.passenger),
        VehicleTypeFilter::Any => format!("{}C / {}B / {}P", c.car, c.bus, c.passenger),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::Capacities;

    fn trip(car: u32, passenger: u32, bus: u32) -> Trip {
        Trip::from_timestamps(
            "2026-01-07T10:00:00+02:00",
            "2026-01-07T10:30:00+02:00",
            Capacities::new(car, passenger, bus),
        )
        .unwrap()
    }

    const ALL_FILTERS: [VehicleTypeFilter; 4] = [
        VehicleTypeFilter::CAR,
        VehicleTypeFilter::PASSENGER,
        VehicleTypeFilter::BUS,
        VehicleTypeFilter::Any,
    ];

    #[test]
    fn single_class_reads_only_its_counter() {
        let t = trip(0, 5, 0);
        assert!(!has_spots(&t, VehicleTypeFilter::CAR));
        assert!(has_spots(&t, VehicleTypeFilter::PASSENGER));
        assert!(!has_spots(&t, VehicleTypeFilter::BUS));
        assert!(has_spots(&t, VehicleTypeFilter::Any));
    }

    #[test]
    fn empty_trip_is_full_for_every_filter() {
        let t = trip(0, 0, 0);
        for f in ALL_FILTERS {
            assert!(!has_spots(&t, f));
            assert_eq!(describe_spots(&t, f), "FULL");
        }
    }

    #[test]
    fn raising_a_counter_from_zero_never_closes_a_trip() {
        for f in ALL_FILTERS {
            let before = [trip(0, 0, 0), trip(1, 0, 0), trip(0, 1, 0), trip(0, 0, 1)];
            for b in before {
                let mut after = b.clone();
                after.capacities.car += 2;
                after.capacities.passenger += 2;
                after.capacities.bus += 2;
                if has_spots(&b, f) {
                    assert!(has_spots(&after, f));
                }
                assert!(has_spots(&after, f), "filter {f} should open once every counter > 0");
            }
        }
    }

    #[test]
    fn describe_formats_per_filter() {
        let t = trip(3, 12, 1);
        assert_eq!(describe_spots(&t, VehicleTypeFilter::CAR), "3 car spots");
        assert_eq!(describe_spots(&t, VehicleTypeFilter::BUS), "1 bus spots");
        assert_eq!(describe_spots(&t, VehicleTypeFilter::PASSENGER), "12 passengers");
        assert_eq!(describe_spots(&t, VehicleTypeFilter::Any), "3C / 1B / 12P");
    }

    #[test]
    fn describe_is_deterministic() {
        let t = trip(2, 0, 0);
        assert_eq!(
            describe_spots(&t, VehicleTypeFilter::CAR),
            describe_spots(&t.clone(), VehicleTypeFilter::CAR)
        );
    }
}
