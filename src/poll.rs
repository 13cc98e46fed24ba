//! One poll: fetch, replace the result set, compute matches.

use chrono::{DateTime, Utc};

use crate::availability::has_spots;
use crate::error::FetchError;
use crate::transport::TripSource;
use crate::trip::{Trip, TripQuery, VehicleTypeFilter};
use crate::watchlist::WatchList;

/// Trips returned by the most recent successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Listing in feed order.
    pub trips: Vec<Trip>,
    /// When the listing was fetched; `None` before the first success.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ResultSet {
    /// Number of listed trips.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trips.len()
    }

    /// True when nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}

/// Result of [`PollCycle::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The listing was replaced.
    Fetched {
        /// Size of the new listing.
        trip_count: usize,
        /// Watched trips with spots, in listing order.
        matches: Vec<Trip>,
    },
    /// The fetch failed; the previous listing is untouched.
    Failed(FetchError),
}

impl PollOutcome {
    /// True if the listing was replaced.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }

    /// Matches of a successful poll; empty for a failed one.
    #[must_use]
    pub fn matches(&self) -> &[Trip] {
        match self {
            Self::Fetched { matches, .. } => matches,
            Self::Failed(_) => &[],
        }
    }
}

/// Watched trips with spots for `filter`, preserving `trips` order.
#[must_use]
pub fn find_matches(trips: &[Trip], watchlist: &WatchList, filter: VehicleTypeFilter) -> Vec<Trip> {
    trips
        .iter()
        .filter(|t| watchlist.contains(&t.id) && has_spots(t, filter))
        .cloned()
        .collect()
}

/// Owner of the result set.
#[derive(Debug, Default)]
pub struct PollCycle {
    result_set: ResultSet,
}

impl PollCycle {
    /// An empty cycle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current listing.
    #[must_use]
    pub const fn result_set(&self) -> &ResultSet {
        &self.result_set
    }

    /// Fetches `query` and recomputes matches. Never retries.
    pub fn run(
        &mut self,
        source: &dyn TripSource,
        query: &TripQuery,
        filter: VehicleTypeFilter,
        watchlist: &WatchList,
        now: DateTime<Utc>,
    ) -> PollOutcome {
        let fetched = source.fetch(query);
        self.apply(fetched, filter, watchlist, now)
    }

    /// Applies an already fetched listing (or its failure).
    pub fn apply(
        &mut self,
        fetched: Result<Vec<Trip>, FetchError>,
        filter: VehicleTypeFilter,
        watchlist: &WatchList,
        now: DateTime<Utc>,
    ) -> PollOutcome {
        match fetched {
            Ok(trips) => {
                self.result_set = ResultSet {
                    trips,
                    fetched_at: Some(now),
                };
                PollOutcome::Fetched {
                    trip_count: self.result_set.len(),
                    matches: find_matches(&self.result_set.trips, watchlist, filter),
                }
            }
            Err(e) => PollOutcome::Failed(e),
        }
    }

    /// Matches in the current listing without fetching.
    #[must_use]
    pub fn current_matches(&self, watchlist: &WatchList, filter: VehicleTypeFilter) -> Vec<Trip> {
        find_matches(&self.result_set.trips, watchlist, filter)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::transport::ScriptedTripSource;
    use crate::trip::{Capacities, Direction, TripId};

    fn trip(hour: u32, car: u32, bus: u32) -> Trip {
        Trip::from_timestamps(
            &format!("2026-01-07T{hour:02}:00:00+02:00"),
            &format!("2026-01-07T{hour:02}:30:00+02:00"),
            Capacities::new(car, 0, bus),
        )
        .unwrap()
    }

    fn query() -> TripQuery {
        TripQuery::new(NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(), Direction::HeltermaaRohukula)
    }

    #[test]
    fn matches_require_watch_and_spots_in_listing_order() {
        let trips = vec![trip(6, 2, 0), trip(8, 0, 1), trip(10, 4, 0), trip(12, 1, 0)];
        let watch: WatchList = [trips[3].id.clone(), trips[0].id.clone(), trips[1].id.clone()]
            .into_iter()
            .collect();

        let found = find_matches(&trips, &watch, VehicleTypeFilter::CAR);
        let ids: Vec<&TripId> = found.iter().map(|t| &t.id).collect();
        assert_eq!(ids, vec![&trips[0].id, &trips[3].id]);

        for m in &found {
            assert!(trips.contains(m));
            assert!(watch.contains(&m.id));
            assert!(has_spots(m, VehicleTypeFilter::CAR));
        }
    }

    #[test]
    fn successful_poll_replaces_listing() {
        let source = ScriptedTripSource::new();
        source.push_trips(vec![trip(6, 0, 0), trip(8, 3, 0)]);
        source.push_trips(vec![]);

        let watch: WatchList = [trip(8, 0, 0).id].into_iter().collect();
        let mut poll = PollCycle::new();
        let now = Utc::now();

        let out = poll.run(&source, &query(), VehicleTypeFilter::CAR, &watch, now);
        assert_eq!(out.matches().len(), 1);
        assert_eq!(poll.result_set().len(), 2);
        assert_eq!(poll.result_set().fetched_at, Some(now));

        let out = poll.run(&source, &query(), VehicleTypeFilter::CAR, &watch, now);
        assert_eq!(
            out,
            PollOutcome::Fetched {
                trip_count: 0,
                matches: vec![]
            }
        );
        assert!(poll.result_set().is_empty());
    }

    #[test]
    fn failed_poll_keeps_previous_listing() {
        let source = ScriptedTripSource::new();
        source.push_trips(vec![trip(6, 1, 0)]);
        source.push_error(FetchError::Status {
            code: 500,
            body: "boom".to_string(),
        });

        let watch: WatchList = [trip(6, 0, 0).id].into_iter().collect();
        let mut poll = PollCycle::new();
        let t0 = Utc::now();
        poll.run(&source, &query(), VehicleTypeFilter::Any, &watch, t0);

        let out = poll.run(&source, &query(), VehicleTypeFilter::Any, &watch, t0 + chrono::Duration::seconds(30));
        assert!(!out.is_ok());
        assert!(out.matches().is_empty());
        assert_eq!(poll.result_set().len(), 1);
        assert_eq!(poll.result_set().fetched_at, Some(t0));
        assert_eq!(poll.current_matches(&watch, VehicleTypeFilter::Any).len(), 1);
    }
}
