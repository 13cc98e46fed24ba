//! The set of departures a user asked to monitor.

use std::collections::HashSet;

use crate::trip::TripId;

/// Watched trip identities.
///
/// Membership does not depend on the current result set: a departure can be
/// watched before it shows up in a listing and stays watched after it drops
/// out of one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    ids: HashSet<TripId>,
}

impl WatchList {
    /// An empty watch list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id`. Returns false if it was already watched.
    pub fn add(&mut self, id: TripId) -> bool {
        self.ids.insert(id)
    }

    /// Removes `id`. Returns false if it was not watched.
    pub fn remove(&mut self, id: &TripId) -> bool {
        self.ids.remove(id)
    }

    /// True if `id` is watched.
    #[must_use]
    pub fn contains(&self, id: &TripId) -> bool {
        self.ids.contains(id)
    }

    /// Flips membership of `id` and returns whether it is now watched.
    pub fn toggle(&mut self, id: TripId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Watched ids in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &TripId> {
        self.ids.iter()
    }
}

impl FromIterator<TripId> for WatchList {
    fn from_iter<I: IntoIterator<Item = TripId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_report_changes() {
        let mut w = WatchList::new();
        assert!(w.add(TripId::from("t1")));
        assert!(!w.add(TripId::from("t1")));
        assert_eq!(w.len(), 1);
        assert!(w.remove(&TripId::from("t1")));
        assert!(!w.remove(&TripId::from("t1")));
        assert!(w.is_empty());
    }

    #[test]
    fn toggle_twice_restores_membership() {
        let mut w: WatchList = [TripId::from("a"), TripId::from("b")].into_iter().collect();
        let before = w.clone();

        assert!(!w.toggle(TripId::from("a")));
        assert!(w.toggle(TripId::from("a")));
        assert_eq!(w, before);

        assert!(w.toggle(TripId::from("c")));
        assert!(!w.toggle(TripId::from("c")));
        assert_eq!(w, before);
    }

    #[test]
    fn membership_is_independent_of_listing() {
        let mut w = WatchList::new();
        w.add(TripId::from("2026-01-07T06:00:00.000+0200"));
        assert!(w.contains(&TripId::from("2026-01-07T06:00:00.000+0200")));
        assert!(!w.contains(&TripId::from("2026-01-07T07:00:00.000+0200")));
    }
}
