//! In-memory collaborators.
//!
//! Thread-safe implementations of the collaborator traits for embedding and
//! tests: a scripted trip source, and sinks that record what they were asked
//! to deliver.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::FetchError;
use crate::trip::{Trip, TripQuery};

use super::traits::{AlertRequest, AlertSink, SignalSink, TripSource};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A trip source that replays queued responses.
///
/// Each fetch pops the next scripted response; once the script runs dry the
/// last successful listing is repeated (an empty listing if there never was
/// one).
#[derive(Debug, Default)]
pub struct ScriptedTripSource {
    script: Mutex<VecDeque<Result<Vec<Trip>, FetchError>>>,
    fallback: Mutex<Vec<Trip>>,
    queries: Mutex<Vec<TripQuery>>,
    calls: AtomicUsize,
}

impl ScriptedTripSource {
    /// An empty script; fetches return an empty listing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful listing.
    pub fn push_trips(&self, trips: Vec<Trip>) {
        lock(&self.script).push_back(Ok(trips));
    }

    /// Queues a failed fetch.
    pub fn push_error(&self, err: FetchError) {
        lock(&self.script).push_back(Err(err));
    }

    /// Number of fetches served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<TripQuery> {
        lock(&self.queries).clone()
    }
}

impl TripSource for ScriptedTripSource {
    fn fetch(&self, query: &TripQuery) -> Result<Vec<Trip>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.queries).push(query.clone());

        match lock(&self.script).pop_front() {
            Some(Ok(trips)) => {
                lock(&self.fallback).clone_from(&trips);
                Ok(trips)
            }
            Some(Err(e)) => Err(e),
            None => Ok(lock(&self.fallback).clone()),
        }
    }
}

/// An alert sink that records every request.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    sent: Mutex<Vec<AlertRequest>>,
}

impl RecordingAlertSink {
    #[must_use]
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// All dispatched requests, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<AlertRequest> {
        lock(&self.sent).clone()
    }

    /// Number of dispatched requests.
    #[must_use]
    pub fn count(&self) -> usize {
        lock(&self.sent).len()
    }
}

impl AlertSink for RecordingAlertSink {
    fn dispatch(&self, request: &AlertRequest) {
        lock(&self.sent).push(request.clone());
    }
}

/// A signal sink that records every emission.
#[derive(Debug, Default)]
pub struct RecordingSignal {
    emitted: Mutex<Vec<String>>,
}

impl RecordingSignal {
    #[must_use]
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every emitted message, in order.
    #[must_use]
    pub fn emitted(&self) -> Vec<String> {
        lock(&self.emitted).clone()
    }

    /// Number of emissions.
    #[must_use]
    pub fn count(&self) -> usize {
        lock(&self.emitted).len()
    }
}

impl SignalSink for RecordingSignal {
    fn emit(&self, message: &str) {
        lock(&self.emitted).push(message.to_string());
    }
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AlertSink for NullSink {
    fn dispatch(&self, _request: &AlertRequest) {}
}

impl SignalSink for NullSink {
    fn emit(&self, _message: &str) {}
}
