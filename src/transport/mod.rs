//! Collaborator seams and their implementations.
//!
//! The monitoring core reaches the network, the user and the clock only
//! through the traits in this module. In-memory implementations serve tests
//! and embedding; the reqwest-backed ones sit behind the `http` feature.

#[cfg(feature = "http")]
pub mod http;
pub mod memory;
pub mod queued;
mod traits;
pub mod wire;

pub use memory::{NullSink, RecordingAlertSink, RecordingSignal, ScriptedTripSource};
pub use queued::QueuedAlertSink;
pub use traits::{AlertRequest, AlertSink, SignalSink, TripSource};

#[cfg(feature = "http")]
pub use http::{HttpAlertSink, HttpTripSource, UpstreamTripSource};
