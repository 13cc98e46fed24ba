//! # ferrywatch - ferry spot monitoring
//!
//! ferrywatch watches a ferry operator's departure listing for a chosen date
//! and direction and tells the user when a departure they care about has
//! space for their vehicle type.
//!
//! ## Core Concepts
//!
//! - **Trip**: one scheduled departure with per-class remaining capacity
//! - **WatchList**: the departures the user asked to be told about
//! - **MonitorSession**: the Idle/Active state machine that polls, matches and alerts
//! - **AlertThrottle**: repeating local signal plus cooldown-limited message alerts
//! - **MonitorRuntime**: runs a session on its own thread with poll and signal timers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrywatch::{Direction, MonitorRuntime, MonitorSession, TripQuery, VehicleTypeFilter};
//! use ferrywatch::transport::UpstreamTripSource;
//!
//! let query = TripQuery::new(date, Direction::VirtsuKuivastu);
//! let session = MonitorSession::builder(Arc::new(UpstreamTripSource::public()?), query)
//!     .filter(VehicleTypeFilter::CAR)
//!     .build();
//!
//! let runtime = MonitorRuntime::spawn(session)?;
//! let listing = runtime.refresh()?;
//! runtime.toggle_watch(trip_id)?;
//! runtime.start()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod time;
pub mod trip;
pub mod watchlist;

// Matching and alerting
pub mod availability;
pub mod poll;
pub mod throttle;

// Sessions and their collaborators
pub mod preferences;
pub mod runtime;
pub mod session;
pub mod transport;

pub use availability::{describe_spots, has_spots};
pub use config::{AlertChannelConfig, ChannelKind, MessageChannel, MonitorConfig};
pub use error::{ConfigError, FetchError, MonitorError, MonitorResult, PreferencesError, RuntimeError};
pub use poll::{find_matches, PollOutcome, ResultSet};
pub use preferences::{InMemoryPreferenceStore, JsonFileStore, PreferenceStore, Preferences};
pub use runtime::MonitorRuntime;
pub use session::{
    ControlOutcome, MonitorSession, SessionBuilder, SessionId, SessionSnapshot, SessionState, Status, TickReport,
    Transition,
};
pub use throttle::{AlertThrottle, DispatchOutcome, SignalTransition, ThrottleAction};
pub use time::{Clock, ManualClock, SystemClock};
pub use transport::{AlertRequest, AlertSink, SignalSink, TripSource};
pub use trip::{Capacities, Direction, Trip, TripId, TripQuery, VehicleClass, VehicleTypeFilter};
pub use watchlist::WatchList;
