//! Monitor session state machine.
//!
//! A [`MonitorSession`] owns everything one monitoring session mutates: the
//! watch list, the result set, the throttle state and the status line. Its
//! collaborators (trip source, alert sink, signal sink, clock, preference
//! store) are injected at construction.
//!
//! ```text
//!           start (watch list non-empty, destinations set)
//!   Idle ───────────────────────────────────────────────▶ Active ──┐
//!    ▲                                                      │      │ tick
//!    └───────────────────────── stop ───────────────────────┘ ◀────┘
//! ```
//!
//! The session is synchronous. Timers live in
//! [`MonitorRuntime`](crate::runtime::MonitorRuntime), which drives the
//! split poll API (`begin_poll` / `complete_poll`) so a fetch can run off the
//! session thread. Each start, stop and query change bumps a generation
//! counter; poll results from an older generation are discarded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AlertChannelConfig, ChannelKind, MonitorConfig};
use crate::error::{ConfigError, FetchError, MonitorResult};
use crate::poll::{PollCycle, PollOutcome, ResultSet};
use crate::preferences::{PreferenceStore, Preferences};
use crate::throttle::{AlertThrottle, DispatchOutcome, ThrottleAction};
use crate::time::{Clock, SystemClock};
use crate::transport::{AlertSink, NullSink, SignalSink, TripSource};
use crate::trip::{Trip, TripId, TripQuery, VehicleTypeFilter};
use crate::watchlist::WatchList;

/// Identifier used to correlate a session's log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No timers run; the listing can still be refreshed.
    Idle,
    /// Polling on the configured interval.
    Active,
}

/// Result of a start or stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// `Idle -> Active`.
    Started,
    /// Start requested while already active; nothing changed.
    AlreadyActive,
    /// `Active -> Idle`.
    Stopped,
    /// Stop requested while idle; nothing changed.
    AlreadyIdle,
}

/// Main status line.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    Ready,
    Listed {
        trips: usize,
    },
    Stopped,
    MatchesFound {
        times: Vec<String>,
    },
    Monitoring {
        watching: usize,
        checked_at: DateTime<Utc>,
    },
    FetchFailed {
        reason: String,
    },
}

/// Secondary status notes appended to the main line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusNote {
    /// Messages went out on these channels.
    AlertSent(Vec<ChannelKind>),
    /// Cooldown left before the next message.
    AlertSuppressed(Duration),
    /// Channel enabled with a blank destination.
    MissingDestination(ChannelKind),
}

/// User-visible status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Main line.
    pub kind: StatusKind,
    /// Appended in order.
    pub notes: Vec<StatusNote>,
}

impl Status {
    const fn new(kind: StatusKind) -> Self {
        Self {
            kind,
            notes: Vec::new(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StatusKind::Ready => f.write_str("Ready.")?,
            StatusKind::Listed { trips } => write!(f, "{trips} departures listed.")?,
            StatusKind::Stopped => f.write_str("Monitoring stopped.")?,
            StatusKind::MatchesFound { times } => write!(f, "SPOTS FOUND for {}!", times.join(", "))?,
            StatusKind::Monitoring { watching, checked_at } => write!(
                f,
                "Monitoring {watching} ferries... Last checked: {}",
                checked_at.format("%H:%M:%S")
            )?,
            StatusKind::FetchFailed { reason } => write!(f, "Error refreshing: {reason}")?,
        }

        for note in &self.notes {
            match note {
                StatusNote::AlertSent(channels) => {
                    let names: Vec<String> = channels.iter().map(ToString::to_string).collect();
                    write!(f, " Alert sent via {}.", names.join(", "))?;
                }
                StatusNote::AlertSuppressed(remaining) => {
                    let secs = remaining.as_secs();
                    write!(f, " Next alert possible in {}m {:02}s.", secs / 60, secs % 60)?;
                }
                StatusNote::MissingDestination(channel) => {
                    write!(f, " {channel} alerts enabled but {} missing!", channel.destination_field())?;
                }
            }
        }
        Ok(())
    }
}

/// Everything a presentation layer needs to render the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session the snapshot was taken from.
    pub id: SessionId,
    /// Lifecycle state.
    pub state: SessionState,
    /// Vehicle type used for matching.
    pub filter: VehicleTypeFilter,
    /// Number of watched trip ids.
    pub watch_count: usize,
    /// Size of the current listing.
    pub trip_count: usize,
    /// Whether the local signal is repeating.
    pub signal_active: bool,
    /// Rendered status line.
    pub status: String,
}

/// Answer to a start or stop request.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub transition: Transition,
    pub snapshot: SessionSnapshot,
}

/// Permission to run one fetch, handed out by [`MonitorSession::begin_poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    generation: u64,
    query: TripQuery,
}

impl PollTicket {
    /// Query to fetch, frozen when the ticket was issued.
    #[must_use]
    pub const fn query(&self) -> &TripQuery {
        &self.query
    }

    /// Session generation the ticket belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// What one completed poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// The listing was replaced and the throttle ran.
    Evaluated {
        /// Watched trips with spots.
        matches: Vec<Trip>,
        /// What the throttle did with them.
        action: ThrottleAction,
    },
    /// The fetch failed; the signal was force-stopped if it was active.
    Failed {
        /// Why the fetch failed.
        error: FetchError,
        /// True if a running signal was cut off.
        signal_stopped: bool,
    },
    /// The session was idle, busy, or the result belonged to an older generation.
    Discarded,
}

/// Builder for [`MonitorSession`].
pub struct SessionBuilder {
    source: Arc<dyn TripSource>,
    query: TripQuery,
    filter: VehicleTypeFilter,
    channels: AlertChannelConfig,
    config: MonitorConfig,
    alerts: Arc<dyn AlertSink>,
    signal: Arc<dyn SignalSink>,
    clock: Arc<dyn Clock>,
    preferences: Option<Box<dyn PreferenceStore>>,
    message_alerts: bool,
}

impl SessionBuilder {
    /// Vehicle type to match. Defaults to any.
    #[must_use]
    pub fn filter(mut self, filter: VehicleTypeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Alert channels. Defaults to the local signal only.
    #[must_use]
    pub fn channels(mut self, channels: AlertChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Timing and queue sizing.
    #[must_use]
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Outbound message delivery. Defaults to [`NullSink`].
    #[must_use]
    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Local signal output. Defaults to [`NullSink`].
    #[must_use]
    pub fn signal(mut self, signal: Arc<dyn SignalSink>) -> Self {
        self.signal = signal;
        self
    }

    /// Time source. Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Loads saved preferences at build time and saves after every change.
    #[must_use]
    pub fn preferences(mut self, store: Box<dyn PreferenceStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    /// With `false`, email and Telegram are switched off after preferences
    /// load, keeping their destinations. For hosts with no alert backend.
    #[must_use]
    pub fn message_alerts(mut self, deliverable: bool) -> Self {
        self.message_alerts = deliverable;
        self
    }

    /// Builds the session in the `Idle` state.
    ///
    /// A saved snapshot overrides the builder's query, filter and channels.
    /// An unreadable or invalid snapshot is logged and ignored.
    #[must_use]
    pub fn build(self) -> MonitorSession {
        let mut query = self.query;
        let mut filter = self.filter;
        let mut channels = self.channels;

        if let Some(store) = &self.preferences {
            match store.load() {
                Ok(Some(prefs)) => match (prefs.query(), prefs.vehicle_type()) {
                    (Ok(q), Ok(f)) => {
                        query = q;
                        filter = f;
                        channels = prefs.channels();
                        debug!("applied saved preferences");
                    }
                    (Err(e), _) | (_, Err(e)) => warn!(error = %e, "ignoring invalid saved preferences"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "could not load preferences"),
            }
        }

        if !self.message_alerts {
            channels = channels.local_only();
        }

        let session = MonitorSession {
            id: SessionId::new(),
            state: SessionState::Idle,
            generation: 0,
            in_flight: None,
            throttle: AlertThrottle::new(self.config.alert_cooldown),
            config: self.config,
            query,
            filter,
            channels,
            watchlist: WatchList::new(),
            poll: PollCycle::new(),
            status: Status::new(StatusKind::Ready),
            source: self.source,
            alerts: self.alerts,
            signal: self.signal,
            clock: self.clock,
            preferences: self.preferences,
        };
        info!(session = %session.id, query = ?session.query, "monitor session created");
        session
    }
}

/// One monitoring session. See the module docs for the state machine.
pub struct MonitorSession {
    id: SessionId,
    state: SessionState,
    generation: u64,
    in_flight: Option<u64>,
    config: MonitorConfig,
    query: TripQuery,
    filter: VehicleTypeFilter,
    channels: AlertChannelConfig,
    watchlist: WatchList,
    poll: PollCycle,
    throttle: AlertThrottle,
    status: Status,
    source: Arc<dyn TripSource>,
    alerts: Arc<dyn AlertSink>,
    signal: Arc<dyn SignalSink>,
    clock: Arc<dyn Clock>,
    preferences: Option<Box<dyn PreferenceStore>>,
}

impl fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("query", &self.query)
            .field("filter", &self.filter)
            .field("watching", &self.watchlist.len())
            .finish_non_exhaustive()
    }
}

impl MonitorSession {
    /// Starts building a session that polls `source` for `query`.
    ///
    /// Defaults: any vehicle type, local signal only, default timings, no
    /// outbound alerts, system clock, no persistence.
    #[must_use]
    pub fn builder(source: Arc<dyn TripSource>, query: TripQuery) -> SessionBuilder {
        SessionBuilder {
            source,
            query,
            filter: VehicleTypeFilter::default(),
            channels: AlertChannelConfig::default(),
            config: MonitorConfig::default(),
            alerts: Arc::new(NullSink),
            signal: Arc::new(NullSink),
            clock: Arc::new(SystemClock),
            preferences: None,
            message_alerts: true,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// `Idle -> Active`, then one synchronous poll.
    ///
    /// # Errors
    ///
    /// `ConfigError::EmptyWatchList` or `ConfigError::MissingDestination`;
    /// the session stays idle.
    pub fn start(&mut self) -> MonitorResult<ControlOutcome> {
        if self.state == SessionState::Active {
            debug!(session = %self.id, "start ignored: already active");
            return Ok(self.outcome(Transition::AlreadyActive));
        }
        if self.watchlist.is_empty() {
            return Err(ConfigError::EmptyWatchList.into());
        }
        self.channels.validate()?;

        self.state = SessionState::Active;
        self.generation += 1;
        self.in_flight = None;
        info!(session = %self.id, watching = self.watchlist.len(), filter = %self.filter, "monitoring started");

        self.tick();
        Ok(self.outcome(Transition::Started))
    }

    /// `Active -> Idle`. Stops the signal; keeps the watch list and cooldown.
    pub fn stop(&mut self) -> ControlOutcome {
        if self.state == SessionState::Idle {
            debug!(session = %self.id, "stop ignored: already idle");
            return self.outcome(Transition::AlreadyIdle);
        }

        self.state = SessionState::Idle;
        self.generation += 1;
        self.in_flight = None;
        self.throttle.stop_signal();
        self.status = Status::new(StatusKind::Stopped);
        info!(session = %self.id, "monitoring stopped");
        self.outcome(Transition::Stopped)
    }

    /// `Active -> Idle` because polling can no longer run. Unlike
    /// [`stop`](Self::stop) the status line reports `reason`.
    pub fn halt(&mut self, reason: impl Into<String>) -> ControlOutcome {
        let reason = reason.into();
        let outcome = self.stop();
        if outcome.transition == Transition::Stopped {
            warn!(session = %self.id, reason = %reason, "monitoring halted");
            self.status = Status::new(StatusKind::FetchFailed { reason });
            return self.outcome(Transition::Stopped);
        }
        outcome
    }

    /// Runs one full poll synchronously: fetch, match, throttle.
    pub fn tick(&mut self) -> TickReport {
        let Some(ticket) = self.begin_poll() else {
            return TickReport::Discarded;
        };
        let fetched = self.source.fetch(ticket.query());
        self.complete_poll(&ticket, fetched)
    }

    /// Claims the next poll. `None` while idle or while a poll is outstanding.
    pub fn begin_poll(&mut self) -> Option<PollTicket> {
        if self.state != SessionState::Active {
            return None;
        }
        if self.in_flight.is_some() {
            debug!(session = %self.id, "poll tick dropped: previous fetch outstanding");
            return None;
        }
        self.in_flight = Some(self.generation);
        Some(PollTicket {
            generation: self.generation,
            query: self.query.clone(),
        })
    }

    /// Releases a ticket whose fetch never ran.
    pub fn abandon_poll(&mut self, ticket: &PollTicket) {
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
        }
    }

    /// Applies the fetch result for `ticket`, atomically updating the result
    /// set, throttle state and status.
    pub fn complete_poll(&mut self, ticket: &PollTicket, fetched: Result<Vec<Trip>, FetchError>) -> TickReport {
        if self.state != SessionState::Active || ticket.generation != self.generation {
            debug!(session = %self.id, ticket = ticket.generation, current = self.generation, "stale poll result discarded");
            return TickReport::Discarded;
        }
        self.in_flight = None;

        let now = self.clock.now();
        match self.poll.apply(fetched, self.filter, &self.watchlist, now) {
            PollOutcome::Fetched { trip_count, matches } => {
                let action = self.throttle.evaluate(
                    &matches,
                    &self.channels,
                    self.filter,
                    now,
                    self.alerts.as_ref(),
                    self.signal.as_ref(),
                );
                debug!(session = %self.id, trips = trip_count, matches = matches.len(), "poll applied");
                self.status = render_tick_status(&matches, &action, self.watchlist.len(), now);
                TickReport::Evaluated { matches, action }
            }
            PollOutcome::Failed(error) => {
                warn!(session = %self.id, error = %error, "poll failed");
                let signal_stopped = self.throttle.stop_signal();
                self.status = Status::new(StatusKind::FetchFailed {
                    reason: error.to_string(),
                });
                TickReport::Failed { error, signal_stopped }
            }
        }
    }

    /// Re-emits the local signal if the session is active and it is running.
    pub fn signal_tick(&mut self) -> bool {
        self.state == SessionState::Active && self.throttle.repeat_signal(self.signal.as_ref())
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// One-off search: replaces the result set without driving alerts.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous result set is kept.
    pub fn refresh(&mut self) -> MonitorResult<SessionSnapshot> {
        let now = self.clock.now();
        let fetched = self.source.fetch(&self.query);
        match self.poll.apply(fetched, self.filter, &self.watchlist, now) {
            PollOutcome::Fetched { trip_count, .. } => {
                self.status = Status::new(StatusKind::Listed { trips: trip_count });
                Ok(self.snapshot())
            }
            PollOutcome::Failed(error) => {
                self.status = Status::new(StatusKind::FetchFailed {
                    reason: error.to_string(),
                });
                Err(error.into())
            }
        }
    }

    /// Adds `id` to the watch list if absent, removes it otherwise.
    pub fn toggle_watch(&mut self, id: TripId) -> SessionSnapshot {
        let watched = self.watchlist.toggle(id.clone());
        debug!(session = %self.id, trip = %id, watched, "watch toggled");
        self.snapshot()
    }

    /// Changes the vehicle type used by the next poll.
    pub fn set_vehicle_type_filter(&mut self, filter: VehicleTypeFilter) -> SessionSnapshot {
        self.filter = filter;
        self.persist();
        self.snapshot()
    }

    /// Changes the query used by the next poll. A fetch already running for
    /// the old query is discarded when it completes.
    pub fn set_query(&mut self, query: TripQuery) -> SessionSnapshot {
        if self.query != query && self.state == SessionState::Active {
            self.generation += 1;
            self.in_flight = None;
        }
        self.query = query;
        self.persist();
        self.snapshot()
    }

    /// Replaces the channel configuration used by the next poll.
    pub fn set_channels(&mut self, channels: AlertChannelConfig) -> SessionSnapshot {
        self.channels = channels;
        self.persist();
        self.snapshot()
    }

    fn persist(&self) {
        let Some(store) = &self.preferences else {
            return;
        };
        let prefs = Preferences::capture(&self.query, self.filter, &self.channels);
        if let Err(e) = store.save(&prefs) {
            warn!(session = %self.id, error = %e, "could not save preferences");
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Presentation view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state,
            filter: self.filter,
            watch_count: self.watchlist.len(),
            trip_count: self.poll.result_set().len(),
            signal_active: self.throttle.signal_active(),
            status: self.status.to_string(),
        }
    }

    fn outcome(&self, transition: Transition) -> ControlOutcome {
        ControlOutcome {
            transition,
            snapshot: self.snapshot(),
        }
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// True in the `Active` state.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    /// Shared handle to the trip source, for fetching off the session thread.
    #[must_use]
    pub fn source(&self) -> Arc<dyn TripSource> {
        Arc::clone(&self.source)
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Query used by the next fetch.
    #[must_use]
    pub const fn query(&self) -> &TripQuery {
        &self.query
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn filter(&self) -> VehicleTypeFilter {
        self.filter
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn channels(&self) -> &AlertChannelConfig {
        &self.channels
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn watchlist(&self) -> &WatchList {
        &self.watchlist
    }

    /// Listing from the last successful fetch.
    #[must_use]
    pub const fn result_set(&self) -> &ResultSet {
        self.poll.result_set()
    }

    /// Watched trips with spots in the current listing.
    #[must_use]
    pub fn current_matches(&self) -> Vec<Trip> {
        self.poll.current_matches(&self.watchlist, self.filter)
    }

    /// Structured status; `snapshot().status` is its rendering.
    #[must_use]
    pub const fn status(&self) -> &Status {
        &self.status
    }

    /// Whether the local signal is repeating.
    #[must_use]
    pub const fn signal_active(&self) -> bool {
        self.throttle.signal_active()
    }

    /// Time of the last outbound alert attempt.
    #[must_use]
    pub const fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.throttle.last_sent()
    }

    /// True while a fetch claimed by `begin_poll` has not completed.
    #[must_use]
    pub const fn poll_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

fn render_tick_status(matches: &[Trip], action: &ThrottleAction, watching: usize, now: DateTime<Utc>) -> Status {
    if matches.is_empty() {
        return Status::new(StatusKind::Monitoring {
            watching,
            checked_at: now,
        });
    }

    let mut status = Status::new(StatusKind::MatchesFound {
        times: matches.iter().map(Trip::departure_label).collect(),
    });
    match &action.dispatch {
        DispatchOutcome::Sent { channels, .. } => status.notes.push(StatusNote::AlertSent(channels.clone())),
        DispatchOutcome::Suppressed { remaining } => status.notes.push(StatusNote::AlertSuppressed(*remaining)),
        DispatchOutcome::NotRequested => {}
    }
    for w in &action.warnings {
        if let ConfigError::MissingDestination { channel } = w {
            status.notes.push(StatusNote::MissingDestination(*channel));
        }
    }
    status
}
