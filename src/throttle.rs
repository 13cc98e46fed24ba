//! Alert throttling.
//!
//! Two independent policies decide what a set of matches turns into:
//!
//! - **Local signal**: starts on the first non-empty match set, repeats on
//!   the runtime's signal timer while matches persist, stops as soon as they
//!   don't (or the channel is switched off).
//! - **Message alerts**: at most one dispatch attempt per cooldown window,
//!   shared by all message channels. The window advances on every attempt,
//!   whatever the transport made of it.
//!
//! The throttle never renders status; it returns a [`ThrottleAction`] and
//! the session decides what to show.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{AlertChannelConfig, ChannelKind};
use crate::error::ConfigError;
use crate::time::to_chrono;
use crate::transport::{AlertRequest, AlertSink, SignalSink};
use crate::trip::{Trip, VehicleTypeFilter};

/// What happened to the local signal during one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTransition {
    /// The signal was inactive and has been started (and emitted once).
    Started,
    /// The signal was active and has been stopped.
    Stopped,
    /// No change.
    Unchanged,
}

/// What happened on the message channels during one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No matches, or no eligible destination.
    NotRequested,
    /// One request per channel was handed to the transport.
    Sent {
        /// Channels a request went out on, in order.
        channels: Vec<ChannelKind>,
        /// Shared body of every request.
        message: String,
    },
    /// Inside the cooldown window.
    Suppressed {
        /// Time until the window closes.
        remaining: Duration,
    },
}

/// Everything one evaluation did, for status rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleAction {
    /// Local signal change.
    pub signal: SignalTransition,
    /// Message channel result.
    pub dispatch: DispatchOutcome,
    /// Enabled message channels without a destination.
    pub warnings: Vec<ConfigError>,
}

impl ThrottleAction {
    const fn idle(signal: SignalTransition) -> Self {
        Self {
            signal,
            dispatch: DispatchOutcome::NotRequested,
            warnings: Vec::new(),
        }
    }

    /// True if any message went out.
    #[must_use]
    pub const fn sent(&self) -> bool {
        matches!(self.dispatch, DispatchOutcome::Sent { .. })
    }
}

/// Repeating local signal state.
#[derive(Debug, Clone, Default)]
struct SignalState {
    active_since: Option<DateTime<Utc>>,
    message: String,
    emissions: u64,
}

/// Cooldown and repeating-signal state for one session.
#[derive(Debug, Clone)]
pub struct AlertThrottle {
    cooldown: Duration,
    last_sent: Option<DateTime<Utc>>,
    signal: SignalState,
}

impl AlertThrottle {
    /// A throttle that has never sent anything.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sent: None,
            signal: SignalState::default(),
        }
    }

    /// Time of the last dispatch attempt.
    #[must_use]
    pub const fn last_sent(&self) -> Option<DateTime<Utc>> {
        self.last_sent
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn signal_active(&self) -> bool {
        self.signal.active_since.is_some()
    }

    /// Number of emissions since the signal was last started.
    #[must_use]
    pub const fn signal_emissions(&self) -> u64 {
        self.signal.emissions
    }

    /// Drives both policies with the matches of one poll.
    pub fn evaluate(
        &mut self,
        matches: &[Trip],
        channels: &AlertChannelConfig,
        filter: VehicleTypeFilter,
        now: DateTime<Utc>,
        alerts: &dyn AlertSink,
        signal: &dyn SignalSink,
    ) -> ThrottleAction {
        if matches.is_empty() {
            return ThrottleAction::idle(self.stop_transition());
        }

        let signal_transition = if channels.local_signal {
            self.start_signal(signal_message(matches), now, signal)
        } else {
            self.stop_transition()
        };

        let warnings: Vec<ConfigError> = channels
            .missing_destinations()
            .into_iter()
            .map(|channel| {
                warn!(%channel, "alert channel enabled without destination");
                ConfigError::MissingDestination { channel }
            })
            .collect();

        let destinations = channels.eligible_destinations();
        let dispatch = if destinations.is_empty() {
            DispatchOutcome::NotRequested
        } else if let Some(remaining) = self.cooldown_remaining(now) {
            debug!(remaining_secs = remaining.as_secs(), "alert suppressed by cooldown");
            DispatchOutcome::Suppressed { remaining }
        } else {
            let message = alert_message(matches, filter);
            let mut sent = Vec::with_capacity(destinations.len());
            for (channel, destination) in destinations {
                alerts.dispatch(&AlertRequest::for_channel(channel, destination, &message));
                sent.push(channel);
            }
            self.last_sent = Some(now);
            info!(channels = ?sent, matches = matches.len(), "alert dispatched");
            DispatchOutcome::Sent { channels: sent, message }
        };

        ThrottleAction {
            signal: signal_transition,
            dispatch,
            warnings,
        }
    }

    /// Re-emits the signal if it is active. Returns whether it emitted.
    pub fn repeat_signal(&mut self, signal: &dyn SignalSink) -> bool {
        if self.signal.active_since.is_none() {
            return false;
        }
        signal.emit(&self.signal.message);
        self.signal.emissions += 1;
        true
    }

    /// Force-stops the signal. Returns whether it was active.
    pub fn stop_signal(&mut self) -> bool {
        self.stop_transition() == SignalTransition::Stopped
    }

    fn start_signal(&mut self, message: String, now: DateTime<Utc>, signal: &dyn SignalSink) -> SignalTransition {
        self.signal.message = message;
        if self.signal.active_since.is_some() {
            return SignalTransition::Unchanged;
        }

        self.signal.active_since = Some(now);
        self.signal.emissions = 0;
        info!("local signal started");
        self.repeat_signal(signal);
        SignalTransition::Started
    }

    fn stop_transition(&mut self) -> SignalTransition {
        if self.signal.active_since.take().is_some() {
            info!(emissions = self.signal.emissions, "local signal stopped");
            SignalTransition::Stopped
        } else {
            SignalTransition::Unchanged
        }
    }

    fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_sent?;
        let remaining = to_chrono(self.cooldown) - (now - last);
        if remaining <= chrono::Duration::zero() {
            return None;
        }
        remaining.to_std().ok()
    }
}

fn departure_labels(matches: &[Trip]) -> String {
    matches
        .iter()
        .map(Trip::departure_label)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outbound alert text for a match set.
#[must_use]
pub fn alert_message(matches: &[Trip], filter: VehicleTypeFilter) -> String {
    format!(
        "Spots available for ferries at: {} ({})",
        departure_labels(matches),
        filter.code().to_ascii_uppercase()
    )
}

/// Local signal text for a match set.
#[must_use]
pub fn signal_message(matches: &[Trip]) -> String {
    format!("Spots available at: {}", departure_labels(matches))
}
