//! Collaborator traits for the monitoring core.
//!
//! The session only talks to the outside world through these seams:
//! - [`TripSource`]: fetches the listing for one query
//! - [`AlertSink`]: fire-and-forget outbound message delivery
//! - [`SignalSink`]: the locally perceivable repeating signal

use serde::{Deserialize, Serialize};

use crate::config::ChannelKind;
use crate::error::FetchError;
use crate::trip::{Trip, TripQuery};

/// Fetches the trips for a date/direction/time-window query.
pub trait TripSource: Send + Sync {
    /// Returns the current listing, in feed order.
    ///
    /// An empty listing is a success. Transport failures and non-2xx
    /// responses are errors; no retry happens inside a single call.
    fn fetch(&self, query: &TripQuery) -> Result<Vec<Trip>, FetchError>;
}

/// Body of one outbound alert request.
///
/// Exactly one destination is set per request; the session dispatches one
/// request per eligible channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRequest {
    /// Email destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Telegram destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
    /// Text shared by every channel.
    pub message: String,
}

impl AlertRequest {
    /// A request for a single channel destination.
    #[must_use]
    pub fn for_channel(channel: ChannelKind, destination: &str, message: &str) -> Self {
        let (email, telegram_chat_id) = match channel {
            ChannelKind::Email => (Some(destination.to_string()), None),
            ChannelKind::Telegram => (None, Some(destination.to_string())),
        };
        Self {
            email,
            telegram_chat_id,
            message: message.to_string(),
        }
    }

    /// The channel this request targets, if any destination is set.
    #[must_use]
    pub fn channel(&self) -> Option<ChannelKind> {
        match (&self.email, &self.telegram_chat_id) {
            (Some(_), _) => Some(ChannelKind::Email),
            (None, Some(_)) => Some(ChannelKind::Telegram),
            (None, None) => None,
        }
    }
}

/// Outbound alert delivery.
///
/// Implementations swallow (and log) delivery failures: the core only knows
/// that a dispatch was attempted.
pub trait AlertSink: Send + Sync {
    /// Hands one request to the transport.
    fn dispatch(&self, request: &AlertRequest);
}

/// The local repeating signal (sound, bell, desktop notification).
pub trait SignalSink: Send + Sync {
    /// Emits the signal once.
    fn emit(&self, message: &str);
}
