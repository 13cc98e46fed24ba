//! Alert channel configuration and monitor timing.
//!
//! Both are supplied from outside the core (preferences, CLI flags) and are
//! read-only to the session between user-initiated changes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Outbound message channels. Both share a single alert cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Email delivered by the backend's SMTP relay.
    Email,
    /// Telegram chat message delivered by the backend's bot.
    Telegram,
}

impl ChannelKind {
    /// All message channels, in dispatch order.
    pub const ALL: [Self; 2] = [Self::Email, Self::Telegram];

    /// Human readable name of the destination this channel needs.
    #[must_use]
    pub const fn destination_field(self) -> &'static str {
        match self {
            Self::Email => "email address",
            Self::Telegram => "Telegram chat id",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("Email"),
            Self::Telegram => f.write_str("Telegram"),
        }
    }
}

/// One outbound message channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageChannel {
    /// Whether the user ticked this channel.
    pub enabled: bool,
    /// Email address or chat id. Blank means "not set".
    pub destination: String,
}

impl MessageChannel {
    /// An enabled channel pointing at `destination`.
    #[must_use]
    pub fn enabled(destination: impl Into<String>) -> Self {
        Self {
            enabled: true,
            destination: destination.into(),
        }
    }

    /// The trimmed destination, if the channel is enabled and has one.
    #[must_use]
    pub fn eligible_destination(&self) -> Option<&str> {
        let dest = self.destination.trim();
        (self.enabled && !dest.is_empty()).then_some(dest)
    }

    /// True when the channel is enabled but nothing to deliver to.
    #[must_use]
    pub fn is_missing_destination(&self) -> bool {
        self.enabled && self.destination.trim().is_empty()
    }
}

/// Per-channel enablement and destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertChannelConfig {
    /// Local repeating signal (sound / desktop notification).
    pub local_signal: bool,
    /// Email channel.
    pub email: MessageChannel,
    /// Telegram channel.
    pub telegram: MessageChannel,
}

impl Default for AlertChannelConfig {
    fn default() -> Self {
        Self {
            local_signal: true,
            email: MessageChannel::default(),
            telegram: MessageChannel::default(),
        }
    }
}

impl AlertChannelConfig {
    /// The channel entry for `kind`.
    #[must_use]
    pub const fn channel(&self, kind: ChannelKind) -> &MessageChannel {
        match kind {
            ChannelKind::Email => &self.email,
            ChannelKind::Telegram => &self.telegram,
        }
    }

    /// Enabled channels with a usable destination.
    #[must_use]
    pub fn eligible_destinations(&self) -> Vec<(ChannelKind, &str)> {
        ChannelKind::ALL
            .into_iter()
            .filter_map(|kind| self.channel(kind).eligible_destination().map(|d| (kind, d)))
            .collect()
    }

    /// Enabled channels with a blank destination.
    #[must_use]
    pub fn missing_destinations(&self) -> Vec<ChannelKind> {
        ChannelKind::ALL
            .into_iter()
            .filter(|kind| self.channel(*kind).is_missing_destination())
            .collect()
    }

    /// The same settings with email and Telegram switched off.
    /// Destinations are kept so they come back when re-enabled.
    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.email.enabled = false;
        self.telegram.enabled = false;
        self
    }

    /// Fails on the first enabled channel without a destination.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.missing_destinations().first() {
            Some(&channel) => Err(ConfigError::MissingDestination { channel }),
            None => Ok(()),
        }
    }
}

/// Timing and queue sizing for a monitor session.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Period of the recurring poll timer.
    pub poll_interval: Duration,
    /// Period at which an active local signal is re-emitted.
    pub signal_interval: Duration,
    /// Minimum spacing between outbound message alerts.
    pub alert_cooldown: Duration,
    /// Max queued control requests for a runtime worker.
    pub control_queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            signal_interval: Duration::from_secs(5),
            alert_cooldown: Duration::from_secs(10 * 60),
            control_queue_capacity: 64,
        }
    }
}
