//! # events
//!
//! Defines [`MonitorEvent`], every event the Monitor Engine pushes through
//! the Notification Hub.
//!
//! Subscribers receive the structured value; the WebSocket transport turns it
//! into a JSON text frame with [`MonitorEvent::to_json`].

use serde::Serialize;

use crate::models::{Alert, Tick};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorEvent {
    /// A new price sample was accepted for an instrument.
    Tick { tick: Tick },

    /// A price move crossed the alert threshold.
    Alert { alert: Alert },
}

impl MonitorEvent {
    pub fn instrument_id(&self) -> &str {
        match self {
            MonitorEvent::Tick { tick }   => tick.instrument_id(),
            MonitorEvent::Alert { alert } => alert.instrument_id(),
        }
    }

    /// Stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::Tick { .. }  => "tick",
            MonitorEvent::Alert { .. } => "alert",
        }
    }

    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

impl From<Tick> for MonitorEvent {
    fn from(tick: Tick) -> Self {
        MonitorEvent::Tick { tick }
    }
}

impl From<Alert> for MonitorEvent {
    fn from(alert: Alert) -> Self {
        MonitorEvent::Alert { alert }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn tick_event_is_tagged() {
        let tick = Tick::new("solana", "solana", 142.3, Utc::now()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&MonitorEvent::from(tick).to_json()).unwrap();

        assert_eq!(json["event"], "TICK");
        assert_eq!(json["tick"]["instrument_id"], "solana");
        assert_eq!(json["tick"]["price"], 142.3);
    }
}
