// src/protocol/action.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single command for the device: move to `position` with `speed`,
/// both in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "pos")]
    pub position: u8,
    #[serde(rename = "spd")]
    pub speed: u8,
}

impl Action {
    pub fn new(position: u8, speed: u8) -> Self {
        Self { position, speed }
    }
}

/// An [`Action`] scheduled at an offset from the start of the script.
///
/// On the wire this is the raw launch format `{"at": ms, "pos": %, "spd": %}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawAction", into = "RawAction")]
pub struct TimedAction {
    pub action: Action,
    pub time: Duration,
}

impl TimedAction {
    pub fn new(time: Duration, position: u8, speed: u8) -> Self {
        Self {
            action: Action::new(position, speed),
            time,
        }
    }

    pub fn position(&self) -> u8 {
        self.action.position
    }

    pub fn speed(&self) -> u8 {
        self.action.speed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawAction {
    at: u64,
    pos: u8,
    spd: u8,
}

impl From<RawAction> for TimedAction {
    fn from(raw: RawAction) -> Self {
        TimedAction::new(Duration::from_millis(raw.at), raw.pos, raw.spd)
    }
}

impl From<TimedAction> for RawAction {
    fn from(ta: TimedAction) -> Self {
        RawAction {
            at: ta.time.as_millis() as u64,
            pos: ta.action.position,
            spd: ta.action.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_raw_wire_form() {
        let ta: TimedAction = serde_json::from_str(r#"{"at":100,"pos":50,"spd":20}"#).unwrap();
        assert_eq!(ta, TimedAction::new(Duration::from_millis(100), 50, 20));
    }

    #[test]
    fn raw_wire_form_round_trips() {
        let ta = TimedAction::new(Duration::from_millis(150), 100, 50);
        let json = serde_json::to_string(&ta).unwrap();
        assert_eq!(json, r#"{"at":150,"pos":100,"spd":50}"#);
        let back: TimedAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ta);
    }

    #[test]
    fn action_serializes_short_names() {
        let json = serde_json::to_string(&Action::new(5, 80)).unwrap();
        assert_eq!(json, r#"{"pos":5,"spd":80}"#);
    }
}
