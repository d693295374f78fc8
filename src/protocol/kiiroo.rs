// src/protocol/kiiroo.rs

//! Kiiroo event scripts.
//!
//! Format: `{<time>:<value>,<time>:<value>,...}` where time is in seconds
//! with two decimals and value is 0-4.
//!
//! The events carry no usable position, only "move now". Positions
//! alternate between 5% and 95%, and the speed follows the rate at which
//! events come in:
//!
//! - 50% when the last event was 2s or more ago, 20% when it was 1s or more.
//! - Otherwise the raw speed is `100 - (hundredths of a second + 10%)`, e.g.
//!   0.20s gives 78% and 0.50s gives 45%.
//! - Speeding up moves 1/6 of the way to the raw speed, slowing down
//!   subtracts half of the raw speed. Never below 20%.
//!
//! An event only moves the device when its value differs from the previous
//! one. Events faster than 151ms apart are rate limited: commands are sent
//! at 151ms intervals with the speed that was current when the limiter
//! kicked in.

use log::info;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::action::TimedAction;
use crate::error::{Error, Result};

/// Minimum time between two commands.
pub const LIMITER_TIME: Duration = Duration::from_millis(151);
pub const UP_POSITION: u8 = 95;
pub const DOWN_POSITION: u8 = 5;

/// A single Kiiroo event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    pub time: Duration,
    pub value: u8,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}:{}", self.time.as_secs_f64(), self.value)
    }
}

/// Parses `seconds:value`, e.g. `1.50:4`.
///
/// Seconds are rounded to the nearest millisecond rather than truncated, so
/// `1.51` becomes 1510 ms even though it is not exact as a float.
impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::MalformedInput(format!("invalid event format: {:?}", s));
        let (time, value) = s.trim().split_once(':').ok_or_else(invalid)?;
        let seconds: f64 = time.trim().parse().map_err(|_| invalid())?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(invalid());
        }
        let value: u8 = value.trim().parse().map_err(|_| invalid())?;
        if value > 4 {
            return Err(invalid());
        }
        Ok(Event {
            time: Duration::from_millis((seconds * 1000.0).round() as u64),
            value,
        })
    }
}

/// An ordered series of events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Events(pub Vec<Event>);

impl Events {
    /// Orders events by time, keeping the input order for equal times.
    pub fn sort(&mut self) {
        self.0.sort_by_key(|e| e.time);
    }
}

impl fmt::Display for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", e)?;
        }
        f.write_str("}")
    }
}

impl FromStr for Events {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| Error::MalformedInput("events must be enclosed in braces".to_string()))?;
        body.split(',')
            .map(str::parse)
            .collect::<Result<Vec<Event>>>()
            .map(Events)
    }
}

/// Converts Kiiroo events into device actions.
pub trait Algorithm {
    fn actions(&self, events: &Events) -> Vec<TimedAction>;
}

/// Mimics the behaviour of the Kiiroo apps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAlgorithm;

impl Algorithm for DefaultAlgorithm {
    fn actions(&self, events: &Events) -> Vec<TimedAction> {
        let mut previous_event = Event::default();
        let mut previous_action = TimedAction::default();
        let mut position = TogglePosition::default();
        let mut speed = 0;
        let mut limited_speed = 0;

        let mut actions = Vec::with_capacity(events.0.len());
        for &event in &events.0 {
            if event.value == previous_event.value {
                continue;
            }

            speed = calc_speed(event.time.saturating_sub(previous_event.time), speed);

            if event.time.saturating_sub(previous_action.time) <= LIMITER_TIME {
                if limited_speed == 0 {
                    limited_speed = speed;
                }
                // Only schedule a move when the last one is not ahead of
                // this event already.
                if previous_action.time < event.time {
                    let action = TimedAction::new(
                        previous_action.time + LIMITER_TIME,
                        position.toggle(),
                        limited_speed,
                    );
                    actions.push(action);
                    previous_action = action;
                }
            } else {
                limited_speed = 0;
                let action = TimedAction::new(event.time, position.toggle(), speed);
                actions.push(action);
                previous_action = action;
            }

            previous_event = event;
        }
        actions
    }
}

/// Speed for an event `t` after the previous one, given the previous speed.
fn calc_speed(t: Duration, previous: u8) -> u8 {
    if t >= Duration::from_secs(2) {
        return 50;
    } else if t >= Duration::from_secs(1) {
        return 20;
    }

    let raw = (100 - t.as_nanos() as i64 * 110 / 1_000_000_000).max(0);
    let previous = previous as i64;
    let speed = if raw > previous {
        previous + (raw - previous) / 6
    } else {
        previous - raw / 2
    };
    speed.clamp(20, 100) as u8
}

#[derive(Debug, Clone, Copy, Default)]
struct TogglePosition(u8);

impl TogglePosition {
    fn toggle(&mut self) -> u8 {
        self.0 = if self.0 > DOWN_POSITION {
            DOWN_POSITION
        } else {
            UP_POSITION
        };
        self.0
    }
}

/// Loads a Kiiroo event script.
pub fn load(data: &[u8]) -> Result<Vec<TimedAction>> {
    let text = std::str::from_utf8(data).map_err(|e| Error::MalformedInput(e.to_string()))?;
    let mut events: Events = text.parse()?;
    events.sort();
    let actions = DefaultAlgorithm.actions(&events);
    info!("Kiiroo stats: {} actions", actions.len());
    Ok(actions)
}

/// Loads the Kiiroo block of a VRP text file:
///
/// ```text
/// [Kiiroo]
/// onyx=1.00,4;2.50,1;8.12,3
/// ```
pub fn load_text(data: &[u8]) -> Result<Vec<TimedAction>> {
    let text = String::from_utf8_lossy(data);
    let mut in_kiiroo_block = false;
    for line in text.split(['\r', '\n']).map(str::trim) {
        if line == "[Kiiroo]" {
            in_kiiroo_block = true;
            continue;
        } else if line.starts_with('[') {
            in_kiiroo_block = false;
            continue;
        }

        if let Some(events) = line.strip_prefix("onyx=").filter(|_| in_kiiroo_block) {
            let events = events.replace(',', ":").replace(';', ",");
            return load(format!("{{{}}}", events).as_bytes());
        }
    }
    Err(Error::MalformedInput("no kiiroo block found".to_string()))
}

#[derive(Deserialize)]
struct FlmeScript {
    text: Option<String>,
    subs: Option<FlmeSubs>,
}

#[derive(Deserialize)]
struct FlmeSubs {
    text: String,
}

/// Loads a FlMe JSON script, `{"text": "{1.00:4,...}"}`, optionally nested
/// under `subs`.
pub fn load_json(data: &[u8]) -> Result<Vec<TimedAction>> {
    let script: FlmeScript = serde_json::from_slice(data)?;
    let text = script
        .text
        .or(script.subs.map(|subs| subs.text))
        .ok_or_else(|| Error::MalformedInput("missing text field".to_string()))?;
    load(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn events(list: &[(u64, u8)]) -> Events {
        Events(
            list.iter()
                .map(|&(time, value)| Event { time: ms(time), value })
                .collect(),
        )
    }

    #[test]
    fn event_text_format() {
        let e = Event { time: ms(1234), value: 2 };
        assert_eq!(e.to_string(), "1.23:2");
        assert_eq!("1.23:2".parse::<Event>().unwrap(), Event { time: ms(1230), value: 2 });
    }

    #[test]
    fn event_time_rounds_to_millis() {
        let event: Event = "1.51:3".parse().unwrap();
        assert_eq!(event.time, ms(1510));
        let event: Event = "1.2346:1".parse().unwrap();
        assert_eq!(event.time, ms(1235));
        let event: Event = "2.0004:1".parse().unwrap();
        assert_eq!(event.time, ms(2000));
    }

    #[test]
    fn event_rejects_bad_input() {
        for input in ["1.23", "x:2", "1.23:5", "1.23:-1", "1.23:2:3", "-1.00:1"] {
            assert!(input.parse::<Event>().is_err(), "{:?} should not parse", input);
        }
    }

    #[test]
    fn events_text_format() {
        let es = events(&[(1230, 2), (1500, 4), (3000, 0)]);
        assert_eq!(es.to_string(), "{1.23:2,1.50:4,3.00:0}");
        assert_eq!("{1.23:2,1.50:4,3.00:0}".parse::<Events>().unwrap(), es);
    }

    #[test]
    fn events_rejects_bad_input() {
        assert!("".parse::<Events>().is_err());
        assert!("{}".parse::<Events>().is_err());
        assert!("1.00:1,2.00:2".parse::<Events>().is_err());
    }

    #[test]
    fn events_sort_by_time() {
        let mut es: Events = "{1.50:4,1.23:2,3.00:0}".parse().unwrap();
        es.sort();
        assert_eq!(es, events(&[(1230, 2), (1500, 4), (3000, 0)]));
    }

    #[test]
    fn speed_accelerates_fast_and_decelerates_slowly() {
        assert_eq!(calc_speed(ms(2500), 70), 50);
        assert_eq!(calc_speed(ms(1200), 70), 20);
        // raw 78, up by a sixth of the gap
        assert_eq!(calc_speed(ms(200), 50), 54);
        // raw 45, down by half of raw
        assert_eq!(calc_speed(ms(500), 63), 41);
        // raw 23, 30 - 11 drops below the floor
        assert_eq!(calc_speed(ms(700), 30), 20);
    }

    #[test]
    fn rate_limited_events_are_spaced() {
        let es: Events = "{1.00:1,1.50:4,1.51:4,1.51:3,1.52:4}".parse().unwrap();
        let actions = DefaultAlgorithm.actions(&es);
        assert_eq!(
            actions,
            vec![
                TimedAction::new(ms(1000), 95, 20),
                TimedAction::new(ms(1500), 5, 24),
                TimedAction::new(ms(1651), 95, 36),
            ]
        );
    }

    #[test]
    fn noisy_scenario_never_repeats_or_crowds() {
        let data = "{1.00:1,1.50:4,1.51:4,1.51:3,1.52:4,1.66:1,1.84:2,1.85:3,1.90:4,1.95:1,2.00:2,2.20:4,2.45:2}";
        let actions = load(data.as_bytes()).unwrap();
        assert!(actions.len() > 1);
        for pair in actions.windows(2) {
            assert_ne!(pair[0].position(), pair[1].position());
            assert!(pair[1].time - pair[0].time >= ms(150), "{:?}", pair);
        }
    }

    #[test]
    fn first_event_with_zero_value_does_not_move() {
        let actions = DefaultAlgorithm.actions(&events(&[(500, 0), (3000, 2)]));
        assert_eq!(actions, vec![TimedAction::new(ms(3000), 95, 50)]);
    }

    #[test]
    fn load_text_finds_kiiroo_block() {
        let unix = "[Player]\nzoom=0\n\n[VideoInfo]\nname=Test\nversion=2\n\n[Kiiroo]\nonyx=1.00,4;2.50,1;8.12,3\n";
        let mac = unix.replace('\n', "\r\r\n");
        for input in [unix.to_string(), mac] {
            let actions = load_text(input.as_bytes()).unwrap();
            assert_eq!(actions.len(), 3);
        }
    }

    #[test]
    fn load_text_requires_kiiroo_block() {
        assert!(load_text(b"[Player]\nonyx=1.00,4;2.50,1\n").is_err());
    }

    #[test]
    fn load_json_reads_text_field() {
        for input in [
            r#"{"text": "{1.00:4,2.50:1}"}"#,
            r#"{"text": " {1.00:4,2.50:1}"}"#,
            r#"{"subs":{"text":" {1.00:4,2.50:1}"}}"#,
        ] {
            let actions = load_json(input.as_bytes()).unwrap();
            assert!(actions.len() >= 2, "{}", input);
        }
    }

    #[test]
    fn load_json_without_text_fails() {
        assert!(load_json(br#"{"version":"1.0","actions":[]}"#).is_err());
    }
}
