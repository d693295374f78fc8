// src/protocol/funscript.rs

//! Funscript translation.
//!
//! A funscript is a list of timed positions:
//!
//! ```json
//! {"version": "1.0", "inverted": false, "range": 90,
//!  "actions": [{"at": 100, "pos": 0}, {"at": 600, "pos": 100}]}
//! ```
//!
//! The device takes "move to position with speed" commands, so every
//! position change is turned into a command fired at the time of the
//! previous position, with a speed that makes the move end on time.

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::action::TimedAction;
use crate::error::Result;

/// Slowest speed the device handles reliably.
pub const SPEED_LIMIT_MIN: i32 = 20;
/// Fastest speed before the device starts making noise.
pub const SPEED_LIMIT_MAX: i32 = 80;
/// Lowest usable position.
pub const POSITION_MIN: i32 = 5;
/// Highest usable position.
pub const POSITION_MAX: i32 = 95;
/// Actions closer together than this are counted as delayed.
pub const THRESHOLD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub version: String,
    /// Flips up and down movement.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inverted: bool,
    /// Percentage of a full stroke to use, 0 means unset.
    #[serde(default)]
    pub range: Range,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Milliseconds from the start of the script.
    pub at: i64,
    pub pos: i32,
}

/// Stroke range in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Range(pub i32);

impl Range {
    /// Scales `p` into the range.
    pub fn position(self, p: i32) -> i32 {
        if self.0 > 0 {
            return (p as f64 / 100.0 * self.0 as f64) as i32;
        }
        p
    }
}

/// Statistics collected while generating actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub count: u64,
    pub distance_total: u64,
    pub speed_total: u64,
    pub speed_override_fast: u32,
    pub speed_override_slow: u32,
    pub delayed: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let override_total = self.speed_override_fast + self.speed_override_slow;
        let (fast_pct, slow_pct) = if override_total > 0 {
            (
                self.speed_override_fast as f64 / override_total as f64 * 100.0,
                self.speed_override_slow as f64 / override_total as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };
        let avg_speed = if self.count > 0 {
            self.speed_total / self.count
        } else {
            0
        };
        write!(
            f,
            "actions={} (avgspeed={}%), delayed={}, speedoverrides={} (fast={:.2}%,slow={:.2}%)",
            self.count, avg_speed, self.delayed, override_total, fast_pct, slow_pct
        )
    }
}

impl Script {
    /// Generates timed device actions.
    ///
    /// `min_speed`/`max_speed` and `min_position`/`max_position` are
    /// limits in percent, further narrowed to what the device supports.
    pub fn timed_actions(
        &self,
        min_speed: i32,
        max_speed: i32,
        min_position: i32,
        max_position: i32,
    ) -> (Vec<TimedAction>, Stats) {
        let min_speed = min_speed.max(SPEED_LIMIT_MIN);
        let max_speed = max_speed.min(SPEED_LIMIT_MAX);
        let min_position = min_position.max(POSITION_MIN);
        let max_position = max_position.min(POSITION_MAX);

        let mut range = Range(max_position - min_position);
        if self.range.0 != 0 && range > self.range {
            range = self.range;
        }

        let mut stats = Stats::default();
        let mut actions = Vec::with_capacity(self.actions.len() + 1);

        // Start at the bottom, or the top when inverted.
        let start = if self.inverted { max_position } else { min_position };
        actions.push(TimedAction::new(
            Duration::ZERO,
            to_percent(start),
            SPEED_LIMIT_MIN as u8,
        ));

        let mut previous_position = start;
        let mut previous = Action { at: 0, pos: 0 };
        for &event in &self.actions {
            if event.pos == previous.pos {
                previous = event;
                continue;
            }

            let timediff = Duration::from_millis((event.at - previous.at).max(0) as u64);
            if timediff < THRESHOLD {
                stats.delayed += 1;
            }

            let mut position = event.pos;
            if self.inverted {
                position = 100 - position;
            }
            let position = (range.position(position) + min_position).clamp(0, 100);
            let distance = (position - previous_position).abs();
            stats.distance_total += distance as u64;

            let mut speed = speed(distance, timediff);
            if speed > max_speed {
                speed = max_speed;
                stats.speed_override_fast += 1;
            } else if speed < min_speed {
                speed = min_speed;
                stats.speed_override_slow += 1;
            }
            stats.speed_total += speed.max(0) as u64;

            actions.push(TimedAction::new(
                Duration::from_millis(previous.at.max(0) as u64),
                to_percent(position),
                to_percent(speed),
            ));
            stats.count += 1;
            previous = event;
            previous_position = position;
        }

        (actions, stats)
    }
}

fn to_percent(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

/// Speed in percent needed to move `distance` percent in `duration`.
pub fn speed(distance: i32, duration: Duration) -> i32 {
    if distance <= 0 {
        return 0;
    } else if distance > 100 {
        return 100;
    }
    let millis = duration.as_millis() as f64 * 90.0 / distance as f64;
    (25000.0 * millis.powf(-1.05)) as i32
}

/// Time it takes to move `distance` percent at `speed` percent.
pub fn duration(distance: i32, speed: i32) -> Duration {
    if distance <= 0 {
        return Duration::ZERO;
    }
    let millis = (speed as f64 / 25000.0).powf(-0.95);
    Duration::from_millis((millis / (90.0 / distance as f64)) as u64)
}

/// Distance in percent moved at `speed` percent during `duration`.
pub fn distance(speed: i32, duration: Duration) -> i32 {
    if speed <= 0 {
        return 0;
    }
    let millis = (speed as f64 / 25000.0).powf(-0.95);
    let diff = millis - duration.as_millis() as f64;
    90 - (diff / millis * 90.0) as i32
}

/// Loads funscripts with personalized limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Loader {
    speed_min: i32,
    speed_max: i32,
    position_min: i32,
    position_max: i32,
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "funscript loader (speeds:{}-{}) (positions:{}-{})",
            self.speed_min, self.speed_max, self.position_min, self.position_max
        )
    }
}

impl Loader {
    pub fn limit_position(&mut self, lowest: i32, highest: i32) {
        self.position_min = lowest.clamp(0, 90);
        self.position_max = highest.clamp(10, 100);
    }

    pub fn limit_speed(&mut self, slowest: i32, fastest: i32) {
        self.speed_min = slowest.clamp(SPEED_LIMIT_MIN, SPEED_LIMIT_MAX);
        self.speed_max = fastest.clamp(SPEED_LIMIT_MIN, SPEED_LIMIT_MAX);
    }

    pub fn load(&self, data: &[u8]) -> Result<Vec<TimedAction>> {
        let script: Script = serde_json::from_slice(data)?;
        info!("Loading Funscript: {}", self);
        let (actions, stats) = script.timed_actions(
            self.speed_min,
            self.speed_max,
            self.position_min,
            self.position_max,
        );
        info!("Funscript stats: {}", stats);
        Ok(actions)
    }
}
