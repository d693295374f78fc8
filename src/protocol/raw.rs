// src/protocol/raw.rs

//! The raw launch format: timed position/speed commands with the same
//! values the device protocol uses.
//!
//! ```json
//! [{"at": 100, "pos": 50, "spd": 30}, {"at": 150, "pos": 70, "spd": 50}]
//! ```
//!
//! `at` is in milliseconds, `pos` and `spd` are percentages. Nothing is
//! translated, so the script has full control over the device.

use super::action::TimedAction;
use crate::error::Result;

pub fn load(data: &[u8]) -> Result<Vec<TimedAction>> {
    Ok(serde_json::from_slice(data)?)
}
