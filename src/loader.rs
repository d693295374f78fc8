// src/loader.rs

//! Script ingestion: picks the translator for a content type and wraps its
//! output in a personalized [`Player`].

use log::{debug, info};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::action::TimedAction;
use crate::protocol::player::Player;
use crate::protocol::{funscript, kiiroo, raw};

/// Settings customizing a script's behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Personalization {
    pub latency: Duration,
    /// Lowest position
    pub position_min: i32,
    /// Highest position
    pub position_max: i32,
    /// Slowest speed to move at
    pub speed_min: i32,
    /// Fastest speed to move at
    pub speed_max: i32,
}

impl Default for Personalization {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            position_min: 5,
            position_max: 95,
            speed_min: 20,
            speed_max: 80,
        }
    }
}

type LoadFn = fn(&[u8], &Personalization) -> Result<Vec<TimedAction>>;

/// A translator with the media types it accepts.
pub struct Loader {
    pub name: &'static str,
    pub content_types: &'static [&'static str],
    load: LoadFn,
}

impl Loader {
    /// Checks if the loader handles `content_type` (case insensitive).
    pub fn is_supported(&self, content_type: &str) -> bool {
        self.content_types
            .iter()
            .any(|c| c.eq_ignore_ascii_case(content_type))
    }
}

/// All registered loaders, in the order they are tried.
pub static LOADERS: &[Loader] = &[
    Loader {
        name: "raw",
        content_types: &["application/prs.launchcontrol+json", "application/json"],
        load: load_raw,
    },
    Loader {
        name: "funscript",
        content_types: &["application/prs.funscript+json", "application/json"],
        load: load_funscript,
    },
    Loader {
        name: "kiiroo",
        content_types: &["text/prs.kiiroo", "x-text/kiiroo", "text/plain"],
        load: load_kiiroo,
    },
    Loader {
        name: "kiiroo text",
        content_types: &["text/plain"],
        load: load_kiiroo_text,
    },
    Loader {
        name: "kiiroo json",
        content_types: &["application/json"],
        load: load_kiiroo_json,
    },
];

fn load_raw(data: &[u8], _: &Personalization) -> Result<Vec<TimedAction>> {
    raw::load(data)
}

fn load_kiiroo(data: &[u8], _: &Personalization) -> Result<Vec<TimedAction>> {
    kiiroo::load(data)
}

fn load_kiiroo_text(data: &[u8], _: &Personalization) -> Result<Vec<TimedAction>> {
    kiiroo::load_text(data)
}

fn load_kiiroo_json(data: &[u8], _: &Personalization) -> Result<Vec<TimedAction>> {
    kiiroo::load_json(data)
}

fn load_funscript(data: &[u8], pers: &Personalization) -> Result<Vec<TimedAction>> {
    let mut loader = funscript::Loader::default();
    loader.limit_position(pers.position_min, pers.position_max);
    loader.limit_speed(pers.speed_min, pers.speed_max);
    loader.load(data)
}

/// Loads `data` with the loaders accepting `content_type` (all loaders when
/// `None`) and returns a player for the first one that succeeds.
///
/// When only one loader matches, its error is returned as-is.
pub fn load_script(
    data: &[u8],
    content_type: Option<&str>,
    pers: &Personalization,
) -> Result<Player> {
    let candidates: Vec<&Loader> = LOADERS
        .iter()
        .filter(|l| content_type.map_or(true, |c| l.is_supported(c)))
        .collect();

    if let [only] = candidates.as_slice() {
        return load(only, data, pers);
    }

    for loader in candidates {
        match load(loader, data, pers) {
            Ok(player) => return Ok(player),
            Err(e) => debug!("{} loader rejected script: {}", loader.name, e),
        }
    }
    Err(Error::Unsupported)
}

fn load(loader: &Loader, data: &[u8], pers: &Personalization) -> Result<Player> {
    let script = (loader.load)(data, pers)?;
    info!("Loaded {} script with {} actions", loader.name, script.len());

    let mut player = Player::new(script);
    player.latency(pers.latency);
    player.limit_position(pers.position_min, pers.position_max);
    player.limit_speed(pers.speed_min, pers.speed_max);
    Ok(player)
}
