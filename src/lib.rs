// src/lib.rs

//! # Launch Control
//!
//! Plays haptic scripts on a single stroker device. Scripts are translated
//! into timed position/speed actions and played back in real time, with
//! pause, resume and skip while playing.
//!
//! ## Architecture
//!
//! - `protocol`: script formats and the [`Player`](protocol::player::Player)
//! - `loader`: picks a script format by content type
//! - `manager`: device connection and playback session
//! - `device`: the device abstraction and its Intiface and logging implementations
//! - `routes`, `handlers`, `trace_socket`: HTTP control surface
//! - `config`: runtime settings

pub mod config;
pub mod error;
pub mod loader;
pub mod manager;
pub mod device;

/// Script formats and playback
pub mod protocol {
    pub mod action;
    pub mod player;
    pub mod funscript;
    pub mod kiiroo;
    pub mod raw;
}

pub mod routes;
pub mod handlers {
    pub mod control;
    pub mod types;
}

pub mod trace_socket;
