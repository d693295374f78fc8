// src/routes.rs

//! Route configuration for the control server.

use crate::{handlers::control, trace_socket};
use actix_web::web;

/// Configures all routes for the web server.
///
/// # Routes
/// - `/v1/play` - Load (POST) and play a script
/// - `/v1/stop`, `/v1/pause`, `/v1/resume` - Transport controls
/// - `/v1/skip?p=<timecode>` - Jump to a position
/// - `/v1/dump` - Loaded script as JSON
/// - `/v1/socket` - WebSocket trace of device actions
pub fn setup_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1")
            .route("/play", web::get().to(control::handle_play))
            .route("/play", web::post().to(control::handle_play))
            .route("/stop", web::get().to(control::handle_stop))
            .route("/pause", web::get().to(control::handle_pause))
            .route("/resume", web::get().to(control::handle_resume))
            .route("/skip", web::get().to(control::handle_skip))
            .route("/dump", web::get().to(control::handle_dump))
            .route("/socket", web::get().to(trace_socket::handle_ws_start)),
    );
}
