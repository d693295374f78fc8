// src/handlers/control.rs

//! Playback control handlers
//!
//! Thin adapters from HTTP requests to [`Manager`] operations. Every handler
//! answers with `OK` or a plain text error, see [`manager_response`].

use actix_web::{
    http::{header, Method},
    web, HttpRequest, HttpResponse,
};
use log::{error, info};

use super::types::{parse_timecode, PlayParams, SkipParams};
use crate::error::{Error, Result};
use crate::loader;
use crate::manager::Manager;

/// Loads the posted script, if any, and starts playing.
///
/// The `Content-Type` of the body selects the script loader. Without a body
/// (`GET`) the already loaded script is played.
pub async fn handle_play(
    req: HttpRequest,
    params: web::Query<PlayParams>,
    body: web::Bytes,
    manager: web::Data<Manager>,
) -> HttpResponse {
    if req.method() == Method::POST {
        let pers = params.personalization();
        let content_type = media_type(&req);
        info!(
            "Loading script ({} bytes, {})",
            body.len(),
            content_type.unwrap_or("no content type")
        );

        let player = match loader::load_script(&body, content_type, &pers) {
            Ok(player) => player,
            Err(Error::Unsupported) => {
                return HttpResponse::UnsupportedMediaType().body("unsupported script\n")
            }
            Err(e) => {
                error!("Error loading script: {}", e);
                return internal_server_error();
            }
        };
        if let Err(e) = manager.set_script_player(player).await {
            return manager_response(Err(e));
        }
    }
    manager_response(manager.play().await)
}

pub async fn handle_stop(manager: web::Data<Manager>) -> HttpResponse {
    manager_response(manager.stop().await)
}

pub async fn handle_pause(manager: web::Data<Manager>) -> HttpResponse {
    manager_response(manager.pause().await)
}

pub async fn handle_resume(manager: web::Data<Manager>) -> HttpResponse {
    manager_response(manager.resume().await)
}

/// Jumps to the timecode in the `p` query parameter.
pub async fn handle_skip(
    params: web::Query<SkipParams>,
    manager: web::Data<Manager>,
) -> HttpResponse {
    match parse_timecode(&params.p) {
        Some(position) => manager_response(manager.skip(position).await),
        None => HttpResponse::BadRequest().body("invalid timecode\n"),
    }
}

/// Returns the loaded script as raw timed actions.
pub async fn handle_dump(manager: web::Data<Manager>) -> HttpResponse {
    match manager.dump().await {
        Ok(script) => HttpResponse::Ok()
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .json(script),
        Err(e) => manager_response(Err(e)),
    }
}

/// Media type of the request body without parameters, e.g. `text/plain`
/// for `text/plain; charset=utf-8`.
fn media_type(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Maps the outcome of a manager operation to a response.
fn manager_response(result: Result<()>) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::Ok().body("OK\n"),
        Err(Error::NotSupported) => {
            HttpResponse::Conflict().body("operation not supported by loaded script type\n")
        }
        Err(Error::NotPlaying) => {
            HttpResponse::Conflict().body("operation cannot be executed when not playing\n")
        }
        Err(e) => {
            error!("Internal server error, {}", e);
            internal_server_error()
        }
    }
}

fn internal_server_error() -> HttpResponse {
    HttpResponse::InternalServerError().body("internal server error\n")
}
