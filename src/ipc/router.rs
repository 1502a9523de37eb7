use super::handlers;
use super::handlers::ai::Dispatch;
use super::types::{AppState, Event, Request};
use crate::ipc::error::err;
use serde_json::json;

/// Answers one request. `None` means the reply will follow as an `AiDone`
/// event.
fn handle_request(state: &mut AppState, req: Request) -> Option<serde_json::Value> {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::documents::try_handle(state, &req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::record::try_handle(state, &req) {
        return Some(resp);
    }
    if let Some(resp) = handlers::preview::try_handle(state, &req) {
        return Some(resp);
    }
    if let Some(dispatch) = handlers::ai::try_handle(state, &req) {
        return match dispatch {
            Dispatch::Reply(resp) => Some(resp),
            Dispatch::Pending => None,
        };
    }
    if let Some(resp) = handlers::setup::try_handle(state, &req) {
        return Some(resp);
    }

    tracing::debug!(method = %req.method, "unknown method");
    Some(err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    ))
}

/// Reacts to one loop event and returns the line to write, if any.
pub fn handle_event(state: &mut AppState, event: Event) -> Option<serde_json::Value> {
    match event {
        Event::Line(line) => {
            if line.trim().is_empty() {
                return None;
            }
            match serde_json::from_str::<Request>(&line) {
                Ok(req) => handle_request(state, req),
                Err(e) => {
                    // No id to echo back.
                    tracing::warn!("bad request line: {e}");
                    Some(json!({
                        "id": null,
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() },
                    }))
                }
            }
        }
        Event::AiDone(done) => Some(handlers::ai::complete(state, done)),
        Event::InputClosed => None,
    }
}
