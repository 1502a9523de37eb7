use crate::ipc::error::ok;
use crate::ipc::helpers::{commit, record_json, required_str, with_persistence};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::reconcile;
use crate::render::render;
use serde_json::json;

fn handle_preview_render(state: &mut AppState, req: &Request) -> serde_json::Value {
    let doc = render(&state.session.record);
    ok(
        &req.id,
        json!({
            "markup": doc.to_markup(),
            "text": doc.to_plain_text(),
        }),
    )
}

fn handle_preview_reconcile(state: &mut AppState, req: &Request) -> serde_json::Value {
    let markup = match required_str(req, "markup") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let outcome = reconcile(&state.session.record, &markup);
    if !outcome.is_changed() {
        return ok(
            &req.id,
            json!({
                "changed": false,
                "record": record_json(&state.session.record),
            }),
        );
    }

    let next = outcome.into_record(&state.session.record);
    let persisted = commit(state, next);
    let doc = render(&state.session.record);
    ok(
        &req.id,
        with_persistence(
            json!({
                "changed": true,
                "record": record_json(&state.session.record),
                "markup": doc.to_markup(),
                "text": doc.to_plain_text(),
            }),
            persisted,
        ),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "preview.render" => Some(handle_preview_render(state, req)),
        "preview.reconcile" => Some(handle_preview_reconcile(state, req)),
        _ => None,
    }
}
