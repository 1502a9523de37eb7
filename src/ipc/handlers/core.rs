use crate::config::AiSettings;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{persist, with_persistence};
use crate::ipc::types::{AppState, Request, Session};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "documentId": state.session.document_id,
            "aiConfigured": state.text_service.is_some() || AiSettings::api_key().is_some(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    // A saved current document replaces whatever is open in memory; an
    // unreadable document map keeps the in-memory one and reports it.
    let mut load_error = None;
    match db::load_current(&conn) {
        Ok(Some((document_id, record))) => {
            state.session = Session { document_id, record };
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("could not restore current document: {e:#}");
            load_error = Some(format!("{e:#}"));
        }
    }

    state.workspace = Some(path.clone());
    state.db = Some(conn);
    tracing::info!(workspace = %path.display(), document = %state.session.document_id, "workspace selected");

    let mut result = json!({
        "workspacePath": path.to_string_lossy(),
        "documentId": state.session.document_id,
    });
    if let Some(e) = load_error {
        result["loadError"] = json!(e);
    }
    ok(&req.id, with_persistence(result, persist(state)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
