use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, persist, record_json, required_str, with_persistence};
use crate::ipc::types::{AppState, Request, Session};
use serde_json::json;

fn handle_document_new(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = Session::blank();
    tracing::info!(document = %state.session.document_id, "started blank document");
    let result = json!({
        "documentId": state.session.document_id,
        "record": record_json(&state.session.record),
    });
    ok(&req.id, with_persistence(result, persist(state)))
}

fn handle_document_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "documentId": state.session.document_id,
            "record": record_json(&state.session.record),
        }),
    )
}

fn handle_document_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let docs = match db::load_documents(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let documents: Vec<serde_json::Value> = docs
        .iter()
        .map(|(id, r)| json!({ "id": id, "studentName": r.student_name }))
        .collect();
    ok(
        &req.id,
        json!({
            "documents": documents,
            "currentDocumentId": state.session.document_id,
        }),
    )
}

fn handle_document_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let document_id = match required_str(req, "documentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut docs = match db::load_documents(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let Some(record) = docs.remove(&document_id) else {
        return err(
            &req.id,
            "not_found",
            "document not found",
            Some(json!({ "documentId": document_id })),
        );
    };
    let pointer = db::set_current_document(conn, &document_id);

    state.session = Session {
        document_id,
        record,
    };
    let persisted = match pointer {
        Ok(()) => json!({ "persisted": true }),
        Err(e) => {
            tracing::warn!("could not record current document: {e:#}");
            json!({ "persisted": false, "persistError": format!("{e:#}") })
        }
    };
    ok(
        &req.id,
        with_persistence(
            json!({
                "documentId": state.session.document_id,
                "record": record_json(&state.session.record),
            }),
            persisted,
        ),
    )
}

fn handle_document_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = db_conn(state, req) {
        return e;
    }
    ok(
        &req.id,
        with_persistence(
            json!({ "documentId": state.session.document_id }),
            persist(state),
        ),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "document.new" => Some(handle_document_new(state, req)),
        "document.get" => Some(handle_document_get(state, req)),
        "document.list" => Some(handle_document_list(state, req)),
        "document.open" => Some(handle_document_open(state, req)),
        "document.save" => Some(handle_document_save(state, req)),
        _ => None,
    }
}
