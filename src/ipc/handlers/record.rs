use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    check_choice, commit, ensure_resolves, parse_index, parse_section_kind, record_json,
    required_str, with_persistence,
};
use crate::ipc::types::{AppState, Request};
use crate::record::{Locator, RecordField, SectionField, UuidIds};
use serde_json::json;

fn handle_set_field(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match required_str(req, "field") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(field) = RecordField::parse(&name) else {
        return err(&req.id, "bad_params", format!("unknown field: {}", name), None);
    };
    let value = match required_str(req, "value") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let next = state.session.record.set_field(field, value);
    let persisted = commit(state, next);
    ok(
        &req.id,
        with_persistence(json!({ "record": record_json(&state.session.record) }), persisted),
    )
}

fn handle_set_section_field(state: &mut AppState, req: &Request) -> serde_json::Value {
    let kind = match parse_section_kind(req, req.params.get("section")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = match parse_index(req, req.params.get("index")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "field") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(field) = SectionField::parse(kind, &name) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown {} field: {}", kind.as_str(), name),
            None,
        );
    };
    let value = match required_str(req, "value") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let locator = Locator::Section { index, field };
    if let Err(e) = ensure_resolves(req, &state.session.record, locator) {
        return e;
    }
    if let Err(e) = check_choice(req, locator, &value) {
        return e;
    }

    let next = state.session.record.set_section_field(index, field, value);
    let persisted = commit(state, next);
    ok(
        &req.id,
        with_persistence(json!({ "record": record_json(&state.session.record) }), persisted),
    )
}

fn handle_append_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    let kind = match parse_section_kind(req, req.params.get("section")) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let next = state.session.record.append_section(kind, &mut UuidIds);
    let index = next.section_len(kind) - 1;
    let section_id = match kind {
        crate::record::SectionKind::Academic => next.academic_sections[index].id.clone(),
        crate::record::SectionKind::Summary => next.summary_sections[index].id.clone(),
    };
    let persisted = commit(state, next);
    ok(
        &req.id,
        with_persistence(
            json!({
                "record": record_json(&state.session.record),
                "index": index,
                "sectionId": section_id,
            }),
            persisted,
        ),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "record.setField" => Some(handle_set_field(state, req)),
        "record.setSectionField" => Some(handle_set_section_field(state, req)),
        "record.appendSection" => Some(handle_append_section(state, req)),
        _ => None,
    }
}
