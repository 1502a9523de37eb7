use rusqlite::Connection;
use serde_json::{json, Value};

use crate::db;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::record::{Locator, Record, RecordField, SectionField, SectionKind};

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn parse_section_kind(req: &Request, v: Option<&Value>) -> Result<SectionKind, Value> {
    v.and_then(|v| v.as_str())
        .and_then(SectionKind::parse)
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "section must be one of: academic, summary",
                None,
            )
        })
}

/// Reads a wire locator `{ field, section?, index? }` and checks that it
/// resolves against `record`.
pub fn parse_locator(req: &Request, v: Option<&Value>, record: &Record) -> Result<Locator, Value> {
    let Some(obj) = v.and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "missing locator", None));
    };
    let Some(field) = obj.get("field").and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", "locator.field must be a string", None));
    };

    let locator = match obj.get("section").filter(|v| !v.is_null()) {
        None => match RecordField::parse(field) {
            Some(f) => Locator::TopLevel(f),
            None => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("unknown field: {}", field),
                    None,
                ))
            }
        },
        Some(section) => {
            let kind = parse_section_kind(req, Some(section))?;
            let index = parse_index(req, obj.get("index"))?;
            let Some(field) = SectionField::parse(kind, field) else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("unknown {} field: {}", kind.as_str(), field),
                    None,
                ));
            };
            Locator::Section { index, field }
        }
    };
    ensure_resolves(req, record, locator)?;
    Ok(locator)
}

pub fn parse_index(req: &Request, v: Option<&Value>) -> Result<usize, Value> {
    v.and_then(|v| v.as_u64())
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "index must be a non-negative integer",
                None,
            )
        })
}

pub fn ensure_resolves(req: &Request, record: &Record, locator: Locator) -> Result<(), Value> {
    let Locator::Section { index, field } = locator else {
        return Ok(());
    };
    let len = record.section_len(field.kind());
    if index >= len {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} section index {} out of range", field.kind().as_str(), index),
            Some(json!({ "index": index, "length": len })),
        ));
    }
    Ok(())
}

/// Validates a value for a constrained-choice field.
pub fn check_choice(req: &Request, locator: Locator, value: &str) -> Result<(), Value> {
    let Some(allowed) = locator.choices() else {
        return Ok(());
    };
    let folded = value.trim().to_ascii_lowercase();
    let folded = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    if allowed.contains(&folded.as_str()) {
        return Ok(());
    }
    Err(err(
        &req.id,
        "bad_params",
        format!(
            "{} must be one of: {}",
            locator.field_name(),
            allowed.join(", ")
        ),
        Some(json!({ "allowed": allowed, "value": value })),
    ))
}

/// Saves the open document if a workspace is selected. A failed save is
/// reported in the result; the in-memory record stays as it is.
pub fn persist(state: &AppState) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return json!({ "persisted": false });
    };
    match db::save_document(conn, &state.session.document_id, &state.session.record) {
        Ok(saved_at) => json!({ "persisted": true, "savedAt": saved_at }),
        Err(e) => {
            tracing::warn!(document = %state.session.document_id, "save failed: {e:#}");
            json!({ "persisted": false, "persistError": format!("{e:#}") })
        }
    }
}

/// Replaces the open record and autosaves.
pub fn commit(state: &mut AppState, record: Record) -> Value {
    state.session.record = record;
    persist(state)
}

/// Adds the persistence outcome fields to a result object.
pub fn with_persistence(mut result: Value, persisted: Value) -> Value {
    if let (Some(out), Value::Object(extra)) = (result.as_object_mut(), persisted) {
        out.extend(extra);
    }
    result
}

pub fn record_json(record: &Record) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AcademicField, UuidIds};

    fn request(params: Value) -> Request {
        Request {
            id: "h".into(),
            method: "test".into(),
            params,
        }
    }

    #[test]
    fn index_must_be_a_non_negative_integer() {
        let req = request(json!({}));
        assert_eq!(parse_index(&req, Some(&json!(2))), Ok(2));
        for bad in [json!(-1), json!(1.5), json!("0"), Value::Null] {
            let e = parse_index(&req, Some(&bad)).unwrap_err();
            assert_eq!(e["error"]["code"], json!("bad_params"), "{bad}");
        }
        assert!(parse_index(&req, None).is_err());
    }

    #[test]
    fn section_locators_must_resolve() {
        let req = request(json!({}));
        let record = Record::default().append_section(SectionKind::Academic, &mut UuidIds);
        assert!(ensure_resolves(&req, &record, Locator::academic(0, AcademicField::Score)).is_ok());
        let e = ensure_resolves(&req, &record, Locator::academic(1, AcademicField::Score))
            .unwrap_err();
        assert_eq!(e["error"]["details"], json!({ "index": 1, "length": 1 }));
        assert!(ensure_resolves(&req, &record, Locator::TopLevel(RecordField::Grade)).is_ok());
    }
}
