use crate::config::{self, AiSettings};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Ai,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Ai => AiSettings::SETUP_KEY,
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Ai => {
            serde_json::to_value(AiSettings::default()).unwrap_or_else(|_| json!({}))
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Ai => config::merge_ai_field(obj, k, v)?,
        }
    }
    Ok(())
}

/// Stored values over defaults, field by field; the same view the AI
/// client resolves its settings from.
fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    match section {
        SetupSection::Ai => Ok(serde_json::to_value(AiSettings::load(conn)?)?),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let section = match req.params.get("section").and_then(|v| v.as_str()) {
        None => None,
        Some(raw) => match SetupSection::parse(raw) {
            Some(s) => Some(s),
            None => return err(&req.id, "bad_params", "unknown section", None),
        },
    };
    // Without a workspace there is nothing saved; report the defaults.
    let ai = match state.db.as_ref() {
        Some(conn) => match load_section(conn, SetupSection::Ai) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        None => default_section(SetupSection::Ai),
    };
    match section {
        Some(SetupSection::Ai) => ok(&req.id, ai),
        None => ok(
            &req.id,
            json!({
                "ai": ai,
                "aiKeyPresent": AiSettings::api_key().is_some(),
            }),
        ),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::kv_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section_raw, "setup updated");
    ok(&req.id, json!({ "ok": true, "section": section_raw, "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
