use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::db;

pub const API_KEY_ENV: &str = "PLAAFPD_AI_API_KEY";
pub const ENDPOINT_ENV: &str = "PLAAFPD_AI_ENDPOINT";
pub const MODEL_ENV: &str = "PLAAFPD_AI_MODEL";

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Stored under `setup.ai`. The API key is never stored; it only comes from
/// the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl AiSettings {
    pub const SETUP_KEY: &'static str = "setup.ai";

    /// Defaults with each valid stored field applied. A field that fails
    /// validation keeps its default; the others still apply.
    pub fn from_stored(saved: Option<&Value>) -> Self {
        let mut value = serde_json::to_value(Self::default()).unwrap_or_else(|_| json!({}));
        let saved = saved.and_then(Value::as_object);
        if let (Some(obj), Some(saved)) = (value.as_object_mut(), saved) {
            for (key, v) in saved {
                if let Err(e) = merge_ai_field(obj, key, v) {
                    tracing::warn!("ignoring stored {}: {e}", Self::SETUP_KEY);
                }
            }
        }
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(Self::from_stored(db::kv_get_json(conn, Self::SETUP_KEY)?.as_ref()))
    }

    /// Defaults, then stored settings (if a workspace is open), then
    /// environment overrides.
    pub fn resolve(conn: Option<&Connection>) -> Self {
        let mut settings = match conn.map(Self::load) {
            Some(Ok(s)) => s,
            Some(Err(e)) => {
                tracing::warn!("ignoring unreadable {}: {e:#}", Self::SETUP_KEY);
                Self::default()
            }
            None => Self::default(),
        };
        if let Some(v) = env_non_empty(ENDPOINT_ENV) {
            settings.endpoint = v;
        }
        if let Some(v) = env_non_empty(MODEL_ENV) {
            settings.model = v;
        }
        settings
    }

    pub fn api_key() -> Option<String> {
        env_non_empty(API_KEY_ENV)
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Validates one `setup.ai` field and writes it into `obj`.
pub fn merge_ai_field(obj: &mut Map<String, Value>, key: &str, v: &Value) -> Result<(), String> {
    let value = match key {
        "enabled" => Value::Bool(parse_bool(v, key)?),
        "endpoint" => {
            let s = parse_string_max(v, key, 300)?;
            if !s.starts_with("https://") && !s.starts_with("http://") {
                return Err("endpoint must be an http(s) URL".into());
            }
            Value::String(s)
        }
        "model" => {
            let s = parse_string_max(v, key, 100)?;
            if s.is_empty() || s.contains('/') {
                return Err("model must be a non-empty model name".into());
            }
            Value::String(s)
        }
        "timeoutMs" => Value::from(parse_i64_range(v, key, 1000, 120_000)?),
        _ => return Err(format!("unknown ai field: {}", key)),
    };
    obj.insert(key.to_string(), value);
    Ok(())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
