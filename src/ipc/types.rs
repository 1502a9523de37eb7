use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::record::{Locator, Record};
use crate::suggest::{SuggestError, TextService};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The open document: its identifier in the document map and its record.
#[derive(Debug, Clone)]
pub struct Session {
    pub document_id: String,
    pub record: Record,
}

impl Session {
    pub fn blank() -> Self {
        Self {
            document_id: uuid::Uuid::new_v4().to_string(),
            record: Record::default(),
        }
    }
}

/// A finished AI call, delivered back to the request loop.
#[derive(Debug)]
pub struct AiCompletion {
    pub id: String,
    pub document_id: String,
    pub locator: Locator,
    pub apply: bool,
    pub outcome: Result<String, SuggestError>,
}

/// Everything the request loop reacts to, in arrival order.
#[derive(Debug)]
pub enum Event {
    Line(String),
    InputClosed,
    AiDone(AiCompletion),
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Session,
    /// Replaces the HTTP backend when set.
    pub text_service: Option<Arc<dyn TextService>>,
    /// Where AI workers post their completions.
    pub events: Sender<Event>,
    pub ai_in_flight: usize,
}

impl AppState {
    pub fn new(events: Sender<Event>) -> Self {
        Self {
            workspace: None,
            db: None,
            session: Session::blank(),
            text_service: None,
            events,
            ai_in_flight: 0,
        }
    }
}
