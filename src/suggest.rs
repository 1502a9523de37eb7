use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::AiSettings;
use crate::image::InlineImage;
use crate::record::{AcademicField, Locator, Record, RecordField, SectionField};

/// Reply the service is asked to give when it has nothing to offer.
pub const NOT_FOUND: &str = "Not found";

#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("{0}")]
    MissingInput(String),
    #[error("AI service unavailable: {0}")]
    Unavailable(String),
    #[error("AI request failed: {0}")]
    Request(String),
}

impl SuggestError {
    pub fn code(&self) -> &'static str {
        match self {
            SuggestError::MissingInput(_) => "precondition_failed",
            SuggestError::Unavailable(_) => "ai_unavailable",
            SuggestError::Request(_) => "ai_request_failed",
        }
    }
}

/// A generative-text backend. Calls run on worker threads.
pub trait TextService: Send + Sync {
    fn generate(&self, prompt: &str, image: Option<&InlineImage>) -> Result<String, SuggestError>;
}

/// Trims the reply and drops the "not found" sentinel. `None` means there is
/// no usable value.
pub fn interpret(raw: &str) -> Option<String> {
    let text = raw.trim();
    let bare = text.trim_end_matches('.').trim();
    if bare.is_empty() || bare.eq_ignore_ascii_case(NOT_FOUND) {
        return None;
    }
    Some(text.to_string())
}

fn or_unknown(v: &str) -> &str {
    if v.trim().is_empty() {
        "not provided"
    } else {
        v.trim()
    }
}

fn student_context(record: &Record) -> String {
    format!(
        "Student: {}\nGrade: {}\nDisability category: {}\n",
        if record.student_name.trim().is_empty() {
            "the student"
        } else {
            record.student_name.trim()
        },
        or_unknown(&record.grade),
        or_unknown(&record.disabilities),
    )
}

fn section_context(record: &Record, locator: Locator) -> String {
    match locator {
        Locator::Section {
            index,
            field: SectionField::Academic(_),
        } => match record.academic_sections.get(index) {
            Some(s) => format!(
                "Subject: {}\nAssessment: {}\nScore: {}\nGrade-level expectation: {}\nPerformance is {} grade level\nArea(s) of need: {}\n",
                or_unknown(&s.subject),
                or_unknown(&s.assessment),
                or_unknown(&s.score),
                or_unknown(&s.benchmark),
                s.comparison.as_str(),
                or_unknown(&s.deficit),
            ),
            None => String::new(),
        },
        Locator::Section {
            index,
            field: SectionField::Summary(_),
        } => match record.summary_sections.get(index) {
            Some(s) => format!(
                "Goal area: {}\nGoal status: {}\n",
                or_unknown(&s.area),
                s.status.as_str()
            ),
            None => String::new(),
        },
        Locator::TopLevel(_) => String::new(),
    }
}

/// Checks that the record holds what a suggestion for `locator` needs.
pub fn check_preconditions(record: &Record, locator: Locator) -> Result<(), SuggestError> {
    if locator.choices().is_some() {
        return Err(SuggestError::MissingInput(format!(
            "{} is chosen from a list; suggestions are only offered for text fields",
            locator.label()
        )));
    }
    match locator {
        Locator::TopLevel(RecordField::StudentName) => Err(SuggestError::MissingInput(
            "the student name must be entered by hand".into(),
        )),
        Locator::Section {
            index,
            field: SectionField::Academic(AcademicField::Impact),
        } => {
            let deficit = record
                .academic_sections
                .get(index)
                .map(|s| s.deficit.trim())
                .unwrap_or("");
            if deficit.is_empty() {
                return Err(SuggestError::MissingInput(
                    "enter the area(s) of need for this subject before requesting an impact statement"
                        .into(),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn suggestion_prompt(record: &Record, locator: Locator) -> Result<String, SuggestError> {
    check_preconditions(record, locator)?;
    let task = match locator {
        Locator::Section {
            field: SectionField::Academic(AcademicField::Impact),
            ..
        } => "Write one or two sentences describing how the student's disability affects involvement and progress in the general education curriculum, based on the area(s) of need.".to_string(),
        _ => format!(
            "Write a short phrase or sentence for the \"{}\" part of the report.",
            locator.label()
        ),
    };
    Ok(format!(
        "You help a special-education teacher draft a PLAAFP (Present Levels of Academic Achievement and Functional Performance) statement.\n\
         {}{}\n{}\nUse objective, parent-friendly language. Reply with the text only. If there is not enough information, reply exactly \"{}\".",
        student_context(record),
        section_context(record, locator),
        task,
        NOT_FOUND
    ))
}

pub fn extraction_prompt(record: &Record, locator: Locator) -> String {
    format!(
        "The attached image is a screenshot of student data (a score report, progress monitoring chart, or gradebook).\n\
         {}{}\nExtract the value for \"{}\". Reply with the value only. If it is not present in the image, reply exactly \"{}\".",
        student_context(record),
        section_context(record, locator),
        locator.label(),
        NOT_FOUND
    )
}

/// `generateContent`-style HTTP backend.
pub struct HttpTextService {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl HttpTextService {
    pub fn from_settings(settings: &AiSettings) -> Result<Self, SuggestError> {
        if !settings.enabled {
            return Err(SuggestError::Unavailable(
                "AI suggestions are turned off in setup".into(),
            ));
        }
        let api_key = AiSettings::api_key().ok_or_else(|| {
            SuggestError::Unavailable(format!("set {} to enable AI suggestions", crate::config::API_KEY_ENV))
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms.max(1000)))
            .build()
            .map_err(|e| SuggestError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        })
    }
}

impl TextService for HttpTextService {
    fn generate(&self, prompt: &str, image: Option<&InlineImage>) -> Result<String, SuggestError> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(img) = image {
            parts.push(json!({
                "inline_data": { "mime_type": img.mime_type, "data": img.to_base64() }
            }));
        }
        let body = json!({ "contents": [{ "role": "user", "parts": parts }] });
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        tracing::info!(model = %self.model, with_image = image.is_some(), "requesting AI text");
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| SuggestError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().unwrap_or_default();
            return Err(SuggestError::Request(format!(
                "service answered {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }
        let parsed: GenerateResponse = resp
            .json()
            .map_err(|e| SuggestError::Request(format!("unreadable service response: {e}")))?;
        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }
}
