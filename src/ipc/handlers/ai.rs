use std::sync::Arc;

use crate::config::AiSettings;
use crate::image::{self, InlineImage};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{commit, parse_locator, record_json, required_str, with_persistence};
use crate::ipc::types::{AiCompletion, AppState, Event, Request};
use crate::record::Locator;
use crate::suggest::{self, HttpTextService, SuggestError, TextService};
use serde_json::json;

/// How an AI request was answered: right away (validation failures) or
/// later through an `AiDone` event.
pub enum Dispatch {
    Reply(serde_json::Value),
    Pending,
}

struct Job {
    locator: Locator,
    apply: bool,
    prompt: String,
    image: Option<InlineImage>,
}

fn service(state: &AppState) -> Result<Arc<dyn TextService>, SuggestError> {
    if let Some(service) = state.text_service.as_ref() {
        return Ok(Arc::clone(service));
    }
    let settings = AiSettings::resolve(state.db.as_ref());
    Ok(Arc::new(HttpTextService::from_settings(&settings)?))
}

fn suggest_err(id: &str, locator: Locator, e: SuggestError) -> serde_json::Value {
    tracing::warn!(field = locator.field_name(), code = e.code(), "AI call failed: {e}");
    err(
        id,
        e.code(),
        e.to_string(),
        Some(json!({ "locator": locator.to_json() })),
    )
}

fn apply_flag(req: &Request) -> bool {
    req.params
        .get("apply")
        .and_then(|v| v.as_bool())
        .unwrap_or(true)
}

/// Hands the call to a worker thread. The loop keeps serving requests; the
/// reply goes out when the completion event is handled.
fn start(state: &mut AppState, req: &Request, job: Job) -> Dispatch {
    let service = match service(state) {
        Ok(s) => s,
        Err(e) => return Dispatch::Reply(suggest_err(&req.id, job.locator, e)),
    };
    let id = req.id.clone();
    let document_id = state.session.document_id.clone();
    let events = state.events.clone();
    let spawned = std::thread::Builder::new()
        .name("plaafpd-ai".into())
        .spawn(move || {
            let outcome = service.generate(&job.prompt, job.image.as_ref());
            let _ = events.send(Event::AiDone(AiCompletion {
                id,
                document_id,
                locator: job.locator,
                apply: job.apply,
                outcome,
            }));
        });
    if let Err(e) = spawned {
        return Dispatch::Reply(suggest_err(
            &req.id,
            job.locator,
            SuggestError::Unavailable(format!("could not start AI worker: {e}")),
        ));
    }
    state.ai_in_flight += 1;
    Dispatch::Pending
}

/// Answers a finished AI call against the session as it is now.
pub fn complete(state: &mut AppState, done: AiCompletion) -> serde_json::Value {
    state.ai_in_flight = state.ai_in_flight.saturating_sub(1);
    let raw = match done.outcome {
        Ok(v) => v,
        Err(e) => return suggest_err(&done.id, done.locator, e),
    };
    // A result for a document that is no longer open is only reported.
    let same_document = done.document_id == state.session.document_id;
    finish(state, &done.id, done.locator, raw, done.apply && same_document)
}

/// Routes service text into the record the same way a form edit does.
fn finish(
    state: &mut AppState,
    id: &str,
    locator: Locator,
    raw: String,
    apply: bool,
) -> serde_json::Value {
    let Some(text) = suggest::interpret(&raw) else {
        return ok(
            id,
            json!({
                "locator": locator.to_json(),
                "suggestion": null,
                "applied": false,
                "message": format!("No {} was found.", locator.label()),
                "record": record_json(&state.session.record),
            }),
        );
    };

    // The section may have gone away while the call was in flight.
    if !apply || state.session.record.value(locator).is_none() {
        return ok(
            id,
            json!({
                "locator": locator.to_json(),
                "suggestion": text,
                "applied": false,
                "record": record_json(&state.session.record),
            }),
        );
    }

    let next = state.session.record.with_value(locator, text.clone());
    let persisted = commit(state, next);
    ok(
        id,
        with_persistence(
            json!({
                "locator": locator.to_json(),
                "suggestion": text,
                "applied": true,
                "record": record_json(&state.session.record),
            }),
            persisted,
        ),
    )
}

fn handle_suggest(state: &mut AppState, req: &Request) -> Dispatch {
    let locator = match parse_locator(req, req.params.get("locator"), &state.session.record) {
        Ok(v) => v,
        Err(e) => return Dispatch::Reply(e),
    };
    let prompt = match suggest::suggestion_prompt(&state.session.record, locator) {
        Ok(v) => v,
        Err(e) => return Dispatch::Reply(suggest_err(&req.id, locator, e)),
    };
    let job = Job {
        locator,
        apply: apply_flag(req),
        prompt,
        image: None,
    };
    start(state, req, job)
}

fn handle_extract_image(state: &mut AppState, req: &Request) -> Dispatch {
    let locator = match parse_locator(req, req.params.get("locator"), &state.session.record) {
        Ok(v) => v,
        Err(e) => return Dispatch::Reply(e),
    };
    if locator.choices().is_some() {
        return Dispatch::Reply(err(
            &req.id,
            "bad_params",
            format!("{} is chosen from a list and cannot be extracted", locator.label()),
            None,
        ));
    }
    let data_url = match required_str(req, "dataUrl") {
        Ok(v) => v,
        Err(e) => return Dispatch::Reply(e),
    };
    let img = match image::parse_data_url(&data_url) {
        Ok(v) => v,
        Err(e) => return Dispatch::Reply(err(&req.id, "bad_image", e.to_string(), None)),
    };

    let job = Job {
        locator,
        apply: apply_flag(req),
        prompt: suggest::extraction_prompt(&state.session.record, locator),
        image: Some(img),
    };
    start(state, req, job)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Dispatch> {
    match req.method.as_str() {
        "ai.suggest" => Some(handle_suggest(state, req)),
        "ai.extractImage" => Some(handle_extract_image(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AcademicField, RecordField, SectionKind, UuidIds};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::Mutex;
    use std::time::Duration;

    type Calls = Arc<Mutex<Vec<(String, Option<String>)>>>;

    struct Scripted {
        reply: Result<String, String>,
        calls: Calls,
    }

    impl TextService for Scripted {
        fn generate(&self, prompt: &str, image: Option<&InlineImage>) -> Result<String, SuggestError> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), image.map(|i| i.mime_type.clone())));
            self.reply.clone().map_err(SuggestError::Request)
        }
    }

    /// Answers only once the test releases it.
    struct Gated {
        release: Mutex<Receiver<()>>,
        reply: String,
    }

    impl TextService for Gated {
        fn generate(&self, _prompt: &str, _image: Option<&InlineImage>) -> Result<String, SuggestError> {
            let _ = self.release.lock().unwrap().recv();
            Ok(self.reply.clone())
        }
    }

    fn state_with(reply: Result<&str, &str>) -> (AppState, Receiver<Event>, Calls) {
        let (tx, rx) = mpsc::channel();
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let mut state = AppState::new(tx);
        state.text_service = Some(Arc::new(Scripted {
            reply: reply.map(str::to_string).map_err(str::to_string),
            calls: calls.clone(),
        }));
        (state, rx, calls)
    }

    fn request(method: &str, params: serde_json::Value) -> Request {
        Request {
            id: "t".into(),
            method: method.into(),
            params,
        }
    }

    fn next_completion(rx: &Receiver<Event>) -> AiCompletion {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Event::AiDone(done)) => done,
            other => panic!("expected an AI completion, got {other:?}"),
        }
    }

    fn settle(state: &mut AppState, rx: &Receiver<Event>, dispatch: Dispatch) -> serde_json::Value {
        match dispatch {
            Dispatch::Reply(v) => v,
            Dispatch::Pending => {
                let done = next_completion(rx);
                complete(state, done)
            }
        }
    }

    #[test]
    fn suggestion_is_trimmed_and_applied() {
        let (mut state, rx, calls) = state_with(Ok("  enjoys graphic novels \n"));
        let dispatch = handle_suggest(
            &mut state,
            &request("ai.suggest", json!({ "locator": { "field": "strengths" } })),
        );
        let resp = settle(&mut state, &rx, dispatch);
        assert_eq!(resp["ok"], json!(true));
        assert_eq!(resp["id"], json!("t"));
        assert_eq!(resp["result"]["applied"], json!(true));
        assert_eq!(state.session.record.strengths, "enjoys graphic novels");
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(state.ai_in_flight, 0);
    }

    #[test]
    fn sentinel_leaves_record_unchanged() {
        let (mut state, rx, _) = state_with(Ok("Not found."));
        state.session.record = state.session.record.set_field(RecordField::Grade, "4th");
        let before = state.session.record.clone();
        let dispatch = handle_suggest(
            &mut state,
            &request("ai.suggest", json!({ "locator": { "field": "grade" } })),
        );
        let resp = settle(&mut state, &rx, dispatch);
        assert_eq!(resp["result"]["applied"], json!(false));
        assert_eq!(resp["result"]["suggestion"], json!(null));
        assert_eq!(state.session.record, before);
    }

    #[test]
    fn impact_without_deficit_never_calls_the_service() {
        let (mut state, _rx, calls) = state_with(Ok("anything"));
        state.session.record = state
            .session
            .record
            .append_section(SectionKind::Academic, &mut UuidIds);
        let dispatch = handle_suggest(
            &mut state,
            &request(
                "ai.suggest",
                json!({ "locator": { "field": "impact", "section": "academic", "index": 0 } }),
            ),
        );
        let Dispatch::Reply(resp) = dispatch else {
            panic!("precondition failure must be answered immediately");
        };
        assert_eq!(resp["error"]["code"], json!("precondition_failed"));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(state.session.record.academic_sections[0].impact, "");
        assert_eq!(state.ai_in_flight, 0);
    }

    #[test]
    fn service_failure_is_reported_and_record_kept() {
        let (mut state, rx, _) = state_with(Err("timeout"));
        let before = state.session.record.clone();
        let dispatch = handle_suggest(
            &mut state,
            &request("ai.suggest", json!({ "locator": { "field": "behavior" } })),
        );
        let resp = settle(&mut state, &rx, dispatch);
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["error"]["code"], json!("ai_request_failed"));
        assert_eq!(state.session.record, before);
    }

    #[test]
    fn apply_false_returns_text_only() {
        let (mut state, rx, _) = state_with(Ok("uses AAC device"));
        let dispatch = handle_suggest(
            &mut state,
            &request(
                "ai.suggest",
                json!({ "locator": { "field": "communication" }, "apply": false }),
            ),
        );
        let resp = settle(&mut state, &rx, dispatch);
        assert_eq!(resp["result"]["suggestion"], json!("uses AAC device"));
        assert_eq!(state.session.record.communication, "");
    }

    #[test]
    fn slow_call_does_not_hold_up_edits_and_lands_on_the_current_record() {
        let (tx, rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut state = AppState::new(tx);
        state.text_service = Some(Arc::new(Gated {
            release: Mutex::new(release_rx),
            reply: "participates in group work".into(),
        }));

        let dispatch = handle_suggest(
            &mut state,
            &request("ai.suggest", json!({ "locator": { "field": "behavior" } })),
        );
        assert!(matches!(dispatch, Dispatch::Pending));
        assert_eq!(state.ai_in_flight, 1);

        // Edits made while the call is out are kept alongside its result.
        state.session.record = state.session.record.set_field(RecordField::Grade, "5th");
        assert!(rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        let resp = complete(&mut state, next_completion(&rx));
        assert_eq!(resp["result"]["applied"], json!(true));
        assert_eq!(state.session.record.grade, "5th");
        assert_eq!(state.session.record.behavior, "participates in group work");
        assert_eq!(state.ai_in_flight, 0);
    }

    #[test]
    fn result_for_a_closed_document_is_not_applied() {
        let (mut state, rx, _) = state_with(Ok("likes soccer"));
        let dispatch = handle_suggest(
            &mut state,
            &request("ai.suggest", json!({ "locator": { "field": "strengths" } })),
        );
        assert!(matches!(dispatch, Dispatch::Pending));
        let done = next_completion(&rx);
        state.session = crate::ipc::types::Session::blank();

        let resp = complete(&mut state, done);
        assert_eq!(resp["result"]["applied"], json!(false));
        assert_eq!(resp["result"]["suggestion"], json!("likes soccer"));
        assert_eq!(state.session.record.strengths, "");
    }

    #[test]
    fn extraction_decodes_image_and_writes_section_field() {
        let (mut state, rx, calls) = state_with(Ok("87%"));
        state.session.record = state
            .session
            .record
            .append_section(SectionKind::Academic, &mut UuidIds);
        let dispatch = handle_extract_image(
            &mut state,
            &request(
                "ai.extractImage",
                json!({
                    "locator": { "field": "score", "section": "academic", "index": 0 },
                    "dataUrl": "data:image/png;base64,iVBORw0KGgo=",
                }),
            ),
        );
        let resp = settle(&mut state, &rx, dispatch);
        assert_eq!(resp["result"]["applied"], json!(true));
        assert_eq!(
            state
                .session
                .record
                .value(Locator::academic(0, AcademicField::Score)),
            Some("87%")
        );
        assert_eq!(calls.lock().unwrap()[0].1.as_deref(), Some("image/png"));
    }

    #[test]
    fn extraction_rejects_bad_images_and_stale_indexes() {
        let (mut state, rx, calls) = state_with(Ok("x"));
        let dispatch = handle_extract_image(
            &mut state,
            &request(
                "ai.extractImage",
                json!({ "locator": { "field": "grade" }, "dataUrl": "data:text/plain;base64,aGk=" }),
            ),
        );
        let bad_image = settle(&mut state, &rx, dispatch);
        assert_eq!(bad_image["error"]["code"], json!("bad_image"));

        let dispatch = handle_extract_image(
            &mut state,
            &request(
                "ai.extractImage",
                json!({
                    "locator": { "field": "score", "section": "academic", "index": 2 },
                    "dataUrl": "data:image/png;base64,iVBORw0KGgo=",
                }),
            ),
        );
        let stale = settle(&mut state, &rx, dispatch);
        assert_eq!(stale["error"]["code"], json!("bad_params"));
        assert!(calls.lock().unwrap().is_empty());
    }
}
