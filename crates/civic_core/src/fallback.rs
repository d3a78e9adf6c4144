//! Fallback Inference Adapter: single-shot structured extraction for
//! documents the rule sets cannot read.
//!
//! The text is chunked to the service's input budget and each chunk is sent
//! once. Every returned object is validated on its own; a bad object is
//! dropped and counted, while a transport failure, a timeout or an
//! unparseable body fails the whole document.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::FallbackSection;
use crate::error::PipelineError;
use crate::inference::{InferenceRequest, InferenceService, OllamaInference};
use crate::schema::RecordDraft;

/// Exact record shape requested from the inference service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FallbackRecord {
    /// Case or file number as printed, e.g. "23-ZONE-0087".
    pub case_number: Option<String>,
    /// Council district the case is in.
    pub district: Option<String>,
    /// Property address or subject location.
    pub location: Option<String>,
    /// Short description of the item.
    pub description: Option<String>,
    /// Person who made the motion.
    pub movant: Option<String>,
    /// Person who seconded the motion.
    pub second: Option<String>,
    /// Outcome as written, e.g. "Approved 7-2".
    pub vote_result: Option<String>,
    /// One of rezoning, ordinance, budget, other.
    pub category: Option<String>,
}

pub const RECORD_FIELDS: [&str; 8] = [
    "case_number",
    "district",
    "location",
    "description",
    "movant",
    "second",
    "vote_result",
    "category",
];

const INSTRUCTIONS: &str = "You extract voting records from city council minutes. \
Return a JSON array with one object per motion that was voted on. \
Use exactly the keys of the schema. Copy names and vote text as written; \
use null for anything the text does not state. Return [] if there are no votes.";

/// JSON Schema for the response: an array of [`FallbackRecord`].
pub fn response_schema() -> Value {
    let item = schemars::schema_for!(FallbackRecord);
    serde_json::json!({
        "type": "array",
        "items": item,
    })
}

#[derive(Debug, Default)]
pub struct FallbackOutput {
    pub drafts: Vec<RecordDraft>,
    /// Objects dropped by validation.
    pub rejected: usize,
}

pub struct FallbackAdapter {
    service: Option<Arc<dyn InferenceService>>,
    timeout: Duration,
    max_chunk_chars: usize,
    schema: Value,
}

impl FallbackAdapter {
    pub fn new(service: Arc<dyn InferenceService>, timeout: Duration, max_chunk_chars: usize) -> Self {
        Self {
            service: Some(service),
            timeout,
            max_chunk_chars: max_chunk_chars.max(1),
            schema: response_schema(),
        }
    }

    /// Adapter with no service; every call fails the document.
    pub fn disabled() -> Self {
        Self {
            service: None,
            timeout: Duration::ZERO,
            max_chunk_chars: 1,
            schema: response_schema(),
        }
    }

    pub fn from_config(section: &FallbackSection) -> Result<Self, PipelineError> {
        if !section.enabled {
            return Ok(Self::disabled());
        }
        let client = OllamaInference::new(&section.base_url, &section.model, section.timeout())?;
        Ok(Self::new(
            Arc::new(client),
            section.timeout(),
            section.max_chunk_chars,
        ))
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    pub fn infer(&self, document_id: &str, text: &str) -> Result<FallbackOutput, PipelineError> {
        let Some(service) = self.service.as_ref() else {
            return Err(PipelineError::FallbackTransportFailed(
                "fallback inference is disabled".into(),
            ));
        };

        let chunks = chunk_text(text, self.max_chunk_chars);
        tracing::info!(document_id, chunks = chunks.len(), "Running fallback inference");

        let mut output = FallbackOutput::default();
        for (n, chunk) in chunks.into_iter().enumerate() {
            let body = self.call_with_deadline(service, chunk)?;

            for (index, item) in parse_response(&body)?.into_iter().enumerate() {
                match validate_record(index, &item) {
                    Ok(draft) => output.drafts.push(draft),
                    Err(err) => {
                        tracing::warn!(document_id, chunk = n, error = %err, "Rejected fallback record");
                        output.rejected += 1;
                    }
                }
            }
        }
        Ok(output)
    }

    /// Run one service call on its own thread and stop waiting once the
    /// timeout passes, whether or not the service honours it. A call that
    /// overruns is abandoned and its late answer dropped.
    fn call_with_deadline(
        &self,
        service: &Arc<dyn InferenceService>,
        chunk: &str,
    ) -> Result<String, PipelineError> {
        let (tx, rx) = mpsc::channel();
        let service = Arc::clone(service);
        let text = chunk.to_string();
        let schema = self.schema.clone();
        let timeout = self.timeout;
        thread::Builder::new()
            .name("civic-fallback".into())
            .spawn(move || {
                let body = service.infer(&InferenceRequest {
                    text: &text,
                    schema: &schema,
                    instructions: INSTRUCTIONS,
                    timeout,
                });
                // The receiver is gone when the caller already gave up.
                let _ = tx.send(body);
            })
            .map_err(|e| PipelineError::FallbackTransportFailed(format!("inference thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(body) => Ok(body?),
            Err(RecvTimeoutError::Timeout) => Err(PipelineError::FallbackTransportFailed(format!(
                "no answer within the {}s timeout",
                timeout.as_secs_f64()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::FallbackTransportFailed(
                "inference call ended without an answer".into(),
            )),
        }
    }
}

/// Split on line boundaries so no chunk exceeds `max_chars` characters. A
/// single longer line is cut at a character boundary.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut last_break: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if count == max_chars {
            let cut = last_break.filter(|&b| b > start).unwrap_or(idx);
            chunks.push(&text[start..cut]);
            count = text[cut..idx].chars().count();
            start = cut;
            last_break = None;
        }
        count += 1;
        if ch == '\n' {
            last_break = Some(idx + 1);
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks.retain(|chunk| !chunk.trim().is_empty());
    chunks
}

fn strip_fences(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the service body into a list of candidate objects. Anything that
/// is not a JSON array (or an object wrapping exactly one array) is a
/// malformed response.
pub fn parse_response(body: &str) -> Result<Vec<Value>, PipelineError> {
    let cleaned = strip_fences(body);
    let parsed = serde_json::from_str::<Value>(cleaned).ok().or_else(|| {
        let open = cleaned.find('[')?;
        let close = cleaned.rfind(']')?;
        (open < close)
            .then(|| serde_json::from_str::<Value>(&cleaned[open..=close]).ok())
            .flatten()
    });

    match parsed {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Object(map)) => {
            let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => Ok(items),
                _ => Err(PipelineError::FallbackTransportFailed(
                    "inference response is an object without a single record array".into(),
                )),
            }
        }
        _ => Err(PipelineError::FallbackTransportFailed(
            "inference response is not a JSON array".into(),
        )),
    }
}

fn field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Check one object against the record shape: every key present, no extra
/// keys, every value a string or null, and at least one value set.
pub fn validate_record(index: usize, item: &Value) -> Result<RecordDraft, PipelineError> {
    let reject = |reason: String| PipelineError::SchemaValidationFailed { index, reason };

    let Value::Object(map) = item else {
        return Err(reject("not a JSON object".into()));
    };
    if let Some(extra) = map.keys().find(|k| !RECORD_FIELDS.contains(&k.as_str())) {
        return Err(reject(format!("unexpected field `{extra}`")));
    }
    if let Some(missing) = RECORD_FIELDS.iter().find(|k| !map.contains_key(**k)) {
        return Err(reject(format!("missing field `{missing}`")));
    }
    if let Some((key, _)) = map
        .iter()
        .find(|(_, v)| !matches!(v, Value::String(_) | Value::Null))
    {
        return Err(reject(format!("field `{key}` must be a string or null")));
    }

    let record = FallbackRecord {
        case_number: field(map, "case_number"),
        district: field(map, "district"),
        location: field(map, "location"),
        description: field(map, "description"),
        movant: field(map, "movant"),
        second: field(map, "second"),
        vote_result: field(map, "vote_result"),
        category: field(map, "category"),
    };
    if record == FallbackRecord::default() {
        return Err(reject("every field is empty".into()));
    }

    Ok(RecordDraft {
        case_number: record.case_number,
        district: record.district,
        location: record.location,
        description: record.description,
        movant: record.movant,
        second: record.second,
        vote_text: record.vote_result,
        category_hint: record.category,
        raw_text: serde_json::to_string(item)?,
        ..RecordDraft::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use std::sync::Mutex;

    struct CannedService {
        bodies: Mutex<Vec<Result<String, InferenceError>>>,
        calls: Mutex<usize>,
    }

    impl CannedService {
        fn new(bodies: Vec<Result<String, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies),
                calls: Mutex::new(0),
            })
        }
    }

    impl InferenceService for CannedService {
        fn infer(&self, _request: &InferenceRequest<'_>) -> Result<String, InferenceError> {
            *self.calls.lock().unwrap() += 1;
            let mut bodies = self.bodies.lock().unwrap();
            if bodies.is_empty() {
                Ok("[]".into())
            } else {
                bodies.remove(0)
            }
        }
    }

    fn record_json(movant: &str) -> String {
        format!(
            r#"{{"case_number":"24-117","district":"4","location":null,"description":"Rezone lot",
               "movant":"{movant}","second":"Robert Doe","vote_result":"Approved 7-0","category":null}}"#
        )
    }

    #[test]
    fn invalid_records_are_dropped_individually() {
        let body = format!(
            "```json\n[{}, {{\"case_number\": 12}}, {}, {{\"case_number\":null,\"district\":null,\"location\":null,\"description\":null,\"movant\":null,\"second\":null,\"vote_result\":null,\"category\":null,\"extra\":null}}]\n```",
            record_json("Jane Smith"),
            record_json("Ann Lee")
        );
        let service = CannedService::new(vec![Ok(body)]);
        let adapter = FallbackAdapter::new(service, Duration::from_secs(5), 10_000);
        let output = adapter.infer("doc-1", "some minutes").unwrap();
        assert_eq!(output.drafts.len(), 2);
        assert_eq!(output.rejected, 2);
        assert_eq!(output.drafts[0].movant.as_deref(), Some("Jane Smith"));
        assert_eq!(output.drafts[0].vote_text.as_deref(), Some("Approved 7-0"));
        assert!(output.drafts[1].raw_text.contains("Ann Lee"));
    }

    #[test]
    fn validation_reasons() {
        let full: Value = serde_json::from_str(&record_json("Jane Smith")).unwrap();
        assert!(validate_record(0, &full).is_ok());

        let mut extra = full.clone();
        extra["votes"] = Value::from(7);
        assert!(matches!(
            validate_record(1, &extra),
            Err(PipelineError::SchemaValidationFailed { index: 1, .. })
        ));

        let mut missing = full.clone();
        missing.as_object_mut().unwrap().remove("second");
        assert!(validate_record(2, &missing).is_err());

        let mut mistyped = full.clone();
        mistyped["district"] = Value::from(4);
        assert!(validate_record(3, &mistyped).is_err());

        assert!(validate_record(4, &Value::from("text")).is_err());
    }

    #[test]
    fn transport_failure_fails_the_document() {
        let service = CannedService::new(vec![Err(InferenceError::Timeout(5))]);
        let adapter = FallbackAdapter::new(service, Duration::from_secs(5), 10_000);
        let err = adapter.infer("doc-1", "minutes").unwrap_err();
        assert!(matches!(err, PipelineError::FallbackTransportFailed(_)));
    }

    #[test]
    fn malformed_body_fails_the_document() {
        let service = CannedService::new(vec![Ok("I could not find any votes.".into())]);
        let adapter = FallbackAdapter::new(service, Duration::from_secs(5), 10_000);
        assert!(matches!(
            adapter.infer("doc-1", "minutes"),
            Err(PipelineError::FallbackTransportFailed(_))
        ));
    }

    #[test]
    fn wrapped_array_is_accepted() {
        let items = parse_response(&format!("{{\"records\": [{}]}}", record_json("Ann Lee"))).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn one_call_per_chunk() {
        let service = CannedService::new(vec![]);
        let adapter = FallbackAdapter::new(service.clone(), Duration::from_secs(5), 10);
        let text = "line one\nline two\nline three\n";
        adapter.infer("doc-1", text).unwrap();
        assert_eq!(*service.calls.lock().unwrap(), chunk_text(text, 10).len());
    }

    #[test]
    fn chunks_respect_budget_and_lines() {
        let chunks = chunk_text("aaaa\nbbbb\ncccccccccccc\n", 6);
        assert!(chunks.iter().all(|c| c.chars().count() <= 6));
        assert_eq!(chunks[0], "aaaa\n");
        assert_eq!(chunks.concat().trim_end(), "aaaa\nbbbb\ncccccccccccc");
        assert!(chunk_text("   \n", 10).is_empty());
        assert_eq!(chunk_text("héllo wörld", 4).concat(), "héllo wörld");
    }

    #[test]
    fn disabled_adapter_reports_transport_failure() {
        let adapter = FallbackAdapter::disabled();
        assert!(!adapter.is_enabled());
        assert!(matches!(
            adapter.infer("doc-1", "minutes"),
            Err(PipelineError::FallbackTransportFailed(_))
        ));
    }

    #[test]
    fn schema_describes_an_array_of_records() {
        let schema = response_schema();
        assert_eq!(schema["type"], "array");
        let props = &schema["items"]["properties"];
        for key in RECORD_FIELDS {
            assert!(props.get(key).is_some(), "{key}");
        }
    }

    struct StalledService;

    impl InferenceService for StalledService {
        fn infer(&self, _request: &InferenceRequest<'_>) -> Result<String, InferenceError> {
            thread::sleep(Duration::from_secs(5));
            Ok("[]".into())
        }
    }

    #[test]
    fn service_ignoring_its_timeout_is_cut_off() {
        let adapter = FallbackAdapter::new(Arc::new(StalledService), Duration::from_millis(100), 10_000);
        let started = std::time::Instant::now();
        let err = adapter.infer("doc-1", "minutes").unwrap_err();
        assert!(matches!(err, PipelineError::FallbackTransportFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
