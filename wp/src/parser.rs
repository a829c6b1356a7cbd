//! Oracle reply parsing
//!
//! Every tolerance for malformed oracle output lives here. The parser never
//! fails: anything it cannot decode becomes a [`PlanningDecision::ParseFailure`]
//! or a fallback [`ErrorDiagnosis`].

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Synthetic entry used when the oracle asks for detail without naming any
pub const DEFAULT_MISSING_DETAIL: &str = "the task needs more details";

/// Fallback problem text when a diagnosis cannot be decoded
pub const FALLBACK_PROBLEM: &str = "Unknown error";

/// Fallback clarifying question when a diagnosis cannot be decoded
pub const FALLBACK_QUESTION: &str = "What additional information do you want to provide?";

/// Structured outcome of one planning round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningDecision {
    /// The oracle produced a plan (never empty)
    Complete { plan: String },
    /// The oracle needs more detail (never empty)
    NeedsDetail { missing: Vec<String> },
    /// The reply could not be decoded, or the call itself failed
    ParseFailure { raw_text: String, diagnostic: String },
}

impl PlanningDecision {
    /// Build a parse failure
    pub fn failure(raw_text: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::ParseFailure {
            raw_text: raw_text.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Complete { .. } => "complete",
            Self::NeedsDetail { .. } => "needs_detail",
            Self::ParseFailure { .. } => "parse_failure",
        }
    }
}

/// Explanation of an execution failure plus the question to put to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDiagnosis {
    pub problem: String,
    pub clarifying_question: String,
}

impl ErrorDiagnosis {
    pub fn new(problem: impl Into<String>, clarifying_question: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            clarifying_question: clarifying_question.into(),
        }
    }

    /// The diagnosis used whenever the oracle cannot be understood
    pub fn fallback() -> Self {
        Self::new(FALLBACK_PROBLEM, FALLBACK_QUESTION)
    }
}

impl Default for ErrorDiagnosis {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Remove a surrounding markdown code fence
///
/// The opening fence may carry a language tag (```` ```json ````). The closing
/// fence is only removed when it is the last line. Unfenced text is returned
/// trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text;
    }

    // Drop the opening fence line
    let body = match text.find('\n') {
        Some(idx) => &text[idx + 1..],
        None => return "",
    };

    // Drop the closing fence line if present
    let trimmed = body.trim_end();
    let body = match trimmed.rfind('\n') {
        Some(idx) if trimmed[idx + 1..].trim() == "```" => &trimmed[..idx],
        None if trimmed.trim() == "```" => "",
        _ => trimmed,
    };

    body.trim()
}

/// Decode a planning reply
pub fn parse(raw: &str) -> PlanningDecision {
    debug!(raw_len = raw.len(), "parse: called");
    let cleaned = strip_code_fences(raw);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "parse: reply is not valid JSON");
            return PlanningDecision::failure(raw, format!("invalid JSON: {}", e));
        }
    };

    let Some(object) = value.as_object() else {
        return PlanningDecision::failure(raw, "expected a JSON object");
    };

    let complete = match object.get("complete") {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return PlanningDecision::failure(raw, format!("field `complete` must be a boolean, got {}", type_name(other)));
        }
        None => return PlanningDecision::failure(raw, "missing field `complete`"),
    };

    if complete {
        return match object.get("plan") {
            Some(Value::String(plan)) if !plan.trim().is_empty() => {
                debug!(plan_len = plan.len(), "parse: complete");
                PlanningDecision::Complete { plan: plan.clone() }
            }
            Some(Value::String(_)) => PlanningDecision::failure(raw, "`complete` is true but `plan` is empty"),
            Some(other) => {
                PlanningDecision::failure(raw, format!("field `plan` must be a string, got {}", type_name(other)))
            }
            None => PlanningDecision::failure(raw, "`complete` is true but `plan` is missing"),
        };
    }

    let missing = match object.get("missing") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut missing = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => missing.push(s.clone()),
                    other => {
                        return PlanningDecision::failure(
                            raw,
                            format!("entries of `missing` must be strings, got {}", type_name(other)),
                        );
                    }
                }
            }
            missing
        }
        Some(other) => {
            return PlanningDecision::failure(raw, format!("field `missing` must be a list, got {}", type_name(other)));
        }
    };

    if missing.is_empty() {
        debug!("parse: no missing details named, using default entry");
        return PlanningDecision::NeedsDetail {
            missing: vec![DEFAULT_MISSING_DETAIL.to_string()],
        };
    }

    debug!(count = missing.len(), "parse: needs detail");
    PlanningDecision::NeedsDetail { missing }
}

#[derive(Debug, Deserialize)]
struct RawDiagnosis {
    problem: Option<Value>,
    question: Option<Value>,
}

/// Decode a diagnosis reply, substituting defaults field by field
pub fn parse_diagnosis(raw: &str) -> ErrorDiagnosis {
    debug!(raw_len = raw.len(), "parse_diagnosis: called");
    let cleaned = strip_code_fences(raw);

    let parsed: RawDiagnosis = match serde_json::from_str(cleaned) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "parse_diagnosis: falling back to default diagnosis");
            return ErrorDiagnosis::fallback();
        }
    };

    let field = |value: Option<Value>, default: &str| match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => default.to_string(),
    };

    ErrorDiagnosis {
        problem: field(parsed.problem, FALLBACK_PROBLEM),
        clarifying_question: field(parsed.question, FALLBACK_QUESTION),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
