//! Separates a free-form answer from an embedded chart payload in raw model output.

use crate::model::ChartData;
use serde_json::{Map, Value};

/// Answer used when the payload carries a chart but no text.
pub const DEFAULT_ANSWER: &str = "Análise realizada:";

/// Result of interpreting one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// Text shown to the operator.
    pub answer_text: String,
    /// Chart to render next to the answer, if any.
    pub chart_data: Option<ChartData>,
}

impl Interpretation {
    fn plain(raw: &str) -> Self {
        Self {
            answer_text: raw.to_string(),
            chart_data: None,
        }
    }
}

/// Interpret `raw`, falling back to the whole text as the answer whenever no usable
/// structured payload is found. Never fails.
pub fn interpret(raw: &str) -> Interpretation {
    let Some(candidate) = json_candidate(raw) else {
        return Interpretation::plain(raw);
    };

    let payload = match serde_json::from_str::<Value>(&strip_code_fences(candidate)) {
        Ok(Value::Object(payload)) => payload,
        Ok(_) => return Interpretation::plain(raw),
        Err(error) => {
            tracing::warn!(error = %error, "Found JSON-like block but failed to parse it");
            return Interpretation::plain(raw);
        }
    };

    let message = text_field(&payload, "message");
    let answer = text_field(&payload, "answer");
    let chart = payload.get("chart").filter(|value| !value.is_null());
    if message.is_none() && answer.is_none() && chart.is_none() {
        return Interpretation::plain(raw);
    }

    Interpretation {
        answer_text: message.or(answer).unwrap_or(DEFAULT_ANSWER).to_string(),
        chart_data: chart.cloned().map(ChartData::new),
    }
}

/// Span from the first `{` to the last `}`, inclusive.
fn json_candidate(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Remove "```json" and "```" markers along with the whitespace that follows each.
fn strip_code_fences(candidate: &str) -> String {
    let mut cleaned = String::with_capacity(candidate.len());
    let mut rest = candidate;
    while let Some(index) = rest.find("```") {
        cleaned.push_str(&rest[..index]);
        rest = &rest[index + 3..];
        rest = rest.strip_prefix("json").unwrap_or(rest);
        rest = rest.trim_start();
    }
    cleaned.push_str(rest);
    cleaned
}

fn text_field<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}
