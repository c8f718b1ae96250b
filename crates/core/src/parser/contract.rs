//! JSON-contract parsing for the four output modes (§4.3).

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use super::tool_calls::extract_fenced_block;
use crate::error::{Error, Result};
use crate::model::FinishReason;

/// Step cap for [`locate`]'s worklist, mirroring the per-tool-call recovery cap
/// in `tool_calls::recover_nested` (§9: "a fixed step cap (80)").
const SEARCH_STEP_CAP: usize = 80;

/// Expansion priority for [`locate`]: a node's own `tool_calls`/`output_text`/
/// `text`/`content` win immediately; otherwise these keys (and, last, any
/// other string-valued field) are queued for further search in this order.
const EXPANSION_ORDER: &[&str] = &["tool_calls", "response", "message", "content", "output_text", "text"];

/// Parse `text` as a JSON object, returning `None` for anything else (including
/// a bare JSON array, number, or string).
fn try_parse_object(text: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    value.is_object().then_some(value)
}

/// `text` mode's soft extraction: the full trimmed stdout must parse as a JSON
/// object carrying at least one recognized contract field.
pub(crate) fn soft_extract(stdout: &str) -> Option<Value> {
    let value = try_parse_object(stdout)?;
    has_contract_signal(&value).then_some(value)
}

/// `text_contract_final_line` mode: parse only the last non-empty line.
pub(crate) fn final_line_extract(stdout: &str) -> Option<Value> {
    let last_line = stdout.lines().rev().find(|line| !line.trim().is_empty())?;
    try_parse_object(last_line)
}

/// `json_contract` mode: hard parse. Try the whole trimmed stdout first, then
/// scan lines bottom-up for the first line that parses as a JSON object.
/// Empty stdout is always a parse error.
pub(crate) fn hard_parse(stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(Error::ParseError("provider produced no output".into()));
    }

    if let Some(value) = try_parse_object(trimmed) {
        return Ok(value);
    }

    trimmed
        .lines()
        .rev()
        .find_map(try_parse_object)
        .ok_or_else(|| Error::ParseError("no JSON object found in provider output".into()))
}

fn has_contract_signal(value: &Value) -> bool {
    ["output_text", "text", "content"].iter().any(|key| value.get(*key).is_some())
        || value.get("tool_calls").and_then(Value::as_array).is_some()
}

/// `outputText := first-of(output_text, text, content, "")`.
pub(crate) fn output_text_of(value: &Value) -> String {
    super::util::first_string(value, &["output_text", "text", "content"]).unwrap_or("").to_string()
}

/// Bounded worklist search over a parsed contract document for a `tool_calls`
/// array and an `outputText` string, per §9's nested/fenced-block recovery
/// design: an explicit queue, a visited-set over string candidates (to break
/// cycles), a fixed step cap, and the expansion order above. Each category
/// resolves to its first hit and stops expanding; the search as a whole stops
/// once both are found or the step cap is spent.
pub(crate) fn locate(root: &Value) -> (Vec<Value>, Option<String>) {
    let mut queue: VecDeque<Value> = VecDeque::from([root.clone()]);
    let mut seen_strings: HashSet<String> = HashSet::new();
    let mut steps = 0usize;

    let mut tool_calls = Vec::new();
    let mut output_text = None;

    while let Some(node) = queue.pop_front() {
        if steps >= SEARCH_STEP_CAP || (output_text.is_some() && !tool_calls.is_empty()) {
            break;
        }
        steps += 1;

        match node {
            Value::Object(map) => {
                if tool_calls.is_empty() {
                    if let Some(Value::Array(calls)) = map.get("tool_calls") {
                        tool_calls = calls.clone();
                    }
                }
                if output_text.is_none() {
                    for key in ["output_text", "text", "content"] {
                        if let Some(Value::String(s)) = map.get(key) {
                            output_text = Some(s.clone());
                            break;
                        }
                    }
                }

                for key in EXPANSION_ORDER {
                    if let Some(child) = map.get(*key) {
                        queue.push_back(child.clone());
                    }
                }
                for (key, child) in map.iter() {
                    if !EXPANSION_ORDER.contains(&key.as_str()) {
                        if let Value::String(_) = child {
                            queue.push_back(child.clone());
                        }
                    }
                }
            }
            Value::String(s) => {
                if !seen_strings.insert(s.clone()) {
                    continue;
                }
                if let Some(recovered) = recover_embedded_json(&s) {
                    queue.push_back(recovered);
                }
            }
            _ => {}
        }
    }

    (tool_calls, output_text)
}

/// Parse `text` directly if it looks like JSON, else try the first fenced
/// code block. Used to chase an `outputText`/`tool_calls` contract that a
/// provider encoded as a string inside another contract document.
fn recover_embedded_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Some(value);
        }
    }
    extract_fenced_block(text).and_then(|fenced| serde_json::from_str(&fenced).ok())
}

/// `finishReason := finish_reason ?? (toolCalls non-empty ? "tool_calls" : "stop")`.
pub(crate) fn finish_reason_of(value: &Value, tool_calls_non_empty: bool) -> FinishReason {
    match value.get("finish_reason").and_then(Value::as_str) {
        Some("stop") => FinishReason::Stop,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some("error") => FinishReason::Error,
        _ if tool_calls_non_empty => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}
