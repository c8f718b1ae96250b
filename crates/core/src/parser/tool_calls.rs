//! Tool-call normalization, nested-contract recovery, and post-processing
//! against the request's declared tools (§4.3).

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;

use super::util::{canonicalize_name, first_string};
use crate::model::{FinishReason, ToolCall, ToolDefinition, synthesize_tool_call_id};

/// Breadth-limit on the nested-recovery traversal: visited string candidates, not bytes.
const MAX_VISITED_NODES: usize = 80;

/// Build normalized [`ToolCall`]s from a contract's raw `tool_calls` array.
pub(crate) fn normalize(raw_tool_calls: &[Value]) -> Vec<ToolCall> {
    raw_tool_calls.iter().enumerate().map(|(index, entry)| normalize_one(entry, index)).collect()
}

fn normalize_one(entry: &Value, index: usize) -> ToolCall {
    let id = first_string(entry, &["id", "call_id", "tool_id", "toolId"])
        .map(str::to_string)
        .unwrap_or_else(|| synthesize_tool_call_id(index));

    let mut name = extract_name(entry);
    let raw_arguments = find_raw_arguments(entry);
    let mut arguments = stringify_arguments(raw_arguments);

    if let Some(Value::String(raw_str)) = raw_arguments {
        if let Some((inner_name, inner_arguments)) = recover_nested(raw_str) {
            name = inner_name;
            arguments = inner_arguments;
        }
    }

    ToolCall { id, name, arguments }
}

fn extract_name(entry: &Value) -> String {
    first_string(entry, &["name", "tool_name", "toolName"])
        .map(str::to_string)
        .or_else(|| entry.get("function").and_then(|function| function.get("name")).and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

fn find_raw_arguments(entry: &Value) -> Option<&Value> {
    entry
        .get("arguments")
        .or_else(|| entry.get("args"))
        .or_else(|| entry.get("parameters"))
        .or_else(|| entry.get("function").and_then(|function| function.get("arguments")))
        .or_else(|| entry.get("function").and_then(|function| function.get("args")))
}

/// Stringify a raw arguments value. A string that looks like JSON (starts with
/// `{` or `[`) is parsed and re-serialized, which both validates it and
/// sanitizes whitespace-padded keys; any other string passes through verbatim;
/// objects/arrays are stringified directly.
fn stringify_arguments(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str::<Value>(trimmed).map(|value| value.to_string()).unwrap_or_else(|_| s.clone())
            } else {
                s.clone()
            }
        }
        Some(other) => other.to_string(),
        None => "{}".to_string(),
    }
}

/// Descend into a string that may encode a whole assistant-style reply,
/// looking for an embedded tool call. Returns `(name, arguments)` of the first
/// one found, or `None` if the string never resolves to one.
fn recover_nested(raw_str: &str) -> Option<(String, String)> {
    let mut queue: VecDeque<String> = VecDeque::from([raw_str.to_string()]);
    let mut seen: HashSet<String> = HashSet::new();
    let mut visited = 0usize;

    while let Some(candidate) = queue.pop_front() {
        if visited >= MAX_VISITED_NODES {
            break;
        }
        if !seen.insert(candidate.clone()) {
            continue;
        }
        visited += 1;

        for json_text in candidate_json_strings(&candidate) {
            let Ok(value) = serde_json::from_str::<Value>(&json_text) else { continue };
            let Value::Object(ref map) = value else { continue };

            if let Some(first) = value.get("tool_calls").and_then(Value::as_array).and_then(|calls| calls.first()) {
                let name = extract_name(first);
                let arguments = stringify_arguments(find_raw_arguments(first));
                return Some((name, arguments));
            }

            for key in ["response", "message.content", "output_text", "text", "content"] {
                if let Some(s) = get_dotted_str(&value, key) {
                    queue.push_back(s.to_string());
                }
            }

            for (key, field_value) in map {
                if matches!(key.as_str(), "response" | "message" | "output_text" | "text" | "content") {
                    continue;
                }
                if let Value::String(s) = field_value {
                    queue.push_back(s.clone());
                }
            }
        }
    }

    None
}

/// Candidate JSON substrings worth attempting to parse: the whole string if it
/// looks like JSON, anything inside a fenced code block, and the span between
/// the first `{` and the last `}`.
fn candidate_json_strings(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        candidates.push(trimmed.to_string());
    }

    if let Some(fenced) = extract_fenced_block(text) {
        candidates.push(fenced);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            candidates.push(text[start..=end].to_string());
        }
    }

    candidates
}

pub(crate) fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_opening = &text[start + 3..];
    let after_opening = after_opening.strip_prefix("json").unwrap_or(after_opening);
    let end = after_opening.find("```")?;
    Some(after_opening[..end].trim().to_string())
}

fn get_dotted_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    current.as_str()
}

/// Drop tool calls the request didn't declare, rewrite surviving names and
/// argument keys to the declared canonical form, and downgrade `finishReason`
/// back to `stop` if every tool call was dropped.
pub(crate) fn postprocess_against_declared(
    tool_calls: Vec<ToolCall>,
    declared_tools: &[ToolDefinition],
    finish_reason: FinishReason,
) -> (Vec<ToolCall>, FinishReason) {
    if declared_tools.is_empty() {
        return (Vec::new(), downgrade_if_empty(true, finish_reason));
    }

    let declared_by_canonical: HashMap<String, &ToolDefinition> =
        declared_tools.iter().map(|tool| (canonicalize_name(&tool.name), tool)).collect();

    let survivors: Vec<ToolCall> = tool_calls
        .into_iter()
        .filter_map(|mut call| {
            let declared = *declared_by_canonical.get(&canonicalize_name(&call.name))?;
            call.name = declared.name.clone();
            call.arguments = canonicalize_argument_keys(&call.arguments, declared);
            Some(call)
        })
        .collect();

    let finish_reason = downgrade_if_empty(survivors.is_empty(), finish_reason);
    (survivors, finish_reason)
}

fn downgrade_if_empty(is_empty: bool, finish_reason: FinishReason) -> FinishReason {
    if is_empty && finish_reason == FinishReason::ToolCalls { FinishReason::Stop } else { finish_reason }
}

fn canonicalize_argument_keys(arguments_json: &str, declared: &ToolDefinition) -> String {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(arguments_json) else {
        return arguments_json.to_string();
    };

    let declared_properties: HashMap<String, String> = declared
        .parameters
        .as_ref()
        .and_then(|schema| schema.get("properties"))
        .and_then(Value::as_object)
        .map(|properties| properties.keys().map(|key| (canonicalize_name(key), key.clone())).collect())
        .unwrap_or_default();

    let rewritten: serde_json::Map<String, Value> = map
        .into_iter()
        .map(|(key, value)| {
            let canonical = canonicalize_name(&key);
            let final_key = declared_properties.get(&canonical).cloned().unwrap_or(key);
            (final_key, value)
        })
        .collect();

    Value::Object(rewritten).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, properties: &[&str]) -> ToolDefinition {
        let props: serde_json::Map<String, Value> =
            properties.iter().map(|p| (p.to_string(), json!({"type": "string"}))).collect();

        ToolDefinition {
            name: name.to_string(),
            description: None,
            parameters: Some(json!({"type": "object", "properties": props})),
        }
    }

    #[test]
    fn extracts_id_name_and_arguments_from_primary_keys() {
        let raw = vec![json!({"id": "abc", "name": "search", "arguments": "{\"q\": \"rust\"}"})];
        let calls = normalize(&raw);
        assert_eq!(calls[0].id, "abc");
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments, r#"{"q":"rust"}"#);
    }

    #[test]
    fn synthesizes_id_when_absent() {
        let raw = vec![json!({"name": "search", "args": {}}), json!({"name": "search2", "args": {}})];
        let calls = normalize(&raw);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[1].id, "call_2");
    }

    #[test]
    fn falls_back_through_alternate_key_aliases() {
        let raw = vec![json!({"tool_id": "t1", "toolName": "lookup", "parameters": {"x": 1}})];
        let calls = normalize(&raw);
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].name, "lookup");
    }

    #[test]
    fn reads_function_nested_name_and_arguments() {
        let raw = vec![json!({"id": "1", "function": {"name": "fn_name", "arguments": "{\"a\":1}"}})];
        let calls = normalize(&raw);
        assert_eq!(calls[0].name, "fn_name");
        assert_eq!(calls[0].arguments, r#"{"a":1}"#);
    }

    #[test]
    fn plain_string_arguments_pass_through_verbatim() {
        let raw = vec![json!({"name": "echo", "arguments": "not json at all"})];
        let calls = normalize(&raw);
        assert_eq!(calls[0].arguments, "not json at all");
    }

    #[test]
    fn recovers_inner_tool_call_from_nested_assistant_reply() {
        let inner = json!({"tool_calls": [{"name": "real_tool", "arguments": {"x": 1}}]}).to_string();
        let raw = vec![json!({"id": "outer", "name": "wrapper", "arguments": inner})];
        let calls = normalize(&raw);
        assert_eq!(calls[0].id, "outer");
        assert_eq!(calls[0].name, "real_tool");
    }

    #[test]
    fn recovers_inner_tool_call_from_fenced_code_block() {
        let fenced = format!(
            "Sure, here's what I'll run:\n```json\n{}\n```",
            json!({"tool_calls": [{"name": "real_tool", "arguments": {}}]})
        );
        let raw = vec![json!({"id": "outer", "name": "wrapper", "arguments": fenced})];
        let calls = normalize(&raw);
        assert_eq!(calls[0].name, "real_tool");
    }

    #[test]
    fn postprocess_drops_undeclared_tool_calls_and_downgrades_finish_reason() {
        let declared = vec![tool("search", &["query"])];
        let calls = vec![ToolCall { id: "1".into(), name: "unlisted".into(), arguments: "{}".into() }];
        let (survivors, finish_reason) = postprocess_against_declared(calls, &declared, FinishReason::ToolCalls);
        assert!(survivors.is_empty());
        assert_eq!(finish_reason, FinishReason::Stop);
    }

    #[test]
    fn postprocess_rewrites_name_and_argument_keys_to_declared_canonical_form() {
        let declared = vec![tool("SearchWeb", &["searchQuery"])];
        let calls = vec![ToolCall {
            id: "1".into(),
            name: "search_web".into(),
            arguments: r#"{"search_query": "rust"}"#.into(),
        }];
        let (survivors, _) = postprocess_against_declared(calls, &declared, FinishReason::ToolCalls);
        assert_eq!(survivors[0].name, "SearchWeb");
        assert_eq!(survivors[0].arguments, r#"{"searchQuery":"rust"}"#);
    }

    #[test]
    fn empty_declared_tool_set_drops_everything() {
        let calls = vec![ToolCall { id: "1".into(), name: "anything".into(), arguments: "{}".into() }];
        let (survivors, finish_reason) = postprocess_against_declared(calls, &[], FinishReason::ToolCalls);
        assert!(survivors.is_empty());
        assert_eq!(finish_reason, FinishReason::Stop);
    }
}
