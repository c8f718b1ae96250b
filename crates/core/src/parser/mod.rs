//! Turns raw provider stdout into a [`ProviderResult`], per the configured output mode (§4.3).

mod contract;
mod tool_calls;
mod util;

use config::OutputMode;
use serde_json::Value;

use crate::error::Result;
use crate::model::{FinishReason, ProviderResult, ToolDefinition};

/// Parse `stdout` under `mode`, then drop/rewrite tool calls against `declared_tools`.
pub fn parse(mode: OutputMode, stdout: &str, declared_tools: &[ToolDefinition]) -> Result<ProviderResult> {
    let (output_text, raw_tool_calls, finish_reason) = match mode {
        OutputMode::TextPlain => (stdout.trim().to_string(), Vec::new(), FinishReason::Stop),

        OutputMode::Text => match contract::soft_extract(stdout) {
            Some(value) => from_contract(&value),
            None => (stdout.trim().to_string(), Vec::new(), FinishReason::Stop),
        },

        OutputMode::TextContractFinalLine => match contract::final_line_extract(stdout) {
            Some(value) => from_contract(&value),
            None => (stdout.trim().to_string(), Vec::new(), FinishReason::Stop),
        },

        OutputMode::JsonContract => from_contract(&contract::hard_parse(stdout)?),
    };

    let normalized = tool_calls::normalize(&raw_tool_calls);
    let (tool_calls, finish_reason) = tool_calls::postprocess_against_declared(normalized, declared_tools, finish_reason);

    Ok(ProviderResult {
        output_text,
        tool_calls,
        finish_reason,
        raw: Some(stdout.to_string()),
    })
}

fn from_contract(value: &Value) -> (String, Vec<Value>, FinishReason) {
    let (raw_tool_calls, output_text) = contract::locate(value);
    let finish_reason = contract::finish_reason_of(value, !raw_tool_calls.is_empty());
    (output_text.unwrap_or_default(), raw_tool_calls, finish_reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn text_plain_mode_never_interprets_stdout() {
        let result = parse(OutputMode::TextPlain, "  {\"output_text\": \"hi\"}  ", &[]).unwrap();
        assert_eq!(result.output_text, "{\"output_text\": \"hi\"}");
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn text_mode_extracts_contract_when_present() {
        let result = parse(OutputMode::Text, r#"{"output_text": "hello"}"#, &[]).unwrap();
        assert_eq!(result.output_text, "hello");
    }

    #[test]
    fn text_mode_falls_back_to_plain_text_without_a_contract() {
        let result = parse(OutputMode::Text, "just some text", &[]).unwrap();
        assert_eq!(result.output_text, "just some text");
    }

    #[test]
    fn json_contract_mode_errors_on_empty_stdout() {
        let result = parse(OutputMode::JsonContract, "", &[]);
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[test]
    fn json_contract_mode_parses_whole_trimmed_stdout() {
        let result = parse(OutputMode::JsonContract, "\n  {\"text\": \"done\"}  \n", &[]).unwrap();
        assert_eq!(result.output_text, "done");
    }

    #[test]
    fn final_line_mode_falls_back_when_last_line_is_not_json() {
        let result = parse(OutputMode::TextContractFinalLine, "log line one\nnot json", &[]).unwrap();
        assert_eq!(result.output_text, "log line one\nnot json");
    }

    #[test]
    fn tool_calls_are_dropped_when_undeclared() {
        let stdout = r#"{"tool_calls": [{"name": "mystery", "arguments": {}}], "finish_reason": "tool_calls"}"#;
        let result = parse(OutputMode::JsonContract, stdout, &[]).unwrap();
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn declared_tool_calls_survive_and_get_canonical_names() {
        let declared = vec![ToolDefinition { name: "search".into(), description: None, parameters: None }];
        let stdout = r#"{"tool_calls": [{"name": "Search", "arguments": {}}]}"#;
        let result = parse(OutputMode::JsonContract, stdout, &declared).unwrap();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "search");
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn tool_calls_nested_under_a_message_wrapper_are_still_found() {
        let stdout = indoc::indoc! {r#"
            {
              "message": {
                "content": "Here is the plan:\n```json\n{\"output_text\": \"buried\"}\n```",
                "tool_calls": [{"id": "call_0", "name": "run", "arguments": {"path": "x"}}]
              }
            }
        "#};
        let declared = vec![ToolDefinition { name: "run".into(), description: None, parameters: None }];
        let result = parse(OutputMode::JsonContract, stdout, &declared).unwrap();

        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].id, "call_0");
        assert_eq!(result.tool_calls[0].name, "run");
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
        // The message's own `content` field wins outright; the fenced contract
        // buried inside it is never unpacked once that direct hit resolves.
        assert!(result.output_text.starts_with("Here is the plan:"));
    }
}
