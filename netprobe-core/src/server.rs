//! External Protocol Server (§4.9): a line-framed JSON request/response
//! loop over stdio. Two methods — `list_tools` and `call_tool` — plus an
//! optional constant-time API-key gate. Grounded in the request/result
//! shape of `mcp_server.py` from `original_source/instability_mcp/`, cut
//! down to this spec's simpler custom wire format rather than the full
//! MCP protocol.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config;
use crate::registry::metadata::{Mode, ParamType};
use crate::registry::ToolRegistry;
use crate::sanitize;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
    /// Fixed header-style field carrying the shared secret when the
    /// auth gate is enabled. Named distinctly from `params` since a
    /// real HTTP transport would put this in a header, not the body.
    #[serde(default, rename = "x-auth-key")]
    auth_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }
    fn err(id: Value, code: &str, message: impl Into<String>) -> Self {
        Self { id, result: None, error: Some(json!({"code": code, "message": message.into()})) }
    }
}

/// Constant-time string comparison, used for the auth gate so a
/// mismatched key can't be inferred via response-timing side channels.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn authenticate(request: &Request) -> Result<(), Response> {
    if !config::auth_enabled() {
        return Ok(());
    }
    let Some(expected) = config::auth_key() else {
        return Ok(());
    };
    let presented = request.auth_key.as_deref().unwrap_or("");
    if constant_time_eq(presented, &expected) {
        Ok(())
    } else {
        Err(Response::err(request.id.clone(), "authentication_failed", "missing or invalid auth key"))
    }
}

/// JSON-Schema `items` hint for an array parameter, inferred from its
/// name the way the distilled original's schema export does (exact
/// name match first, then a substring fallback).
fn array_item_type(param_name: &str) -> &'static str {
    let lower = param_name.to_lowercase();
    if matches!(param_name, "servers" | "dns_servers") || lower.contains("server") {
        "string"
    } else if matches!(param_name, "urls" | "endpoints") || lower.contains("url") {
        "string"
    } else if matches!(param_name, "targets" | "hosts") || lower.contains("target") {
        "object"
    } else if matches!(param_name, "tools" | "commands") || lower.contains("tool") {
        "string"
    } else if matches!(param_name, "ports" | "port_list") || lower.contains("port") {
        "integer"
    } else {
        "string"
    }
}

fn param_schema(name: &str, info: &crate::registry::metadata::ParameterInfo) -> Value {
    let mut schema = json!({
        "type": info.param_type.wire_name(),
        "description": info.description,
    });
    if let ParamType::List { .. } = info.param_type {
        schema["items"] = json!({"type": array_item_type(name)});
    }
    if let Some(default) = &info.default {
        schema["default"] = default.clone();
    }
    if let Some(choices) = &info.choices {
        schema["enum"] = json!(choices);
    }
    if let Some(min) = info.min_value {
        schema["minimum"] = json!(min);
    }
    if let Some(max) = info.max_value {
        schema["maximum"] = json!(max);
    }
    schema
}

fn list_tools(registry: &ToolRegistry) -> Value {
    let tools = registry.get_available_tools(Some(Mode::Conversational), None, false);
    let entries: Vec<Value> = tools
        .iter()
        .map(|meta| {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for (name, info) in &meta.parameters {
                properties.insert(name.clone(), param_schema(name, info));
                if info.required {
                    required.push(name.clone());
                }
            }
            json!({
                "name": meta.name,
                "description": meta.description,
                "inputSchema": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            })
        })
        .collect();
    json!({"tools": entries})
}

/// Formats a completed `ToolResult` as the structured text blocks the
/// original's `_handle_tool_execution` produces, sanitizing any text
/// that rides along before it reaches the client.
fn format_tool_result(tool_name: &str, result: &crate::envelope::ToolResult) -> String {
    if let Some(markdown) = security_restricted_markdown(result) {
        return sanitize::sanitize_text(&markdown);
    }
    if result.success {
        let mut text = format!("**Tool-** {tool_name}\n**Result-** Success\n");
        if !result.stdout.is_empty() {
            text.push_str(&format!("**Output-**\n```\n{}\n```", sanitize::sanitize_text(&result.stdout)));
        } else if !result.parsed_data.is_null() {
            let sanitized = sanitize::sanitize_value(&result.parsed_data);
            match serde_json::to_string_pretty(&sanitized) {
                Ok(data_str) => text.push_str(&format!("**Data-**\n```json\n{data_str}\n```")),
                Err(_) => text.push_str(&format!("**Data-** {}", sanitize::sanitize_text(&result.parsed_data.to_string()))),
            }
        }
        text
    } else {
        let mut details = Vec::new();
        if let Some(message) = &result.error_message {
            details.push(format!("Message - {}", sanitize::sanitize_text(message)));
        }
        if let Some(error_type) = &result.error_type {
            details.push(format!("Type - {error_type}"));
        }
        if !result.stderr.is_empty() {
            details.push(format!("Details - {}", sanitize::sanitize_text(&result.stderr)));
        }
        details.push(format!("Exit Code - {}", result.exit_code));
        format!("**Tool-** {tool_name}\n**Error-**\n{}", details.join("\n"))
    }
}

/// Extracts the raw "manual commands" markdown block a security-
/// restricted refusal carries in `parsed_data`, if any (§4.9 "Call
/// tool"). Returned verbatim by `format_tool_result` instead of the
/// generic error block.
fn security_restricted_markdown(result: &crate::envelope::ToolResult) -> Option<String> {
    if result.success {
        return None;
    }
    if result.parsed_data.get("security_restricted")?.as_bool()? {
        result
            .parsed_data
            .get("manual_commands_markdown")
            .and_then(Value::as_str)
            .map(str::to_string)
    } else {
        None
    }
}

async fn call_tool(registry: &ToolRegistry, params: &Value) -> Value {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return json!({"error": "tool name is required"});
    };
    let mut arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    if let Value::Object(ref mut map) = arguments {
        map.insert("silent".into(), Value::Bool(true));
    }
    let result = registry.execute_tool(name, arguments, Mode::Conversational).await;
    json!({"content": [{"type": "text", "text": format_tool_result(name, &result)}]})
}

/// Runs the request/response loop over stdin/stdout until stdin closes.
/// Each line is one JSON request; each reply is one JSON line.
pub async fn run(registry: &ToolRegistry) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(registry, &line).await;
        let mut serialized = serde_json::to_string(&response).unwrap_or_default();
        serialized.push('\n');
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle_line(registry: &ToolRegistry, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return Response::err(Value::Null, "invalid_request", e.to_string()),
    };

    if let Err(response) = authenticate(&request) {
        return response;
    }

    match request.method.as_str() {
        "list_tools" => Response::ok(request.id, list_tools(registry)),
        "call_tool" => Response::ok(request.id.clone(), call_tool(registry, &request.params).await),
        other => Response::err(request.id, "unknown_method", format!("no such method: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::metadata::{ParameterInfo, ToolMetadata};

    #[test]
    fn security_restricted_markdown_is_surfaced_verbatim() {
        let result = crate::envelope::EnvelopeBuilder::new("run_port_scan").failure_with_data(
            crate::errors::ProbeError::system(crate::errors::ErrorCode::PermissionDenied, &crate::errors::ctx(&[])),
            String::new(),
            String::new(),
            json!({"security_restricted": true, "manual_commands_markdown": "run `nmap -sT host` yourself"}),
        );
        let text = format_tool_result("run_port_scan", &result);
        assert_eq!(text, "run `nmap -sT host` yourself");
    }

    #[test]
    fn ordinary_failure_uses_the_generic_error_block() {
        let result = crate::envelope::EnvelopeBuilder::new("ping_host").failure(
            crate::errors::ProbeError::network(crate::errors::ErrorCode::Timeout, &crate::errors::ctx(&[])),
            String::new(),
            String::new(),
        );
        let text = format_tool_result("ping_host", &result);
        assert!(text.contains("**Error-**"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_length() {
        assert!(!constant_time_eq("abc", "ab"));
    }

    #[test]
    fn constant_time_eq_accepts_identical_strings() {
        assert!(constant_time_eq("secret", "secret"));
    }

    #[test]
    fn array_item_type_infers_from_exact_name() {
        assert_eq!(array_item_type("servers"), "string");
        assert_eq!(array_item_type("ports"), "integer");
        assert_eq!(array_item_type("targets"), "object");
    }

    #[test]
    fn array_item_type_infers_from_substring() {
        assert_eq!(array_item_type("dns_server_list"), "string");
        assert_eq!(array_item_type("port_numbers"), "integer");
    }

    #[test]
    fn array_item_type_defaults_to_string() {
        assert_eq!(array_item_type("things"), "string");
    }

    #[test]
    fn list_tools_includes_array_items_hint() {
        let mut registry = ToolRegistry::new();
        let meta = ToolMetadata::builder("check_whois_servers", "check_whois_servers")
            .param("servers", ParameterInfo::optional(ParamType::List { element: Box::new(ParamType::String) }, "servers", json!([])))
            .build();
        registry.register(meta, None).unwrap();
        let listing = list_tools(&registry);
        let schema = &listing["tools"][0]["inputSchema"]["properties"]["servers"];
        assert_eq!(schema["type"], json!("array"));
        assert_eq!(schema["items"]["type"], json!("string"));
    }

    #[tokio::test]
    async fn call_tool_forces_silent_true() {
        let mut registry = ToolRegistry::new();
        let meta = ToolMetadata::builder("echo_args", "echo_args")
            .param("silent", ParameterInfo::optional(ParamType::Boolean, "silent", json!(false)))
            .build();
        let function: crate::registry::ToolFn = std::sync::Arc::new(|args, _mode| {
            Box::pin(async move { crate::envelope::EnvelopeBuilder::new("echo_args").success(String::new(), String::new(), args) })
        });
        registry.register(meta, Some(function)).unwrap();
        let response = call_tool(&registry, &json!({"name": "echo_args", "arguments": {}})).await;
        let text = response["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("\"silent\": true"));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let registry = ToolRegistry::new();
        let response = handle_line(&registry, r#"{"id": 1, "method": "nope", "params": {}}"#).await;
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn auth_gate_rejects_missing_key_when_enabled() {
        std::env::set_var(config::env_vars::AUTH_ENABLED, "1");
        std::env::set_var(config::env_vars::AUTH_KEY, "topsecret");
        let registry = ToolRegistry::new();
        let response = handle_line(&registry, r#"{"id": 1, "method": "list_tools", "params": {}}"#).await;
        std::env::remove_var(config::env_vars::AUTH_ENABLED);
        std::env::remove_var(config::env_vars::AUTH_KEY);
        assert_eq!(response.error.unwrap()["code"], json!("authentication_failed"));
    }
}
