//! LLM Orchestrator Adapter (§4.8): turns a single chat completion into
//! an optional tool call, executes that tool through the registry, and
//! asks the model for a follow-up once the tool result is in hand.
//! Grounded on the distilled original's `chatbot.py::parse_tool_call` /
//! `utils.py::extract_thinking` and the adapter shape in
//! `instability_mcp/chatbot_adapter.py`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::registry::metadata::Mode;
use crate::registry::{ToolMetadata, ToolRegistry};

/// One turn of conversation, in the shape every `LlmClient` implementation
/// consumes.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

/// The boundary between the orchestrator and whatever chat-completion
/// backend is actually wired in. Kept intentionally narrow (one method)
/// so a real client only needs to turn a message list into a reply.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

/// Deterministic stand-in used by tests and by any caller that hasn't
/// wired a real backend yet. Echoes back a fixed reply unless seeded
/// with scripted responses, which are consumed one per call.
pub struct MockLlmClient {
    scripted: std::sync::Mutex<Vec<String>>,
    fallback: String,
}

impl MockLlmClient {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self { scripted: std::sync::Mutex::new(Vec::new()), fallback: fallback.into() }
    }

    pub fn with_script(responses: Vec<String>) -> Self {
        Self { scripted: std::sync::Mutex::new(responses), fallback: String::new() }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
        let mut scripted = self.scripted.lock().unwrap();
        if scripted.is_empty() {
            Ok(self.fallback.clone())
        } else {
            Ok(scripted.remove(0))
        }
    }
}

/// Result of running one user turn through the orchestrator.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnOutcome {
    pub content: String,
    pub thinking: Option<String>,
    pub tools_used: Vec<ToolInvocation>,
    pub protocol_violation: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: Value,
    pub success: bool,
}

const SYSTEM_PROMPT: &str = "You are a network diagnostics and cybersecurity specialist working with an experienced security admin/pentester.\nYou can call tools for network diagnosis, security scanning, and pentest reconnaissance.\n\nWhen you need specific information, call a tool using this exact format:\n\nTOOL: tool_name\nARGS: {\"arg_name\": \"value\"}\n\nStop after the tool call. Do not include a fabricated \"Tool result:\" line.\n\nBe direct, concise, and technical. Keep responses to one or two sentences.";

/// Keyword list behind the "model ignored an obviously network-related
/// question" heuristic. Left as a plain, overridable list rather than a
/// fixed enum per Design Notes §9 — a deployment extending the tool
/// catalog into a new domain only needs to extend this list, not touch
/// the detection logic.
const NETWORK_KEYWORDS: &[&str] = &[
    "ping", "dns", "latency", "traceroute", "connectivity", "ip address",
    "routing", "port scan", "nmap", "whois", "packet loss", "bandwidth",
];

pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    network_keywords: Vec<String>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            registry,
            network_keywords: NETWORK_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.network_keywords = keywords;
        self
    }

    fn catalog_summary(&self) -> String {
        let tools = self.registry.get_available_tools(Some(Mode::Conversational), None, false);
        tools
            .iter()
            .map(|t: &&ToolMetadata| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn looks_network_related(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.network_keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// Runs one user turn, bounded by `timeout`. On timeout or backend
    /// error returns a stub `TurnOutcome` rather than propagating, the
    /// way `chatbot_adapter.py`'s async wrapper swallows both
    /// `asyncio.TimeoutError` and a bare `Exception`.
    pub async fn process_turn(
        &self,
        history: &[ChatMessage],
        user_message: &str,
        timeout: Duration,
    ) -> TurnOutcome {
        match tokio::time::timeout(timeout, self.process_turn_inner(history, user_message)).await {
            Ok(outcome) => outcome,
            Err(_) => TurnOutcome {
                content: "Request timed out. Please try again with a simpler query.".into(),
                thinking: Some("Request exceeded timeout limit".into()),
                tools_used: Vec::new(),
                protocol_violation: false,
            },
        }
    }

    async fn process_turn_inner(&self, history: &[ChatMessage], user_message: &str) -> TurnOutcome {
        let mut conversation = vec![ChatMessage::system(format!("{SYSTEM_PROMPT}\n\nAvailable tools:\n{}", self.catalog_summary()))];
        let recent = if history.len() > 10 { &history[history.len() - 10..] } else { history };
        conversation.extend(recent.iter().cloned());
        conversation.push(ChatMessage::user(user_message));

        let reply = match self.client.chat(&conversation).await {
            Ok(reply) => reply,
            Err(e) => {
                return TurnOutcome {
                    content: format!("Error processing message: {e}"),
                    thinking: Some(format!("Internal error: {e}")),
                    tools_used: Vec::new(),
                    protocol_violation: false,
                };
            }
        };

        let (thinking, content) = extract_thinking(&reply);
        let (tool_name, args) = parse_tool_call(&content);

        let Some(tool_name) = tool_name else {
            let protocol_violation = self.looks_network_related(user_message);
            return TurnOutcome { content, thinking, tools_used: Vec::new(), protocol_violation };
        };

        let call_args = args.unwrap_or_else(|| Value::Object(Default::default()));
        let result = self.registry.execute_tool(&tool_name, call_args.clone(), Mode::Conversational).await;
        let invocation = ToolInvocation { tool: tool_name.clone(), args: call_args, success: result.success };

        conversation.push(ChatMessage::assistant(content));
        conversation.push(ChatMessage::system(format!(
            "Tool result: {}",
            serde_json::to_string(&result).unwrap_or_default()
        )));

        let follow_up = match self.client.chat(&conversation).await {
            Ok(reply) => reply,
            Err(e) => format!("Error executing tool {tool_name}: {e}"),
        };

        TurnOutcome {
            content: follow_up,
            thinking,
            tools_used: vec![invocation],
            protocol_violation: false,
        }
    }
}

/// Extracts a `<think>...</think>` or `[thinking]...[/thinking]` block,
/// returning the thinking text (if any) and the content with that block
/// removed. Checks the angle-bracket form first; the two are mutually
/// exclusive in practice (a model picks one style per response).
pub fn extract_thinking(content: &str) -> (Option<String>, String) {
    if let (Some(open), Some(close_rel)) = (content.find("<think>"), content.find("</think>")) {
        let thinking_start = open + "<think>".len();
        if close_rel > thinking_start {
            let thinking = content[thinking_start..close_rel].trim().to_string();
            let remaining = format!("{}{}", &content[..open], &content[close_rel + "</think>".len()..]);
            return (Some(thinking), remaining.trim().to_string());
        }
    }
    if let (Some(open), Some(close_rel)) = (content.find("[thinking]"), content.find("[/thinking]")) {
        let thinking_start = open + "[thinking]".len();
        if close_rel > thinking_start {
            let thinking = content[thinking_start..close_rel].trim().to_string();
            let remaining = format!("{}{}", &content[..open], &content[close_rel + "[/thinking]".len()..]);
            return (Some(thinking), remaining.trim().to_string());
        }
    }
    (None, content.to_string())
}

/// Parses a `TOOL: name` / `ARGS: {...}` call out of a model's reply.
/// Only the first line after `ARGS:` is consulted for JSON, specifically
/// so a model that hallucinates a `Tool result:` line further down never
/// gets misread as supplying its own arguments.
pub fn parse_tool_call(content: &str) -> (Option<String>, Option<Value>) {
    let Some(tool_pos) = content.find("TOOL:") else {
        return (None, None);
    };
    let tool_part = content[tool_pos + "TOOL:".len()..].trim_start();

    let mut tool_name = match tool_part.find("ARGS:") {
        Some(args_pos) => tool_part[..args_pos].trim(),
        None => tool_part.lines().next().unwrap_or("").trim(),
    };
    if let Some(paren) = tool_name.find('(') {
        tool_name = tool_name[..paren].trim();
    }
    if tool_name.is_empty() {
        return (None, None);
    }

    let mut args = Value::Object(Default::default());
    if let Some(args_pos) = tool_part.find("ARGS:") {
        let args_text = tool_part[args_pos + "ARGS:".len()..].trim_start();
        let args_line = args_text.lines().next().unwrap_or("").trim();
        if let Some(start) = args_line.find('{') {
            if let Some(end) = args_line.rfind('}') {
                if end > start {
                    if let Ok(parsed) = serde_json::from_str::<Value>(&args_line[start..=end]) {
                        args = parsed;
                    }
                }
            }
        }
    }

    (Some(tool_name.to_string()), Some(args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_call_with_args() {
        let content = "I'll check that.\nTOOL: ping_host\nARGS: {\"host\": \"example.com\"}";
        let (tool, args) = parse_tool_call(content);
        assert_eq!(tool.as_deref(), Some("ping_host"));
        assert_eq!(args.unwrap()["host"], Value::String("example.com".into()));
    }

    #[test]
    fn parses_tool_call_without_args() {
        let content = "TOOL: get_local_ip";
        let (tool, args) = parse_tool_call(content);
        assert_eq!(tool.as_deref(), Some("get_local_ip"));
        assert_eq!(args, Some(Value::Object(Default::default())));
    }

    #[test]
    fn strips_trailing_parentheses_from_tool_name() {
        let content = "TOOL: ping_host(host=\"x\")\nARGS: {}";
        let (tool, _) = parse_tool_call(content);
        assert_eq!(tool.as_deref(), Some("ping_host"));
    }

    #[test]
    fn ignores_a_hallucinated_tool_result_line() {
        let content = "TOOL: ping_host\nARGS: {\"host\": \"example.com\"}\nTool result: {\"fake\": true}";
        let (_, args) = parse_tool_call(content);
        assert_eq!(args.unwrap()["host"], Value::String("example.com".into()));
    }

    #[test]
    fn malformed_json_args_fall_back_to_empty_object() {
        let content = "TOOL: ping_host\nARGS: {not valid json}";
        let (tool, args) = parse_tool_call(content);
        assert_eq!(tool.as_deref(), Some("ping_host"));
        assert_eq!(args, Some(Value::Object(Default::default())));
    }

    #[test]
    fn no_tool_marker_yields_none() {
        assert_eq!(parse_tool_call("just a plain reply"), (None, None));
    }

    #[test]
    fn extracts_angle_bracket_thinking() {
        let (thinking, content) = extract_thinking("<think>reasoning here</think>final answer");
        assert_eq!(thinking.as_deref(), Some("reasoning here"));
        assert_eq!(content, "final answer");
    }

    #[test]
    fn extracts_bracket_thinking() {
        let (thinking, content) = extract_thinking("[thinking]plan[/thinking]done");
        assert_eq!(thinking.as_deref(), Some("plan"));
        assert_eq!(content, "done");
    }

    #[test]
    fn no_thinking_block_passes_content_through() {
        let (thinking, content) = extract_thinking("plain reply");
        assert!(thinking.is_none());
        assert_eq!(content, "plain reply");
    }

    #[tokio::test]
    async fn turn_without_tool_call_flags_protocol_violation_on_network_question() {
        let client = Arc::new(MockLlmClient::new("I can help with that in general terms."));
        let registry = Arc::new(ToolRegistry::new());
        let orchestrator = Orchestrator::new(client, registry);
        let outcome = orchestrator
            .process_turn(&[], "what's my ping to example.com?", Duration::from_secs(5))
            .await;
        assert!(outcome.protocol_violation);
        assert!(outcome.tools_used.is_empty());
    }

    #[tokio::test]
    async fn turn_with_tool_call_executes_and_runs_a_follow_up() {
        let mut registry = ToolRegistry::new();
        crate::probes::link::register(&mut registry);
        let client = Arc::new(MockLlmClient::with_script(vec![
            "TOOL: get_local_ip\nARGS: {}".into(),
            "Your local IP has been determined.".into(),
        ]));
        let orchestrator = Orchestrator::new(client, Arc::new(registry));
        let outcome = orchestrator
            .process_turn(&[], "what is my local ip?", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.tools_used.len(), 1);
        assert_eq!(outcome.tools_used[0].tool, "get_local_ip");
        assert_eq!(outcome.content, "Your local IP has been determined.");
    }

    #[tokio::test]
    async fn timeout_yields_a_stub_response() {
        struct SlowClient;
        #[async_trait]
        impl LlmClient for SlowClient {
            async fn chat(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok("too late".into())
            }
        }
        let orchestrator = Orchestrator::new(Arc::new(SlowClient), Arc::new(ToolRegistry::new()));
        let outcome = orchestrator.process_turn(&[], "ping test", Duration::from_millis(20)).await;
        assert!(outcome.content.contains("timed out"));
    }
}
