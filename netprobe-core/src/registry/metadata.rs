//! Tool metadata types (§3): the immutable description every probe
//! registers under.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Category tag drawn from the closed set in §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    NetworkDiagnostics,
    Pentesting,
    SystemInfo,
    Dns,
    Web,
    Security,
    EmailDiagnostics,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::NetworkDiagnostics => "network_diagnostics",
            ToolCategory::Pentesting => "pentesting",
            ToolCategory::SystemInfo => "system_info",
            ToolCategory::Dns => "dns",
            ToolCategory::Web => "web",
            ToolCategory::Security => "security",
            ToolCategory::EmailDiagnostics => "email_diagnostics",
        }
    }
}

/// The caller channel a tool may be invoked from (§3 "Mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Interactive,
    Conversational,
}

/// A parameter's declared type, mirroring the closed set in §3. `List`
/// carries an element-type hint, required by the protocol-export side
/// (§3 "parameter schema invariants").
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    List { element: Box<ParamType> },
    Dict,
}

impl ParamType {
    /// Canonical wire-protocol type name used by the external protocol
    /// server's schema export (§4.9): `string`, `integer`, `number`,
    /// `boolean`, `array`, `object`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Float => "number",
            ParamType::Boolean => "boolean",
            ParamType::List { .. } => "array",
            ParamType::Dict => "object",
        }
    }
}

/// Per-parameter schema entry (§3).
#[derive(Debug, Clone, Serialize)]
pub struct ParameterInfo {
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
    pub choices: Option<Vec<String>>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl ParameterInfo {
    pub fn required(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            required: true,
            default: None,
            description: description.into(),
            choices: None,
            min_value: None,
            max_value: None,
        }
    }

    pub fn optional(param_type: ParamType, description: impl Into<String>, default: Value) -> Self {
        Self {
            param_type,
            required: false,
            default: Some(default),
            description: description.into(),
            choices: None,
            min_value: None,
            max_value: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Validates the invariant in §3: defaults must satisfy declared
    /// constraints, and required parameters have no default.
    pub fn validate(&self) -> Result<(), String> {
        if self.required && self.default.is_some() {
            return Err("required parameter must not declare a default".into());
        }
        if let (Some(Value::Number(n)), Some(min)) = (&self.default, self.min_value) {
            if let Some(v) = n.as_f64() {
                if v < min {
                    return Err("default below declared minimum".into());
                }
            }
        }
        if let (Some(Value::Number(n)), Some(max)) = (&self.default, self.max_value) {
            if let Some(v) = n.as_f64() {
                if v > max {
                    return Err("default above declared maximum".into());
                }
            }
        }
        Ok(())
    }
}

/// Complete, immutable description of a probe (§3).
#[derive(Clone)]
pub struct ToolMetadata {
    pub name: String,
    pub function_name: String,
    pub description: String,
    pub category: ToolCategory,
    pub parameters: BTreeMap<String, ParameterInfo>,
    pub modes: Vec<Mode>,
    pub external_tool_required: bool,
    pub external_tool_name: Option<String>,
    pub privilege_required: bool,
    pub aliases: Vec<String>,
    pub examples: Vec<String>,
}

impl ToolMetadata {
    pub fn builder(name: impl Into<String>, function_name: impl Into<String>) -> ToolMetadataBuilder {
        ToolMetadataBuilder::new(name, function_name)
    }
}

pub struct ToolMetadataBuilder {
    inner: ToolMetadata,
}

impl ToolMetadataBuilder {
    fn new(name: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            inner: ToolMetadata {
                name: name.into(),
                function_name: function_name.into(),
                description: String::new(),
                category: ToolCategory::NetworkDiagnostics,
                parameters: BTreeMap::new(),
                modes: vec![Mode::Interactive, Mode::Conversational],
                external_tool_required: false,
                external_tool_name: None,
                privilege_required: false,
                aliases: Vec::new(),
                examples: Vec::new(),
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.inner.description = description.into();
        self
    }

    pub fn category(mut self, category: ToolCategory) -> Self {
        self.inner.category = category;
        self
    }

    pub fn param(mut self, name: impl Into<String>, info: ParameterInfo) -> Self {
        self.inner.parameters.insert(name.into(), info);
        self
    }

    pub fn modes(mut self, modes: Vec<Mode>) -> Self {
        self.inner.modes = modes;
        self
    }

    pub fn external_tool(mut self, binary: impl Into<String>) -> Self {
        self.inner.external_tool_required = true;
        self.inner.external_tool_name = Some(binary.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.inner.privilege_required = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.inner.aliases.push(alias.into());
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.inner.examples.push(example.into());
        self
    }

    pub fn build(self) -> ToolMetadata {
        self.inner
    }
}
