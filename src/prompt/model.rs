//! Model capabilities, tool schemas and the per-turn context built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes a family of models and the prompt quirks it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFamily {
    pub id: String,
    pub base_instructions: String,
    pub supports_parallel_tool_calls: bool,
    /// The model should be steered away from patch formats when no
    /// `apply_patch` tool is offered.
    pub needs_special_apply_patch_instructions: bool,
}

/// A function tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Immutable configuration for one turn.
///
/// Built once with the `with_*` methods and then only read.
#[derive(Debug, Clone)]
pub struct TurnContext {
    model_family: ModelFamily,
    tools: Vec<ToolSpec>,
    external_tools: Vec<ToolSpec>,
    base_instructions_override: Option<String>,
    final_output_json_schema: Option<Value>,
}

impl TurnContext {
    pub fn new(model_family: ModelFamily, tools: Vec<ToolSpec>) -> Self {
        Self {
            model_family,
            tools,
            external_tools: Vec::new(),
            base_instructions_override: None,
            final_output_json_schema: None,
        }
    }

    /// Tools contributed from outside the core (plugins, MCP bridges).
    pub fn with_external_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.external_tools = tools;
        self
    }

    pub fn with_base_instructions_override(mut self, instructions: Option<String>) -> Self {
        self.base_instructions_override = instructions;
        self
    }

    pub fn with_output_schema(mut self, schema: Option<Value>) -> Self {
        self.final_output_json_schema = schema;
        self
    }

    pub fn model_family(&self) -> &ModelFamily {
        &self.model_family
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn external_tools(&self) -> &[ToolSpec] {
        &self.external_tools
    }

    pub fn base_instructions_override(&self) -> Option<&str> {
        self.base_instructions_override.as_deref()
    }

    pub fn final_output_json_schema(&self) -> Option<&Value> {
        self.final_output_json_schema.as_ref()
    }
}
