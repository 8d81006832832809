//! Prompt assembly: instructions, salient user input and wire messages.
//!
//! [`build_prompt`] combines a [`TurnContext`] with the transcript;
//! [`build_messages_for_chat_api`] turns the result into the exact ordered
//! message list sent to the model. The instruction string is folded into the
//! first user message rather than sent as a separate system message.

use serde_json::{Value, json};

use super::model::{ModelFamily, ToolSpec, TurnContext};
use super::transcript::{ChatMessage, MODEL_ROLE, Part, ResponseItem, TOOL_ROLE, USER_ROLE};
use crate::error::PromptError;

const OUTPUT_SCHEMA_PREAMBLE: &str = "\n\n[Output Schema]\n\
You MUST respond with a single, valid JSON object that conforms to the following JSON Schema:\n\
```json\n";

const APPLY_PATCH_FALLBACK: &str = "\n[Special Instructions]\n\
If you need to modify a file, use the 'update_file' tool and provide the complete new content for the file.\n";

/// Name of the patch tool that makes the fallback guidance unnecessary.
const APPLY_PATCH_TOOL: &str = "apply_patch";

/// Everything needed to talk to the model for one request.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub input: Vec<ResponseItem>,
    pub tools: Vec<ToolSpec>,
    pub parallel_tool_calls: bool,
    base_instructions_override: Option<String>,
    output_schema: Option<Value>,
}

impl Prompt {
    pub fn new(
        input: Vec<ResponseItem>,
        tools: Vec<ToolSpec>,
        parallel_tool_calls: bool,
        base_instructions_override: Option<String>,
        output_schema: Option<Value>,
    ) -> Self {
        Self {
            input,
            tools,
            parallel_tool_calls,
            base_instructions_override,
            output_schema,
        }
    }

    /// Complete instruction text for `model`.
    ///
    /// Starts from the override (or the family's base instructions), then
    /// appends the output-schema block and the apply-patch fallback when they
    /// apply.
    pub fn full_instructions(&self, model: &ModelFamily) -> String {
        let base = self
            .base_instructions_override
            .as_deref()
            .unwrap_or(&model.base_instructions);
        let mut out = base.trim_end().to_string();

        if let Some(schema) = &self.output_schema {
            let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
            out.push_str(OUTPUT_SCHEMA_PREAMBLE);
            out.push_str(&pretty);
            out.push_str("\n```\n");
        }

        if model.needs_special_apply_patch_instructions
            && !self.tools.iter().any(|t| t.name == APPLY_PATCH_TOOL)
        {
            out.push_str(APPLY_PATCH_FALLBACK);
        }

        out
    }

    /// The transcript with the most recent user message wrapped in
    /// `<user_instructions>` tags. Every other item is returned unchanged.
    pub fn formatted_input(&self) -> Vec<ResponseItem> {
        let last_user = self.input.iter().rposition(ResponseItem::is_user_message);

        self.input
            .iter()
            .enumerate()
            .map(|(idx, item)| match item {
                ResponseItem::Message { role, content } if Some(idx) == last_user => {
                    ResponseItem::Message {
                        role: role.clone(),
                        content: format!("<user_instructions>\n{content}\n</user_instructions>"),
                    }
                }
                other => other.clone(),
            })
            .collect()
    }
}

/// Assemble a [`Prompt`] from the turn context and the transcript.
///
/// The tool list is the configured tools followed by any external tools, in
/// order and without de-duplication.
pub fn build_prompt(turn: &TurnContext, input: Vec<ResponseItem>) -> Prompt {
    let tools = if turn.external_tools().is_empty() {
        turn.tools().to_vec()
    } else {
        turn.tools()
            .iter()
            .chain(turn.external_tools())
            .cloned()
            .collect()
    };

    Prompt::new(
        input,
        tools,
        turn.model_family().supports_parallel_tool_calls,
        turn.base_instructions_override().map(str::to_string),
        turn.final_output_json_schema().cloned(),
    )
}

/// Map a prompt onto the ordered message list for the chat API.
///
/// # Errors
///
/// [`PromptError::EmptyInput`] when there is no transcript, and
/// [`PromptError::InvalidState`] when the transcript does not open with a
/// user message.
pub fn build_messages_for_chat_api(
    prompt: &Prompt,
    model: &ModelFamily,
) -> Result<Vec<ChatMessage>, PromptError> {
    let formatted = prompt.formatted_input();
    let Some((first, rest)) = formatted.split_first() else {
        return Err(PromptError::EmptyInput);
    };

    let ResponseItem::Message { role, content } = first else {
        return Err(PromptError::InvalidState(
            "Conversation history must start with a user message.".to_string(),
        ));
    };
    if role != USER_ROLE {
        return Err(PromptError::InvalidState(
            "Conversation history must start with a user message.".to_string(),
        ));
    }

    let instructions = prompt.full_instructions(model);
    let instructions = instructions.trim_end();
    let opening = if instructions.trim().is_empty() {
        content.clone()
    } else {
        format!("{instructions}\n\n{content}")
    };

    let mut messages = Vec::with_capacity(formatted.len());
    messages.push(ChatMessage::text(USER_ROLE, opening));
    messages.extend(rest.iter().map(to_wire_message));
    Ok(messages)
}

fn to_wire_message(item: &ResponseItem) -> ChatMessage {
    match item {
        ResponseItem::Message { role, content } => {
            let role = if role == "assistant" { MODEL_ROLE } else { role.as_str() };
            ChatMessage::text(role, content.clone())
        }
        ResponseItem::FunctionCall { name, arguments } => ChatMessage {
            role: MODEL_ROLE.to_string(),
            parts: vec![Part::FunctionCall {
                name: name.clone(),
                args: arguments.clone(),
            }],
        },
        ResponseItem::FunctionCallOutput { name, output } => ChatMessage {
            role: TOOL_ROLE.to_string(),
            parts: vec![Part::FunctionResponse {
                name: name.clone(),
                response: json!({ "output": output }),
            }],
        },
        ResponseItem::Reasoning { content } => ChatMessage::text(MODEL_ROLE, content.clone()),
    }
}
