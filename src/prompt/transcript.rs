//! Transcript items and the wire messages they are mapped to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of the human side of the conversation.
pub const USER_ROLE: &str = "user";
/// Role used for the model's own turns, tool calls and reasoning.
pub const MODEL_ROLE: &str = "model";
/// Role carrying tool responses back to the model.
pub const TOOL_ROLE: &str = "tool";

/// One entry of the conversation, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Message { role: String, content: String },
    FunctionCall { name: String, arguments: Value },
    FunctionCallOutput { name: String, output: Value },
    Reasoning { content: String },
}

impl ResponseItem {
    pub fn user(content: impl Into<String>) -> Self {
        ResponseItem::Message {
            role: USER_ROLE.to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ResponseItem::Message {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self, ResponseItem::Message { role, .. } if role == USER_ROLE)
    }
}

/// A single content part of a wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    FunctionCall { name: String, args: Value },
    FunctionResponse { name: String, response: Value },
}

/// A message in the shape the chat API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub parts: Vec<Part>,
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// Text of the first part, if it is a text part.
    pub fn first_text(&self) -> Option<&str> {
        match self.parts.first() {
            Some(Part::Text { text }) => Some(text),
            _ => None,
        }
    }
}
