//! The uniform envelope every tool invocation returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What kind of read-only exploration a tool call performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationKind {
    Read,
    List,
    Search,
}

/// Structured description of an exploratory tool call, for UX bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationMetadata {
    pub kind: ExplorationKind,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_count: Option<usize>,
}

impl ExplorationMetadata {
    pub fn read(items: Vec<String>) -> Self {
        Self::new(ExplorationKind::Read, items)
    }

    pub fn list(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new(ExplorationKind::List, Vec::new())
        }
    }

    pub fn search(query: impl Into<String>, path: Option<String>) -> Self {
        Self {
            query: Some(query.into()),
            path,
            ..Self::new(ExplorationKind::Search, Vec::new())
        }
    }

    pub fn with_match_count(mut self, count: usize) -> Self {
        self.match_count = Some(count);
        self
    }

    pub fn with_entry_count(mut self, count: usize) -> Self {
        self.entry_count = Some(count);
        self
    }

    fn new(kind: ExplorationKind, items: Vec<String>) -> Self {
        Self {
            kind,
            items,
            query: None,
            path: None,
            match_count: None,
            entry_count: None,
        }
    }
}

/// Outcome of a single tool call.
///
/// `message` is what the model and the user see, so it always summarizes the
/// outcome, failures included. `data` is an opaque tool-owned payload
/// (usually JSON) carried as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    pub data: Option<String>,
    pub error_details: Option<String>,
    pub exploration: Option<ExplorationMetadata>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(true, message.into(), "Tool completed successfully.")
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(false, message.into(), "Tool failed.")
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    pub fn with_exploration(mut self, exploration: Option<ExplorationMetadata>) -> Self {
        self.exploration = exploration;
        self
    }

    /// Render the envelope as the JSON object handed back to the model.
    ///
    /// Absent optional fields are omitted rather than sent as `null`.
    pub fn to_result_map(&self) -> Value {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(self.success));
        map.insert("message".into(), Value::String(self.message.clone()));
        if let Some(data) = &self.data {
            map.insert("data".into(), Value::String(data.clone()));
        }
        if let Some(details) = &self.error_details {
            map.insert("error_details".into(), Value::String(details.clone()));
        }
        if let Some(exploration) = &self.exploration {
            if let Ok(value) = serde_json::to_value(exploration) {
                map.insert("exploration".into(), value);
            }
        }
        Value::Object(map)
    }

    fn new(success: bool, message: String, fallback: &str) -> Self {
        let message = if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        };
        Self {
            success,
            message,
            data: None,
            error_details: None,
            exploration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_fix_the_success_flag() {
        assert!(ToolResult::success("ok").success);
        let failed = ToolResult::failure("nope").with_error_details("stderr text");
        assert!(!failed.success);
        assert_eq!(failed.error_details.as_deref(), Some("stderr text"));
    }

    #[test]
    fn blank_message_gets_a_fallback() {
        assert_eq!(ToolResult::failure("  ").message, "Tool failed.");
        assert_eq!(ToolResult::success("").message, "Tool completed successfully.");
    }

    #[test]
    fn data_round_trips_as_a_string() {
        let payload = r#"{"exit_code":0}"#;
        let result = ToolResult::success("done").with_data(payload);
        assert_eq!(result.data.as_deref(), Some(payload));
        assert_eq!(result.to_result_map()["data"], json!(payload));
    }

    #[test]
    fn result_map_omits_absent_fields() {
        let map = ToolResult::success("listed")
            .with_exploration(Some(ExplorationMetadata::list("src").with_entry_count(4)))
            .to_result_map();
        assert_eq!(
            map,
            json!({
                "success": true,
                "message": "listed",
                "exploration": {"kind": "list", "items": [], "path": "src", "entry_count": 4}
            })
        );
    }
}
