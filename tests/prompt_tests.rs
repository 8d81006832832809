use pretty_assertions::assert_eq;
use serde_json::json;
use tandem::error::PromptError;
use tandem::prompt::{
    ChatMessage, ModelFamily, Part, ResponseItem, ToolSpec, TurnContext,
    build_messages_for_chat_api, build_prompt,
};

fn family(needs_patch_guidance: bool) -> ModelFamily {
    ModelFamily {
        id: "test-model".into(),
        base_instructions: "You are a careful engineer.\n\n".into(),
        supports_parallel_tool_calls: false,
        needs_special_apply_patch_instructions: needs_patch_guidance,
    }
}

fn shell_spec() -> ToolSpec {
    ToolSpec::new("shell", "Run a command", json!({"type": "object"}))
}

// ============================================================
// Salient user input
// ============================================================

#[test]
fn test_only_last_user_message_is_wrapped() {
    let turn = TurnContext::new(family(false), vec![shell_spec()]);
    let prompt = build_prompt(
        &turn,
        vec![
            ResponseItem::user("Earlier"),
            ResponseItem::assistant("Ack"),
            ResponseItem::user("Final"),
        ],
    );

    assert_eq!(
        prompt.formatted_input(),
        vec![
            ResponseItem::user("Earlier"),
            ResponseItem::assistant("Ack"),
            ResponseItem::user("<user_instructions>\nFinal\n</user_instructions>"),
        ]
    );
    // The stored transcript itself is untouched.
    assert_eq!(prompt.input[2], ResponseItem::user("Final"));
}

#[test]
fn test_tool_output_after_last_user_message_is_untouched() {
    let turn = TurnContext::new(family(false), vec![shell_spec()]);
    let output = ResponseItem::FunctionCallOutput {
        name: "shell".into(),
        output: json!({"success": true, "message": "ok"}),
    };
    let prompt = build_prompt(&turn, vec![ResponseItem::user("Go"), output.clone()]);
    assert_eq!(prompt.formatted_input()[1], output);
}

// ============================================================
// Wire messages
// ============================================================

#[test]
fn test_instructions_merge_into_first_user_message() {
    let turn = TurnContext::new(family(false), vec![shell_spec()]);
    let prompt = build_prompt(
        &turn,
        vec![ResponseItem::user("Hello"), ResponseItem::assistant("Hi")],
    );
    let model = turn.model_family();

    let messages = build_messages_for_chat_api(&prompt, model).unwrap();
    assert_eq!(
        messages,
        vec![
            ChatMessage::text(
                "user",
                "You are a careful engineer.\n\n<user_instructions>\nHello\n</user_instructions>"
            ),
            ChatMessage::text("model", "Hi"),
        ]
    );
}

#[test]
fn test_function_calls_and_outputs_map_to_parts() {
    let turn = TurnContext::new(family(false), vec![shell_spec()]);
    let prompt = build_prompt(
        &turn,
        vec![
            ResponseItem::user("List files"),
            ResponseItem::FunctionCall {
                name: "shell".into(),
                arguments: json!({"command": "ls"}),
            },
            ResponseItem::FunctionCallOutput {
                name: "shell".into(),
                output: json!({"success": true, "message": "a.rs"}),
            },
        ],
    );

    let messages = build_messages_for_chat_api(&prompt, turn.model_family()).unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(
        messages[1],
        ChatMessage {
            role: "model".into(),
            parts: vec![Part::FunctionCall {
                name: "shell".into(),
                args: json!({"command": "ls"}),
            }],
        }
    );
    assert_eq!(
        messages[2],
        ChatMessage {
            role: "tool".into(),
            parts: vec![Part::FunctionResponse {
                name: "shell".into(),
                response: json!({"output": {"success": true, "message": "a.rs"}}),
            }],
        }
    );
}

#[test]
fn test_empty_transcript_is_rejected() {
    let turn = TurnContext::new(family(false), Vec::new());
    let prompt = build_prompt(&turn, Vec::new());
    assert_eq!(
        build_messages_for_chat_api(&prompt, turn.model_family()),
        Err(PromptError::EmptyInput)
    );
}

#[test]
fn test_transcript_starting_with_tool_output_is_rejected() {
    let turn = TurnContext::new(family(false), Vec::new());
    let prompt = build_prompt(
        &turn,
        vec![ResponseItem::FunctionCallOutput {
            name: "shell".into(),
            output: json!({}),
        }],
    );
    assert!(matches!(
        build_messages_for_chat_api(&prompt, turn.model_family()),
        Err(PromptError::InvalidState(_))
    ));
}

// ============================================================
// Turn context
// ============================================================

#[test]
fn test_override_schema_and_patch_guidance_compose() {
    let turn = TurnContext::new(family(true), vec![shell_spec()])
        .with_base_instructions_override(Some("Custom rules.".into()))
        .with_output_schema(Some(json!({"type": "object", "required": ["answer"]})));
    let prompt = build_prompt(&turn, vec![ResponseItem::user("Q")]);

    let text = prompt.full_instructions(turn.model_family());
    assert!(text.starts_with("Custom rules.\n\n[Output Schema]\n"));
    let schema_at = text.find("\"required\"").unwrap();
    let patch_at = text.find("[Special Instructions]").unwrap();
    assert!(schema_at < patch_at, "schema block comes before the patch guidance");
    assert!(!text.contains("careful engineer"));
}

#[test]
fn test_parallel_flag_is_carried_from_model_family() {
    let mut model = family(false);
    model.supports_parallel_tool_calls = true;
    let prompt = build_prompt(&TurnContext::new(model, Vec::new()), Vec::new());
    assert!(prompt.parallel_tool_calls);
}

#[test]
fn test_transcript_json_round_trip_shape() {
    let raw = r#"[
        {"type": "message", "role": "user", "content": "Hi"},
        {"type": "function_call", "name": "shell", "arguments": {"command": "ls"}},
        {"type": "reasoning", "content": "thinking"}
    ]"#;
    let items: Vec<ResponseItem> = serde_json::from_str(raw).unwrap();
    assert_eq!(items[0], ResponseItem::user("Hi"));
    assert!(matches!(items[2], ResponseItem::Reasoning { .. }));
}
