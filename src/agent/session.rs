//! Drives one user turn: prompt, model call, tool execution, repeat.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::approval::ApprovalGate;
use super::executor::{Executor, ToolCall};
use super::logging::{LogEntry, SessionLogger, now_iso};
use super::state::{AgentState, AgentStateMachine};
use crate::config::AppConfig;
use crate::config::merge::DEFAULT_MAX_STEPS;
use crate::diff::{DiffTracker, FileChange, format_diff_summary};
use crate::error::AgentError;
use crate::prompt::{
    ChatMessage, InstructionStore, ModelFamily, ResponseItem, ToolSpec, TurnContext,
    build_messages_for_chat_api, build_prompt,
};

/// One request to the model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub parallel_tool_calls: bool,
}

/// Whatever actually talks to the model.
///
/// Returns the new transcript items (messages, function calls, reasoning)
/// produced by one completion.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<Vec<ResponseItem>, AgentError>;
}

/// What a finished turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Last assistant message of the turn, if any.
    pub final_message: Option<String>,
    pub changes: BTreeMap<PathBuf, FileChange>,
    pub summary: String,
    /// Model round-trips used.
    pub steps: usize,
}

pub struct Session {
    model_family: ModelFamily,
    transport: Arc<dyn LlmTransport>,
    executor: Executor,
    machine: AgentStateMachine,
    tracker: DiffTracker,
    history: Vec<ResponseItem>,
    external_tools: Vec<ToolSpec>,
    base_instructions_override: Option<String>,
    output_schema: Option<Value>,
    logger: Option<SessionLogger>,
    max_steps: usize,
    turns: u64,
}

impl Session {
    /// The executor's parallelism follows the model family.
    pub fn new(
        model_family: ModelFamily,
        transport: Arc<dyn LlmTransport>,
        executor: Executor,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        let executor = executor.with_parallel_tool_calls(model_family.supports_parallel_tool_calls);
        Self {
            model_family,
            transport,
            executor,
            machine: AgentStateMachine::new(),
            tracker: DiffTracker::new(project_root),
            history: Vec::new(),
            external_tools: Vec::new(),
            base_instructions_override: None,
            output_schema: None,
            logger: None,
            max_steps: DEFAULT_MAX_STEPS,
            turns: 0,
        }
    }

    /// Build a session from resolved configuration.
    ///
    /// Applies the model family, step budget and instructions file, and
    /// opens a replay log under `config.log_dir`.
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn LlmTransport>,
        executor: Executor,
        instructions: &InstructionStore,
    ) -> Result<Self, AgentError> {
        let base_instructions = config.base_instructions_override(instructions)?;
        let logger = SessionLogger::new(&config.log_dir)?;
        tracing::info!(log = %logger.log_path().display(), "Session log opened");

        Ok(
            Self::new(config.model_family(), transport, executor, config.project_root.clone())
                .with_max_steps(config.max_steps)
                .with_base_instructions_override(base_instructions)
                .with_logger(logger),
        )
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_external_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.external_tools = tools;
        self
    }

    pub fn with_base_instructions_override(mut self, instructions: Option<String>) -> Self {
        self.base_instructions_override = instructions;
        self
    }

    pub fn with_output_schema(mut self, schema: Option<Value>) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn with_state_observer(mut self, observer: UnboundedSender<AgentState>) -> Self {
        self.machine = std::mem::take(&mut self.machine).with_observer(observer);
        self
    }

    /// Attach a replay logger and record the session start.
    pub fn with_logger(mut self, logger: SessionLogger) -> Self {
        self.logger = Some(logger);
        let model = self.model_family.id.clone();
        let root = self.tracker.project_root().to_path_buf();
        if let Some(logger) = self.logger.as_mut() {
            if let Err(e) = logger.log_session_start(&model, &root) {
                tracing::warn!(error = %e, "Failed to write session log");
            }
        }
        self
    }

    pub fn state(&self) -> &AgentState {
        self.machine.state()
    }

    pub fn history(&self) -> &[ResponseItem] {
        &self.history
    }

    /// Gate to answer approval requests from another task.
    pub fn approvals(&self) -> Arc<ApprovalGate> {
        Arc::clone(self.executor.approvals())
    }

    /// Run one user turn to completion.
    ///
    /// Any error leaves the machine in `Error` with the error text; the
    /// next turn may start from there.
    pub async fn run_turn(&mut self, user_message: &str) -> Result<TurnOutcome, AgentError> {
        self.machine.begin_turn("Preparing agent...")?;
        self.turns += 1;
        self.tracker.clear();
        tracing::info!(turn = self.turns, "Starting turn");

        self.history.push(ResponseItem::user(user_message));
        self.log(LogEntry::UserMessage {
            timestamp: now_iso(),
            turn: self.turns,
            content: user_message.to_string(),
        });

        match self.drive().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(turn = self.turns, error = %e, "Turn failed");
                self.machine.fail(e.to_string());
                self.approvals().cancel_all();
                self.log(LogEntry::Error {
                    timestamp: now_iso(),
                    turn: self.turns,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Record the end of the session in the replay log.
    pub fn close(mut self, reason: &str) {
        self.approvals().cancel_all();
        if let Some(logger) = self.logger.as_mut() {
            if let Err(e) = logger.log_session_end(self.turns, reason) {
                tracing::warn!(error = %e, "Failed to write session log");
            }
        }
    }

    async fn drive(&mut self) -> Result<TurnOutcome, AgentError> {
        let mut final_message = None;

        for step in 0..self.max_steps {
            let thought = if step == 0 { "Thinking..." } else { "Reviewing tool results..." };
            self.machine.think(thought)?;

            let request = self.next_request()?;
            let items = self.transport.complete(request).await?;

            let mut calls = Vec::new();
            for item in items {
                match &item {
                    ResponseItem::Message { content, .. } => {
                        self.log(LogEntry::AssistantText {
                            timestamp: now_iso(),
                            turn: self.turns,
                            content: content.clone(),
                        });
                        final_message = Some(content.clone());
                    }
                    ResponseItem::FunctionCall { name, arguments } => {
                        self.log(LogEntry::ToolCall {
                            timestamp: now_iso(),
                            turn: self.turns,
                            fn_name: name.clone(),
                            fn_arguments: arguments.clone(),
                        });
                        calls.push(ToolCall::new(name.clone(), arguments.clone()));
                    }
                    _ => {}
                }
                self.history.push(item);
            }

            if calls.is_empty() {
                return self.finish_turn(final_message, step + 1);
            }

            let executed = self
                .executor
                .execute(&calls, &mut self.machine, &mut self.tracker)
                .await?;
            for call in executed {
                self.log(LogEntry::ToolResult {
                    timestamp: now_iso(),
                    turn: self.turns,
                    fn_name: call.name.clone(),
                    success: call.result.success,
                    message: call.result.message.clone(),
                    error: call.result.error_details.clone(),
                });
                self.history.push(call.to_response_item());
            }
        }

        Err(AgentError::MaxStepsExceeded {
            max_steps: self.max_steps,
        })
    }

    fn next_request(&self) -> Result<ModelRequest, AgentError> {
        let turn = TurnContext::new(self.model_family.clone(), self.executor.tool_specs())
            .with_external_tools(self.external_tools.clone())
            .with_base_instructions_override(self.base_instructions_override.clone())
            .with_output_schema(self.output_schema.clone());
        let prompt = build_prompt(&turn, self.history.clone());
        let messages = build_messages_for_chat_api(&prompt, &self.model_family)?;
        Ok(ModelRequest {
            messages,
            tools: prompt.tools,
            parallel_tool_calls: prompt.parallel_tool_calls,
        })
    }

    fn finish_turn(
        &mut self,
        final_message: Option<String>,
        steps: usize,
    ) -> Result<TurnOutcome, AgentError> {
        let changes = self.tracker.generate_changes();
        let summary = format_diff_summary(&changes);
        tracing::info!(turn = self.turns, steps, %summary, "Turn finished");

        self.log(LogEntry::TurnDiff {
            timestamp: now_iso(),
            turn: self.turns,
            summary: summary.clone(),
            files: changes.keys().map(|p| p.display().to_string()).collect(),
        });
        self.machine.finish()?;

        Ok(TurnOutcome {
            final_message,
            changes,
            summary,
            steps,
        })
    }

    /// Logging failures never fail the turn.
    fn log(&mut self, entry: LogEntry) {
        if let Some(logger) = self.logger.as_mut() {
            if let Err(e) = logger.log_event(&entry) {
                tracing::warn!(error = %e, "Failed to write session log");
            }
        }
    }
}
