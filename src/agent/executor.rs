//! Runs a batch of model tool calls: approval, diff snapshots, dispatch.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use super::approval::{ApprovalGate, ReviewDecision, denial_message};
use super::state::{AgentStateMachine, ApprovalId};
use super::tool_result::ToolResult;
use super::tools::{ToolHandler, ToolRouter, unknown_tool};
use crate::diff::DiffTracker;
use crate::error::AgentError;
use crate::prompt::{ResponseItem, ToolSpec};

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// A finished call and its result.
#[derive(Debug, Clone)]
pub struct ExecutedCall {
    pub name: String,
    pub result: ToolResult,
}

impl ExecutedCall {
    /// The transcript item that hands this result back to the model.
    pub fn to_response_item(&self) -> ResponseItem {
        ResponseItem::FunctionCallOutput {
            name: self.name.clone(),
            output: self.result.to_result_map(),
        }
    }
}

pub struct Executor {
    router: ToolRouter,
    approvals: Arc<ApprovalGate>,
    parallel_tool_calls: bool,
}

impl Executor {
    pub fn new(router: ToolRouter) -> Self {
        Self {
            router,
            approvals: Arc::new(ApprovalGate::new()),
            parallel_tool_calls: true,
        }
    }

    /// Run consecutive read-only calls concurrently when `enabled`.
    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn with_approvals(mut self, approvals: Arc<ApprovalGate>) -> Self {
        self.approvals = approvals;
        self
    }

    /// Gate shared with whoever answers approval requests.
    pub fn approvals(&self) -> &Arc<ApprovalGate> {
        &self.approvals
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.router.specs()
    }

    /// Execute `calls` in order and return one result per call, in the
    /// order the calls were issued.
    ///
    /// Dangerous calls suspend in `AwaitingApproval` until the gate
    /// receives a decision. Only state-machine violations are errors; tool
    /// failures and denials come back as failed [`ToolResult`]s.
    pub async fn execute(
        &self,
        calls: &[ToolCall],
        machine: &mut AgentStateMachine,
        tracker: &mut DiffTracker,
    ) -> Result<Vec<ExecutedCall>, AgentError> {
        let plan: Vec<String> = calls.iter().map(|c| c.name.clone()).collect();
        let mut executed = Vec::with_capacity(calls.len());

        let mut index = 0;
        while index < calls.len() {
            let batch_end = self.parallel_batch_end(calls, index);
            machine.execute_step(&plan, index)?;

            if batch_end > index + 1 {
                tracing::debug!(
                    start = index,
                    end = batch_end,
                    "Running read-only tool calls concurrently"
                );
                let batch = &calls[index..batch_end];
                for call in batch {
                    tracing::info!(tool = %call.name, "Executing tool call");
                    if let Some(handler) = self.router.get(&call.name) {
                        snapshot_touched(&**handler, &call.arguments, tracker);
                    }
                }
                let results = join_all(
                    batch
                        .iter()
                        .map(|call| self.router.dispatch(&call.name, &call.arguments)),
                )
                .await;
                executed.extend(batch.iter().zip(results).map(|(call, result)| {
                    log_result(call, &result);
                    ExecutedCall {
                        name: call.name.clone(),
                        result,
                    }
                }));
                index = batch_end;
                continue;
            }

            let call = &calls[index];
            let result = self.execute_one(call, machine, tracker).await?;
            log_result(call, &result);
            executed.push(ExecutedCall {
                name: call.name.clone(),
                result,
            });
            index += 1;
        }

        Ok(executed)
    }

    /// End (exclusive) of the run of parallel-safe calls starting at `start`.
    fn parallel_batch_end(&self, calls: &[ToolCall], start: usize) -> usize {
        if !self.parallel_tool_calls {
            return start + 1;
        }
        let is_read_only = |call: &ToolCall| {
            self.router
                .get(&call.name)
                .is_some_and(|h| h.is_parallel_safe() && !h.is_potentially_dangerous())
        };
        let run = calls[start..].iter().take_while(|c| is_read_only(*c)).count();
        start + run.max(1)
    }

    async fn execute_one(
        &self,
        call: &ToolCall,
        machine: &mut AgentStateMachine,
        tracker: &mut DiffTracker,
    ) -> Result<ToolResult, AgentError> {
        let Some(handler) = self.router.get(&call.name) else {
            tracing::warn!(tool = %call.name, "Model called an unknown tool");
            return Ok(unknown_tool(&call.name));
        };
        tracing::info!(tool = %call.name, "Executing tool call");

        if handler.is_potentially_dangerous()
            && !self.approvals.is_approved_for_session(&call.name, &call.arguments)
        {
            let decision = self.request_approval(call, machine).await?;
            if !decision.is_approved() {
                return Ok(ToolResult::failure(denial_message(&call.name)));
            }
            if decision == ReviewDecision::ApprovedForSession {
                self.approvals.remember_for_session(&call.name, &call.arguments);
            }
        }

        snapshot_touched(&**handler, &call.arguments, tracker);
        Ok(handler.invoke(&call.arguments).await)
    }

    async fn request_approval(
        &self,
        call: &ToolCall,
        machine: &mut AgentStateMachine,
    ) -> Result<ReviewDecision, AgentError> {
        let id = ApprovalId::new();
        // Register before publishing the state so an immediate answer is not lost.
        let rx = self.approvals.register(id.clone(), &call.name);
        let awaiting = machine.await_approval(id.clone(), &call.name, call.arguments.clone(), None);
        if let Err(e) = awaiting {
            self.approvals.withdraw(&id);
            return Err(e);
        }

        // A dropped sender means the gate went away; treat it as a denial.
        let decision = rx.await.unwrap_or(ReviewDecision::Denied);
        machine.resolve_approval(&id, decision)?;
        Ok(decision)
    }
}

fn snapshot_touched(handler: &dyn ToolHandler, args: &Value, tracker: &mut DiffTracker) {
    for path in handler.touched_paths(args) {
        tracker.snapshot_file(&path);
    }
}

fn log_result(call: &ToolCall, result: &ToolResult) {
    if result.success {
        tracing::debug!(tool = %call.name, "Tool call succeeded");
    } else {
        tracing::info!(tool = %call.name, message = %result.message, "Tool call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::AgentState;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records invocation order; optionally read-only.
    struct Recorder {
        name: &'static str,
        read_only: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    /// Read-only handler that declares the `path` it looks at.
    struct Peek;

    #[async_trait]
    impl ToolHandler for Peek {
        fn name(&self) -> &str {
            "peek"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new("peek", "", json!({}))
        }

        fn is_parallel_safe(&self) -> bool {
            true
        }

        fn touched_paths(&self, args: &Value) -> Vec<PathBuf> {
            args.get("path")
                .and_then(Value::as_str)
                .map(PathBuf::from)
                .into_iter()
                .collect()
        }

        async fn invoke(&self, _args: &Value) -> ToolResult {
            ToolResult::success("peeked")
        }
    }

    #[async_trait]
    impl ToolHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new(self.name, "", json!({}))
        }

        fn is_parallel_safe(&self) -> bool {
            self.read_only
        }

        async fn invoke(&self, args: &Value) -> ToolResult {
            self.log.lock().unwrap().push(format!("{}:{args}", self.name));
            ToolResult::success(format!("{} done", self.name))
        }
    }

    fn thinking_machine() -> AgentStateMachine {
        let mut m = AgentStateMachine::new();
        m.begin_turn("start").unwrap();
        m.think("plan").unwrap();
        m
    }

    fn router_with(log: &Arc<Mutex<Vec<String>>>) -> ToolRouter {
        let mut router = ToolRouter::new();
        for (name, read_only) in [("look", true), ("poke", false)] {
            router.register(Arc::new(Recorder {
                name,
                read_only,
                log: Arc::clone(log),
            }));
        }
        router
    }

    #[tokio::test]
    async fn results_keep_call_order() {
        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(router_with(&log));
        let calls = vec![
            ToolCall::new("look", json!({"n": 1})),
            ToolCall::new("look", json!({"n": 2})),
            ToolCall::new("missing", json!({})),
            ToolCall::new("poke", json!({})),
        ];

        let mut machine = thinking_machine();
        let mut tracker = DiffTracker::new(tmp.path());
        let executed = executor.execute(&calls, &mut machine, &mut tracker).await.unwrap();

        let names: Vec<&str> = executed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["look", "look", "missing", "poke"]);
        assert_eq!(executed[2].result.message, "Unknown function 'missing'");
        assert!(matches!(
            machine.state(),
            AgentState::Executing {
                current_step_index: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn sequential_mode_still_runs_everything() {
        let tmp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(router_with(&log)).with_parallel_tool_calls(false);
        let calls = vec![
            ToolCall::new("look", json!({"n": 1})),
            ToolCall::new("poke", json!({})),
            ToolCall::new("look", json!({"n": 2})),
        ];

        let mut machine = thinking_machine();
        let mut tracker = DiffTracker::new(tmp.path());
        executor.execute(&calls, &mut machine, &mut tracker).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![r#"look:{"n":1}"#, "poke:{}", r#"look:{"n":2}"#]
        );
    }

    #[tokio::test]
    async fn concurrent_batch_still_snapshots_touched_paths() {
        let tmp = TempDir::new().unwrap();
        let mut router = ToolRouter::new();
        router.register(Arc::new(Peek));
        let executor = Executor::new(router);
        let calls = vec![
            ToolCall::new("peek", json!({"path": "a.txt"})),
            ToolCall::new("peek", json!({"path": "b.txt"})),
        ];

        let mut machine = thinking_machine();
        let mut tracker = DiffTracker::new(tmp.path());
        let executed = executor.execute(&calls, &mut machine, &mut tracker).await.unwrap();

        assert_eq!(executed.len(), 2);
        assert!(tracker.is_tracked("a.txt"));
        assert!(tracker.is_tracked("b.txt"));
    }

    #[test]
    fn to_response_item_wraps_result_map() {
        let call = ExecutedCall {
            name: "look".into(),
            result: ToolResult::failure("nope"),
        };
        assert_eq!(
            call.to_response_item(),
            ResponseItem::FunctionCallOutput {
                name: "look".into(),
                output: json!({"success": false, "message": "nope"}),
            }
        );
    }
}
