//! Turn-level agent state and its explicit transition rules.
//!
//! ```text
//! Idle -> Initializing -> Thinking -> Executing -> {Thinking | AwaitingApproval | Idle}
//! AwaitingApproval -> Executing (approve) | Thinking | Idle (deny / cancel)
//! any -> Error
//! ```
//!
//! `Thinking -> Idle` is also allowed: a model reply with no tool calls ends
//! the turn. A new turn starts from `Idle` or `Error`.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::approval::ReviewDecision;
use crate::error::AgentError;

/// Unique token tying an approval decision to the request that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ApprovalId(String);

impl ApprovalId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reason shown when the caller does not supply one.
pub fn default_approval_reason(tool_name: &str) -> String {
    format!("Tool '{tool_name}' wants to perform an action that may modify your project.")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Initializing {
        message: String,
    },
    Thinking {
        thought: String,
    },
    Executing {
        plan: Vec<String>,
        current_step_index: usize,
    },
    AwaitingApproval {
        id: ApprovalId,
        tool_name: String,
        tool_args: Value,
        reason: String,
    },
    Error {
        message: String,
    },
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            AgentState::Idle => "Idle",
            AgentState::Initializing { .. } => "Initializing",
            AgentState::Thinking { .. } => "Thinking",
            AgentState::Executing { .. } => "Executing",
            AgentState::AwaitingApproval { .. } => "AwaitingApproval",
            AgentState::Error { .. } => "Error",
        }
    }

    /// Whether the UI may accept a new user prompt.
    pub fn accepts_user_input(&self) -> bool {
        matches!(self, AgentState::Idle | AgentState::Error { .. })
    }
}

/// Owns the current [`AgentState`] and rejects transitions the lifecycle
/// does not allow. One instance per session; not shared across tasks.
#[derive(Debug)]
pub struct AgentStateMachine {
    state: AgentState,
    issued_approval_ids: HashSet<ApprovalId>,
    /// Execution progress to restore when an approval is granted.
    suspended: Option<(Vec<String>, usize)>,
    observer: Option<UnboundedSender<AgentState>>,
}

impl Default for AgentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentStateMachine {
    pub fn new() -> Self {
        Self {
            state: AgentState::Idle,
            issued_approval_ids: HashSet::new(),
            suspended: None,
            observer: None,
        }
    }

    /// Send every new state to `observer`. Send errors are ignored; the
    /// receiver may have gone away.
    pub fn with_observer(mut self, observer: UnboundedSender<AgentState>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Move to `next` if the lifecycle allows it.
    pub fn transition(&mut self, next: AgentState) -> Result<(), AgentError> {
        if !is_allowed(&self.state, &next) {
            return Err(AgentError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.set(next);
        Ok(())
    }

    /// Start a new turn. Only valid from `Idle` or `Error`.
    pub fn begin_turn(&mut self, message: impl Into<String>) -> Result<(), AgentError> {
        self.transition(AgentState::Initializing {
            message: message.into(),
        })
    }

    pub fn think(&mut self, thought: impl Into<String>) -> Result<(), AgentError> {
        self.transition(AgentState::Thinking {
            thought: thought.into(),
        })
    }

    /// Enter or advance `Executing` at step `index` of `plan`.
    pub fn execute_step(&mut self, plan: &[String], index: usize) -> Result<(), AgentError> {
        self.transition(AgentState::Executing {
            plan: plan.to_vec(),
            current_step_index: index,
        })
    }

    /// Pause execution until the user decides on `tool_name`.
    ///
    /// `id` must never have been used before in this session.
    pub fn await_approval(
        &mut self,
        id: ApprovalId,
        tool_name: &str,
        tool_args: Value,
        reason: Option<String>,
    ) -> Result<(), AgentError> {
        if self.issued_approval_ids.contains(&id) {
            return Err(AgentError::StaleApproval { id: id.to_string() });
        }
        let suspended = match &self.state {
            AgentState::Executing {
                plan,
                current_step_index,
            } => Some((plan.clone(), *current_step_index)),
            _ => None,
        };
        self.transition(AgentState::AwaitingApproval {
            id: id.clone(),
            tool_name: tool_name.to_string(),
            reason: reason.unwrap_or_else(|| default_approval_reason(tool_name)),
            tool_args,
        })?;
        self.issued_approval_ids.insert(id);
        self.suspended = suspended;
        Ok(())
    }

    /// Apply the user's decision for the pending approval `id`.
    ///
    /// Approval resumes `Executing` where it left off; a denial moves to
    /// `Thinking`. A decision for any other id is rejected untouched.
    pub fn resolve_approval(
        &mut self,
        id: &ApprovalId,
        decision: ReviewDecision,
    ) -> Result<(), AgentError> {
        let (pending_id, tool_name) = match &self.state {
            AgentState::AwaitingApproval { id, tool_name, .. } => (id.clone(), tool_name.clone()),
            _ => return Err(AgentError::StaleApproval { id: id.to_string() }),
        };
        if &pending_id != id {
            return Err(AgentError::StaleApproval { id: id.to_string() });
        }

        let (plan, index) = self.suspended.take().unwrap_or_default();
        if decision.is_approved() {
            self.transition(AgentState::Executing {
                plan,
                current_step_index: index,
            })
        } else {
            self.think(format!("Denied '{tool_name}'."))
        }
    }

    /// Move to `Error`. Always allowed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.suspended = None;
        self.set(AgentState::Error {
            message: message.into(),
        });
    }

    /// Return to `Idle` at the end of a turn.
    pub fn finish(&mut self) -> Result<(), AgentError> {
        self.suspended = None;
        self.transition(AgentState::Idle)
    }

    fn set(&mut self, next: AgentState) {
        tracing::debug!(from = self.state.name(), to = next.name(), "Agent state transition");
        self.state = next;
        if let Some(observer) = &self.observer {
            let _ = observer.send(self.state.clone());
        }
    }
}

fn is_allowed(from: &AgentState, to: &AgentState) -> bool {
    use AgentState::*;
    match (from, to) {
        (_, Error { .. }) => true,
        (Idle | Error { .. }, Initializing { .. }) => true,
        (Error { .. }, Idle) => true,
        (Initializing { .. }, Initializing { .. } | Thinking { .. }) => true,
        (Thinking { .. }, Thinking { .. } | Executing { .. } | Idle) => true,
        (
            Executing {
                plan,
                current_step_index,
            },
            Executing {
                plan: next_plan,
                current_step_index: next_index,
            },
        ) => plan != next_plan || next_index >= current_step_index,
        (Executing { .. }, Thinking { .. } | AwaitingApproval { .. } | Idle) => true,
        (AwaitingApproval { .. }, Executing { .. } | Thinking { .. } | Idle) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan() -> Vec<String> {
        vec!["shell".to_string(), "update_file".to_string()]
    }

    fn machine_executing() -> AgentStateMachine {
        let mut m = AgentStateMachine::new();
        m.begin_turn("Preparing agent...").unwrap();
        m.think("planning").unwrap();
        m.execute_step(&plan(), 0).unwrap();
        m
    }

    #[test]
    fn starts_idle_and_accepts_input() {
        let m = AgentStateMachine::new();
        assert_eq!(m.state(), &AgentState::Idle);
        assert!(m.state().accepts_user_input());
    }

    #[test]
    fn cannot_skip_initialization() {
        let mut m = AgentStateMachine::new();
        let err = m.think("too early").unwrap_err();
        assert!(matches!(
            err,
            AgentError::InvalidTransition {
                from: "Idle",
                to: "Thinking"
            }
        ));
    }

    #[test]
    fn step_index_never_moves_backwards() {
        let mut m = machine_executing();
        m.execute_step(&plan(), 1).unwrap();
        assert!(m.execute_step(&plan(), 0).is_err());
        // A new plan starts a fresh execution.
        m.execute_step(&["read_file".to_string()], 0).unwrap();
    }

    #[test]
    fn approval_resumes_execution_at_same_step() {
        let mut m = machine_executing();
        m.execute_step(&plan(), 1).unwrap();
        let id = ApprovalId::new();
        m.await_approval(id.clone(), "update_file", json!({"path": "a"}), None)
            .unwrap();

        match m.state() {
            AgentState::AwaitingApproval { reason, .. } => {
                assert_eq!(reason, &default_approval_reason("update_file"));
            }
            other => panic!("Expected AwaitingApproval, got: {other:?}"),
        }

        m.resolve_approval(&id, ReviewDecision::Approved).unwrap();
        assert_eq!(
            m.state(),
            &AgentState::Executing {
                plan: plan(),
                current_step_index: 1
            }
        );
    }

    #[test]
    fn denial_moves_to_thinking() {
        let mut m = machine_executing();
        let id = ApprovalId::new();
        m.await_approval(id.clone(), "shell", json!({}), Some("rm".into()))
            .unwrap();
        m.resolve_approval(&id, ReviewDecision::Denied).unwrap();
        assert!(matches!(m.state(), AgentState::Thinking { .. }));
    }

    #[test]
    fn mismatched_approval_id_is_rejected() {
        let mut m = machine_executing();
        let id = ApprovalId::new();
        m.await_approval(id, "shell", json!({}), None).unwrap();

        let err = m
            .resolve_approval(&ApprovalId::new(), ReviewDecision::Approved)
            .unwrap_err();
        assert!(matches!(err, AgentError::StaleApproval { .. }));
        assert!(matches!(m.state(), AgentState::AwaitingApproval { .. }));
    }

    #[test]
    fn approval_ids_cannot_be_reused() {
        let mut m = machine_executing();
        let id = ApprovalId::new();
        m.await_approval(id.clone(), "shell", json!({}), None).unwrap();
        m.resolve_approval(&id, ReviewDecision::Approved).unwrap();

        assert!(m.await_approval(id, "shell", json!({}), None).is_err());
    }

    #[test]
    fn sequential_approvals_get_distinct_ids() {
        fn pending_id(m: &AgentStateMachine) -> ApprovalId {
            match m.state() {
                AgentState::AwaitingApproval { id, .. } => id.clone(),
                other => panic!("expected AwaitingApproval, got {other:?}"),
            }
        }

        let mut m = machine_executing();
        m.await_approval(ApprovalId::new(), "shell", json!({"command": "a"}), None)
            .unwrap();
        let first = pending_id(&m);
        m.resolve_approval(&first, ReviewDecision::Approved).unwrap();

        m.execute_step(&plan(), 1).unwrap();
        m.await_approval(ApprovalId::new(), "shell", json!({"command": "b"}), None)
            .unwrap();
        let second = pending_id(&m);

        assert_ne!(first, second);
        assert!(m.resolve_approval(&first, ReviewDecision::Approved).is_err());
        m.resolve_approval(&second, ReviewDecision::Approved).unwrap();
    }

    #[test]
    fn any_state_can_fail_and_restart() {
        let mut m = machine_executing();
        m.fail("boom");
        assert!(m.state().accepts_user_input());
        m.begin_turn("again").unwrap();
    }

    #[test]
    fn observer_sees_every_transition() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut m = AgentStateMachine::new().with_observer(tx);
        m.begin_turn("go").unwrap();
        m.think("hmm").unwrap();
        m.finish().unwrap();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["Initializing", "Thinking", "Idle"]);
    }
}
