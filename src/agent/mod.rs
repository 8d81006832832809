//! Agent turn machinery: state, approvals, tools and the session driver.

pub mod approval;
pub mod executor;
pub mod logging;
pub mod session;
pub mod shell_tool;
pub mod state;
pub mod tool_result;
pub mod tools;

pub use approval::{ApprovalGate, ReviewDecision};
pub use executor::{ExecutedCall, Executor, ToolCall};
pub use logging::{LogEntry, SessionLogger};
pub use session::{LlmTransport, ModelRequest, Session, TurnOutcome};
pub use shell_tool::{ShellCommandPayload, ShellToolHandler};
pub use state::{AgentState, AgentStateMachine, ApprovalId};
pub use tool_result::{ExplorationKind, ExplorationMetadata, ToolResult};
pub use tools::{ToolHandler, ToolRouter, default_router};
