//! Approval gate for potentially dangerous tool calls.
//!
//! Each request gets a fresh [`ApprovalId`] and a oneshot channel. The
//! front end answers with [`ApprovalGate::submit`]; a decision for an id
//! that is not pending is dropped with a warning.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use super::state::ApprovalId;

/// The user's answer to an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    /// Approve this call and every identical call for the rest of the session.
    ApprovedForSession,
    Denied,
}

impl ReviewDecision {
    pub fn is_approved(self) -> bool {
        matches!(self, ReviewDecision::Approved | ReviewDecision::ApprovedForSession)
    }
}

/// Message returned to the model when the user refuses a call.
pub fn denial_message(tool_name: &str) -> String {
    format!("User denied the request for '{tool_name}'.")
}

#[derive(Debug, Default)]
struct GateState {
    pending: HashMap<ApprovalId, (String, oneshot::Sender<ReviewDecision>)>,
    approved_for_session: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct ApprovalGate {
    inner: Mutex<GateState>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key used to remember "approved for session" decisions.
    ///
    /// `serde_json` object maps are ordered, so equal arguments always
    /// serialize identically.
    pub fn tool_signature(tool_name: &str, args: &Value) -> String {
        format!("{tool_name}|{args}")
    }

    /// Open a pending request. The receiver yields the user's decision, or
    /// errors if the gate is cancelled.
    pub fn register(&self, id: ApprovalId, tool_name: &str) -> oneshot::Receiver<ReviewDecision> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.pending.insert(id.clone(), (tool_name.to_string(), tx));
        tracing::info!(approval_id = %id, tool = tool_name, "Approval requested");
        rx
    }

    /// Resolve the pending request `id`. Returns `false` when `id` is not
    /// pending (already answered, cancelled, or never issued).
    pub fn submit(&self, id: &ApprovalId, decision: ReviewDecision) -> bool {
        let entry = self.lock().pending.remove(id);
        match entry {
            Some((tool_name, tx)) => {
                tracing::info!(approval_id = %id, tool = %tool_name, ?decision, "Approval resolved");
                // The waiting executor may have been dropped; nothing to do then.
                let _ = tx.send(decision);
                true
            }
            None => {
                tracing::warn!(approval_id = %id, "Ignoring decision for unknown approval id");
                false
            }
        }
    }

    /// Drop a pending request without answering it.
    pub fn withdraw(&self, id: &ApprovalId) {
        self.lock().pending.remove(id);
    }

    /// Ids of all requests still waiting for a decision.
    pub fn pending_ids(&self) -> Vec<ApprovalId> {
        self.lock().pending.keys().cloned().collect()
    }

    /// Deny every pending request.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().pending.drain().collect();
        for (id, (tool_name, tx)) in drained {
            tracing::info!(approval_id = %id, tool = %tool_name, "Approval cancelled");
            let _ = tx.send(ReviewDecision::Denied);
        }
    }

    pub fn remember_for_session(&self, tool_name: &str, args: &Value) {
        self.lock()
            .approved_for_session
            .insert(Self::tool_signature(tool_name, args));
    }

    pub fn is_approved_for_session(&self, tool_name: &str, args: &Value) -> bool {
        self.lock()
            .approved_for_session
            .contains(&Self::tool_signature(tool_name, args))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
