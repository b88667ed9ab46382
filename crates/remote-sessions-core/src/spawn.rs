//! Spawn request and remote outcome types.

use serde::{Deserialize, Serialize};

use crate::session::{MachineId, SessionId};

/// Error code the daemon attaches when a resumed agent process has exited
/// and cannot be revived.
pub const REVIVAL_FAILED_CODE: &str = "session_revival_failed";

/// Request to spawn a new agent session, or resume a prior one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub machine_id: MachineId,
    /// Working directory on the remote machine.
    pub directory: String,
    /// Agent to launch (`claude`, `codex`, ...).
    pub agent: String,
    /// Agent session handle to resume instead of starting fresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_session_id: Option<String>,
    /// Explicit consent to create `directory` if it does not exist.
    #[serde(default)]
    pub approved_directory_creation: bool,
}

impl SpawnRequest {
    /// Create a fresh-session request.
    #[must_use]
    pub fn new(
        machine_id: impl Into<MachineId>,
        directory: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            directory: directory.into(),
            agent: agent.into(),
            resume_session_id: None,
            approved_directory_creation: false,
        }
    }

    /// Resume the given agent session handle.
    #[must_use]
    pub fn resume(mut self, agent_session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(agent_session_id.into());
        self
    }

    /// Re-issue this request with directory creation approved.
    #[must_use]
    pub fn approve_directory_creation(mut self) -> Self {
        self.approved_directory_creation = true;
        self
    }
}

/// Result reported by the remote spawn/resume procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SpawnOutcome {
    /// The daemon started the agent.
    ///
    /// `session_id` is absent when the acknowledgment was lost, and
    /// provisional when registration was not confirmed in time.
    #[serde(rename_all = "camelCase")]
    Success {
        #[serde(default)]
        session_id: Option<SessionId>,
        /// Session whose work the new one continues.
        #[serde(default)]
        resumed_from: Option<SessionId>,
    },
    /// The daemon refused or failed.
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// The directory does not exist; the user must consent to creating it.
    #[serde(rename_all = "camelCase")]
    ApprovalRequired { directory: String },
}

impl SpawnOutcome {
    /// Whether this is an error the daemon classified as a revival failure.
    #[must_use]
    pub fn is_revival_failure(&self) -> bool {
        match self {
            Self::Error { message, code } => {
                code.as_deref() == Some(REVIVAL_FAILED_CODE)
                    || message.to_ascii_lowercase().contains("revival failed")
            }
            _ => false,
        }
    }
}
