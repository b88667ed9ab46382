//! Session and machine data model.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Session identifier, as assigned by the remote side.
pub type SessionId = String;

/// Machine identifier.
pub type MachineId = String;

/// Agent implementation running inside a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentFlavor {
    /// Claude Code. Legacy records without a flavor are Claude sessions.
    #[default]
    Claude,
    /// OpenAI Codex.
    Codex,
    /// Gemini CLI.
    Gemini,
    /// Any flavor this build does not know about.
    #[serde(other)]
    Unknown,
}

impl AgentFlavor {
    /// Whether the remote daemon can resume a prior agent session of this flavor.
    #[must_use]
    pub const fn supports_resume(self) -> bool {
        matches!(self, Self::Claude | Self::Codex)
    }

    /// Agent name sent in spawn requests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::Unknown => "unknown",
        }
    }
}

/// Metadata reported by the remote daemon for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Machine the session runs on.
    #[serde(default)]
    pub machine_id: Option<MachineId>,
    /// Working directory on that machine.
    #[serde(default)]
    pub path: Option<String>,
    /// The agent's own session handle, used to resume its conversation.
    #[serde(default)]
    pub prior_agent_session_id: Option<String>,
    #[serde(default)]
    pub flavor: AgentFlavor,
    /// User-facing session title.
    #[serde(default)]
    pub name: Option<String>,
}

/// A session record as seen through the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub metadata: SessionMetadata,
    /// Whether the agent process is currently attached.
    pub active: bool,
    /// Successor session continuing this one's work.
    #[serde(default)]
    pub superseded_by: Option<SessionId>,
    /// Predecessor whose work this session continues.
    #[serde(default)]
    pub supersedes: Option<SessionId>,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
    /// Last update timestamp (Unix epoch milliseconds).
    pub updated_at: i64,
}

impl Session {
    /// Create an inactive session with the given metadata.
    #[must_use]
    pub fn new(id: impl Into<SessionId>, metadata: SessionMetadata, created_at: i64) -> Self {
        Self {
            id: id.into(),
            metadata,
            active: false,
            superseded_by: None,
            supersedes: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Name to show for this session: its title, else the last path
    /// component of its directory, else its id.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.metadata.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        self.metadata
            .path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map_or_else(|| self.id.clone(), |n| n.to_string_lossy().into_owned())
    }
}

/// A remote machine known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: MachineId,
    /// Online state derived from daemon heartbeats.
    pub online: bool,
}

/// Current time as Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
