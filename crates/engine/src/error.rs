// Error taxonomy for fixup sessions.

use std::time::Duration;

/// Failure reported by the collaborator transport or the agent itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The agent answered with an error.
    #[error("agent rejected the request: {0}")]
    Rejected(String),
    /// The transport to the agent is gone.
    #[error("agent connection closed")]
    Disconnected,
    /// The agent answered with something that could not be decoded.
    #[error("invalid agent response: {0}")]
    InvalidResponse(String),
}

/// Everything that can go wrong while driving a session.
///
/// Only `RequestTimeout` and `RequestFailed` end a session. The others are
/// recorded on the session and the batch or operation carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixupError {
    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    RequestTimeout { operation: &'static str, timeout: Duration },

    #[error("{operation} failed: {source}")]
    RequestFailed {
        operation: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("could not convert {kind} edit{}: {reason}", edit_label(.edit_id))]
    EditCreationFailed { edit_id: Option<String>, kind: &'static str, reason: String },

    #[error("could not apply edit {edit_id}: {reason}")]
    EditApplicationFailed { edit_id: String, reason: String },

    #[error("could not switch to {uri}: {reason}")]
    FileSwitchFailed { uri: String, reason: String },

    #[error("session is {state}; {action} ignored")]
    InvalidSessionState { state: String, action: &'static str },
}

fn edit_label(edit_id: &Option<String>) -> String {
    edit_id.as_deref().map(|id| format!(" {id}")).unwrap_or_default()
}

impl FixupError {
    /// Whether this failure ends the session it happened in.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. } | Self::RequestFailed { .. })
    }

    pub(crate) fn creation(edit_id: Option<&str>, kind: &'static str, reason: impl Into<String>) -> Self {
        Self::EditCreationFailed {
            edit_id: edit_id.map(str::to_string),
            kind,
            reason: reason.into(),
        }
    }

    pub(crate) fn application(edit_id: &str, reason: impl Into<String>) -> Self {
        Self::EditApplicationFailed { edit_id: edit_id.to_string(), reason: reason.into() }
    }
}
