// Decoding of agent → host pushes into typed notifications.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::jsonrpc::Notification;
use super::methods;
use super::types::{EditTask, TextDocumentEditParams, WorkspaceEditParams};

/// A push from the collaborator that concerns an edit session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskNotification {
    StateChanged(EditTask),
    WorkspaceEdit(WorkspaceEditParams),
    TextDocumentEdit(TextDocumentEditParams),
    TaskDeleted(EditTask),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown push method `{0}`")]
    UnknownMethod(String),
    #[error("missing params for `{0}`")]
    MissingParams(String),
    #[error("invalid params for `{method}`: {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TaskNotification {
    pub fn decode(method: &str, params: Option<Value>) -> Result<Self, DecodeError> {
        match method {
            methods::EDIT_TASK_DID_UPDATE => parse(method, params).map(Self::StateChanged),
            methods::EDIT_TASK_DID_DELETE => parse(method, params).map(Self::TaskDeleted),
            methods::WORKSPACE_EDIT => parse(method, params).map(Self::WorkspaceEdit),
            methods::TEXT_DOCUMENT_EDIT => parse(method, params).map(Self::TextDocumentEdit),
            other => Err(DecodeError::UnknownMethod(other.to_string())),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::StateChanged(_) => methods::EDIT_TASK_DID_UPDATE,
            Self::WorkspaceEdit(_) => methods::WORKSPACE_EDIT,
            Self::TextDocumentEdit(_) => methods::TEXT_DOCUMENT_EDIT,
            Self::TaskDeleted(_) => methods::EDIT_TASK_DID_DELETE,
        }
    }

    /// Task id carried by the push, when it has one. Workspace and document
    /// edits are not tagged and go to the active session.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged(task) | Self::TaskDeleted(task) => Some(task.id.as_str()),
            Self::WorkspaceEdit(_) | Self::TextDocumentEdit(_) => None,
        }
    }
}

impl TryFrom<Notification> for TaskNotification {
    type Error = DecodeError;

    fn try_from(notification: Notification) -> Result<Self, Self::Error> {
        Self::decode(&notification.method, notification.params)
    }
}

fn parse<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T, DecodeError> {
    let params = params.ok_or_else(|| DecodeError::MissingParams(method.to_string()))?;
    serde_json::from_value(params)
        .map_err(|source| DecodeError::InvalidParams { method: method.to_string(), source })
}
