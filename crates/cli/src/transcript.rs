// Recorded agent conversations replayed against local files.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use fixup_common::protocol::jsonrpc::Notification;
use fixup_common::protocol::{methods, EditTask, Range, TaskNotification};
use fixup_engine::collaborator::{Collaborator, CollaboratorFuture};
use fixup_engine::command::EditRequest;
use fixup_engine::error::CollaboratorError;
use serde::Deserialize;
use tracing::warn;

/// What the agent answered during one recorded session.
///
/// ```json
/// {
///   "foldingRange": { "start": { "line": 0, "character": 0 }, "end": { "line": 5, "character": 0 } },
///   "task": { "id": "t1", "state": "Working" },
///   "notifications": [
///     { "method": "workspace/edit", "params": { "operations": [] } },
///     { "method": "editTask/didUpdate", "params": { "id": "t1", "state": "Applied" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Refined anchor range; the selection is kept when absent.
    #[serde(default)]
    pub folding_range: Option<Range>,
    /// Answer to the edit request.
    #[serde(default)]
    pub task: Option<EditTask>,
    /// Error the edit request failed with, used when `task` is absent.
    #[serde(default)]
    pub error: Option<String>,
    /// Pushes in arrival order.
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl Transcript {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read transcript `{}`", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse transcript `{}`", path.display()))
    }

    /// Typed pushes. Entries that do not decode are logged and skipped.
    pub fn pushes(&self) -> Vec<TaskNotification> {
        self.notifications
            .iter()
            .cloned()
            .filter_map(|notification| {
                let method = notification.method.clone();
                match TaskNotification::try_from(notification) {
                    Ok(push) => Some(push),
                    Err(error) => {
                        warn!(%method, %error, "skipping transcript entry");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Collaborator that answers from a transcript and records what the host
/// sent back.
pub struct ReplayCollaborator {
    transcript: Transcript,
    sent: Mutex<Vec<String>>,
}

impl ReplayCollaborator {
    pub fn new(transcript: Transcript) -> Self {
        Self { transcript, sent: Mutex::new(Vec::new()) }
    }

    /// Methods the host called, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    fn record(&self, method: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(method.to_string());
        }
    }
}

impl Collaborator for ReplayCollaborator {
    fn resolve_anchor_range(&self, _uri: &str, range: Range) -> CollaboratorFuture<Range> {
        self.record(methods::EDIT_TASK_GET_FOLDING_RANGES);
        let refined = self.transcript.folding_range.unwrap_or(range);
        Box::pin(async move { Ok(refined) })
    }

    fn request_edit(&self, request: &EditRequest) -> CollaboratorFuture<EditTask> {
        self.record(request.method());
        let answer = match (&self.transcript.task, &self.transcript.error) {
            (Some(task), _) => Ok(task.clone()),
            (None, Some(message)) => Err(CollaboratorError::Rejected(message.clone())),
            (None, None) => {
                Err(CollaboratorError::InvalidResponse("transcript has no task".to_string()))
            }
        };
        Box::pin(async move { answer })
    }

    fn accept_task(&self, _task_id: &str) -> CollaboratorFuture<()> {
        self.record(methods::EDIT_TASK_ACCEPT);
        Box::pin(async { Ok(()) })
    }

    fn cancel_task(&self, _task_id: &str) -> CollaboratorFuture<()> {
        self.record(methods::EDIT_TASK_CANCEL);
        Box::pin(async { Ok(()) })
    }

    fn undo_task(&self, _task_id: &str) -> CollaboratorFuture<()> {
        self.record(methods::EDIT_TASK_UNDO);
        Box::pin(async { Ok(()) })
    }
}
