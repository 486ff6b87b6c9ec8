// The agent that proposes edits, as seen by a session.

use std::future::Future;
use std::pin::Pin;

use fixup_common::protocol::{EditTask, Range};

use crate::command::EditRequest;
use crate::error::CollaboratorError;

pub type CollaboratorFuture<T> = Pin<Box<dyn Future<Output = Result<T, CollaboratorError>> + Send>>;

/// Request/response side of the edit-task protocol.
///
/// Pushes (`editTask/didUpdate`, `workspace/edit`, ...) do not go through
/// this trait; the transport hands them to
/// [`SessionController::handle_notification`](crate::controller::SessionController::handle_notification).
/// Tests inject a mock that returns canned responses.
pub trait Collaborator: Send + Sync {
    /// Refines a selection into a stable anchor range (`editTask/getFoldingRanges`).
    fn resolve_anchor_range(&self, uri: &str, range: Range) -> CollaboratorFuture<Range>;

    /// Starts the task described by `request`.
    fn request_edit(&self, request: &EditRequest) -> CollaboratorFuture<EditTask>;

    fn accept_task(&self, task_id: &str) -> CollaboratorFuture<()>;

    fn cancel_task(&self, task_id: &str) -> CollaboratorFuture<()>;

    fn undo_task(&self, task_id: &str) -> CollaboratorFuture<()>;
}
