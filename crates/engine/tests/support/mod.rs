#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fixup_common::protocol::{EditTask, Range, TaskState};
use fixup_engine::collaborator::{Collaborator, CollaboratorFuture};
use fixup_engine::command::EditRequest;
use fixup_engine::error::CollaboratorError;

/// Scripted agent: answers with a fixed task (or error) after an optional
/// delay and records every call as `method` or `method:task_id`.
pub struct MockCollaborator {
    answer: Result<EditTask, CollaboratorError>,
    anchor: Option<Range>,
    request_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<EditRequest>>,
}

impl MockCollaborator {
    pub fn answering(task: EditTask) -> Self {
        Self {
            answer: Ok(task),
            anchor: None,
            request_delay: None,
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self { answer: Err(error), ..Self::answering(EditTask::new("", TaskState::Pending)) }
    }

    /// Refines every selection to `range`.
    pub fn with_anchor(mut self, range: Range) -> Self {
        self.anchor = Some(range);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<EditRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn notification(&self, method: &str, task_id: &str) -> CollaboratorFuture<()> {
        self.record(format!("{method}:{task_id}"));
        Box::pin(async { Ok(()) })
    }
}

impl Collaborator for MockCollaborator {
    fn resolve_anchor_range(&self, _uri: &str, range: Range) -> CollaboratorFuture<Range> {
        self.record("editTask/getFoldingRanges".to_string());
        let refined = self.anchor.unwrap_or(range);
        Box::pin(async move { Ok(refined) })
    }

    fn request_edit(&self, request: &EditRequest) -> CollaboratorFuture<EditTask> {
        self.record(request.method().to_string());
        self.requests.lock().unwrap().push(request.clone());
        let answer = self.answer.clone();
        let delay = self.request_delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            answer
        })
    }

    fn accept_task(&self, task_id: &str) -> CollaboratorFuture<()> {
        self.notification("editTask/accept", task_id)
    }

    fn cancel_task(&self, task_id: &str) -> CollaboratorFuture<()> {
        self.notification("editTask/cancel", task_id)
    }

    fn undo_task(&self, task_id: &str) -> CollaboratorFuture<()> {
        self.notification("editTask/undo", task_id)
    }
}
