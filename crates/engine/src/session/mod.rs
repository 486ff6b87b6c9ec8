// One AI-initiated editing task, from request to accept/undo.
//
// All document mutation happens under the session lock inside a single yrs
// transaction tagged with the session origin. Collaborator round trips happen
// with the lock released and are bounded by the configured timeouts; every
// continuation re-checks the cancellation token before touching state.

pub mod diff;
pub mod events;
mod workspace;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fixup_common::protocol::{EditTask, Range, TaskState, TextEdit};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborator::{Collaborator, CollaboratorFuture};
use crate::command::{EditCommand, EditRequest};
use crate::config::FixupConfig;
use crate::document::{
    Anchor, DetachedBuffer, DocumentStore, LineIndex, TextBuffer, TextDocument, UpdateSubscription,
};
use crate::error::FixupError;
use crate::mutation::{undo_in_reverse, Mutation};
use crate::registry::EditRegistry;

pub use diff::SessionDiff;
pub use events::SessionEvent;

/// Prefix of the transaction origin every session tags its edits with.
pub const SESSION_ORIGIN_PREFIX: &str = "fixup-session";

struct AppliedAction {
    document: Arc<TextDocument>,
    mutation: Mutation,
}

/// A task push, held back while the edit request is still unanswered.
enum TaskPush {
    State(EditTask),
    Deleted(String),
}

impl TaskPush {
    fn task_id(&self) -> &str {
        match self {
            TaskPush::State(task) => &task.id,
            TaskPush::Deleted(task_id) => task_id,
        }
    }
}

/// A user action that has claimed the session and is waiting on the
/// collaborator.
struct Claim {
    task_id: Option<String>,
    /// Edits the action will reverse, taken out before the round trip.
    actions: Vec<AppliedAction>,
}

struct SessionInner {
    state: TaskState,
    task_id: Option<String>,
    document: Arc<TextDocument>,
    /// Live anchor over `anchor_range` in `document`.
    anchor: Option<Anchor>,
    /// Last resolved anchor range, used when the live anchor is gone.
    anchor_range: Range,
    registry: EditRegistry,
    applied: Vec<AppliedAction>,
    failures: Vec<FixupError>,
    error: Option<String>,
    /// Decoration lines currently reserved above the edits.
    decorations: usize,
    /// A user action is waiting on the collaborator.
    closing: bool,
    /// Pushes that arrived before the task id was known, in arrival order.
    held_pushes: Vec<TaskPush>,
    disposed: bool,
    /// One update observer per document the session has worked in.
    subscriptions: Vec<(String, UpdateSubscription)>,
}

pub struct FixupSession {
    id: Uuid,
    origin: String,
    command: EditCommand,
    collaborator: Arc<dyn Collaborator>,
    documents: Arc<DocumentStore>,
    config: FixupConfig,
    /// Stops in-flight collaborator work.
    cancel: CancellationToken,
    /// Fires once the session is disposed.
    closed: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
    foreign_edits: Arc<AtomicUsize>,
    inner: Mutex<SessionInner>,
}

impl FixupSession {
    pub fn new(
        command: EditCommand,
        document: Arc<TextDocument>,
        selection: Range,
        collaborator: Arc<dyn Collaborator>,
        documents: Arc<DocumentStore>,
        config: FixupConfig,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        let (events, _) = broadcast::channel(config.session.event_capacity.max(1));
        let session = Arc::new(Self {
            id,
            origin: format!("{SESSION_ORIGIN_PREFIX}:{id}"),
            command,
            collaborator,
            documents,
            config,
            cancel: CancellationToken::new(),
            closed: CancellationToken::new(),
            events,
            foreign_edits: Arc::new(AtomicUsize::new(0)),
            inner: Mutex::new(SessionInner {
                state: TaskState::Pending,
                task_id: None,
                document: Arc::clone(&document),
                anchor: None,
                anchor_range: selection,
                registry: EditRegistry::new(),
                applied: Vec::new(),
                failures: Vec::new(),
                error: None,
                decorations: 0,
                closing: false,
                held_pushes: Vec::new(),
                disposed: false,
                subscriptions: Vec::new(),
            }),
        });
        if let Some(subscription) = session.watch(&document) {
            session.lock().subscriptions.push((document.uri().to_string(), subscription));
        }
        debug!(session = %id, uri = document.uri(), "session created");
        session
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Transaction origin of this session's own edits.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn command(&self) -> &EditCommand {
        &self.command
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn task_id(&self) -> Option<String> {
        self.lock().task_id.clone()
    }

    pub fn is_applied(&self) -> bool {
        self.state() == TaskState::Applied
    }

    pub fn is_error(&self) -> bool {
        self.state() == TaskState::Error
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Human-readable reason the session ended in `Error`.
    pub fn error_message(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn document_uri(&self) -> String {
        self.lock().document.uri().to_string()
    }

    pub fn document(&self) -> Arc<TextDocument> {
        Arc::clone(&self.lock().document)
    }

    /// Current anchor range, following edits made since it was resolved.
    pub fn anchor_range(&self) -> Range {
        let inner = self.lock();
        inner
            .anchor
            .as_ref()
            .and_then(|anchor| inner.document.resolve_range(anchor))
            .unwrap_or(inner.anchor_range)
    }

    pub fn applied_action_count(&self) -> usize {
        self.lock().applied.len()
    }

    /// Edit instructions with their decoration positions.
    pub fn edits(&self) -> Vec<TextEdit> {
        self.lock().registry.iter().cloned().collect()
    }

    /// Non-fatal failures recorded so far.
    pub fn failures(&self) -> Vec<FixupError> {
        self.lock().failures.clone()
    }

    /// Updates to the session's documents that did not come from the session.
    pub fn foreign_edit_count(&self) -> usize {
        self.foreign_edits.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Resolves once the session has been disposed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    // ── Start ──────────────────────────────────────────────────────

    /// Resolves the anchor range, then issues the edit request.
    pub(crate) async fn start(&self) {
        let (uri, selection) = {
            let inner = self.lock();
            (inner.document.uri().to_string(), inner.anchor_range)
        };

        let range = self.resolve_anchor(&uri, selection).await;
        if self.cancel.is_cancelled() {
            return;
        }
        {
            let mut inner = self.lock();
            if inner.disposed {
                return;
            }
            let document = Arc::clone(&inner.document);
            self.place_anchor(&mut inner, &document, range);
            // The working group.
            inner.decorations = 1;
        }

        let request = EditRequest { command: self.command.clone(), uri, range };
        info!(session = %self.id, method = request.method(), "requesting edit");
        let outcome = self
            .bounded("edit request", self.config.request_timeout(), self.collaborator.request_edit(&request))
            .await;
        if self.cancel.is_cancelled() {
            debug!(session = %self.id, "session closed while the edit request was in flight");
            return;
        }

        let mut inner = self.lock();
        match outcome {
            Ok(task) => self.record_task(&mut inner, task),
            Err(error) => self.fail(&mut inner, error.to_string()),
        }
    }

    fn record_task(&self, inner: &mut SessionInner, task: EditTask) {
        if inner.disposed || inner.state.is_terminal() {
            return;
        }
        info!(session = %self.id, task_id = %task.id, "edit task accepted by agent");
        let task_id = task.id.clone();
        inner.task_id = Some(task.id);
        if let Some(range) = task.selection_range {
            let document = Arc::clone(&inner.document);
            self.place_anchor(inner, &document, range);
        }
        let error = task.error.map(|e| e.message);
        self.transition(inner, task.state, error);

        // Pushes that raced ahead of the answer.
        for push in std::mem::take(&mut inner.held_pushes) {
            if inner.disposed {
                break;
            }
            if push.task_id() == task_id {
                self.apply_push(inner, push);
            } else {
                debug!(session = %self.id, task_id = push.task_id(), "dropping held push for another task");
            }
        }
    }

    /// Folding-range refinement of `range`; the original range on any failure.
    async fn resolve_anchor(&self, uri: &str, range: Range) -> Range {
        let call = self.collaborator.resolve_anchor_range(uri, range);
        match self.bounded("anchor resolution", self.config.anchor_timeout(), call).await {
            Ok(refined) => refined,
            Err(error) => {
                debug!(session = %self.id, %error, "keeping selection as anchor range");
                range
            }
        }
    }

    fn place_anchor(&self, inner: &mut SessionInner, document: &TextDocument, range: Range) {
        let (anchor, range) = document.transact(&self.origin, |buffer| {
            let content = buffer.text();
            let lines = LineIndex::new(&content);
            let range = lines.normalize_range(range);
            let anchor = lines.span(range).and_then(|span| buffer.anchor(span));
            (anchor, range)
        });
        inner.anchor = anchor;
        inner.anchor_range = range;
        self.emit(SessionEvent::AnchorResolved(range));
    }

    // ── Collaborator pushes ────────────────────────────────────────

    /// Applies a state pushed by the collaborator for `task.id`.
    pub fn handle_state(&self, task: EditTask) {
        let mut inner = self.lock();
        self.route_push(&mut inner, TaskPush::State(task));
    }

    /// The collaborator dropped `task_id`. Disposes without reversing.
    pub fn task_deleted(&self, task_id: &str) {
        let mut inner = self.lock();
        self.route_push(&mut inner, TaskPush::Deleted(task_id.to_string()));
    }

    /// Pushes apply only to this session's own task. Until the edit request
    /// is answered the id is unknown, so pushes are held and sorted out by
    /// `record_task`.
    fn route_push(&self, inner: &mut SessionInner, push: TaskPush) {
        if inner.disposed {
            return;
        }
        let owned = match &inner.task_id {
            Some(own) => own == push.task_id(),
            None => {
                debug!(session = %self.id, task_id = push.task_id(), "holding push until the task is known");
                inner.held_pushes.push(push);
                return;
            }
        };
        if owned {
            self.apply_push(inner, push);
        } else {
            debug!(session = %self.id, task_id = push.task_id(), "ignoring push for another task");
        }
    }

    fn apply_push(&self, inner: &mut SessionInner, push: TaskPush) {
        match push {
            TaskPush::State(task) => {
                if inner.state.is_terminal() {
                    debug!(session = %self.id, state = %task.state, "ignoring state for finished session");
                    return;
                }
                let error = task.error.map(|e| e.message);
                self.transition(inner, task.state, error);
            }
            TaskPush::Deleted(_) => {
                // The action in flight finalizes the session.
                if inner.closing {
                    debug!(session = %self.id, "task deleted while an action is finishing");
                    return;
                }
                info!(session = %self.id, "task deleted by agent");
                if !inner.state.is_terminal() {
                    self.set_state(inner, TaskState::Finished);
                }
                self.dispose_locked(inner);
            }
        }
    }

    fn transition(&self, inner: &mut SessionInner, state: TaskState, error: Option<String>) {
        match state {
            TaskState::Pending => {}
            TaskState::Working | TaskState::Inserting | TaskState::Applying | TaskState::Formatting => {
                self.set_state(inner, state);
            }
            TaskState::Applied => {
                if inner.state != TaskState::Applied {
                    inner.registry.reposition(inner.decorations);
                    // The diff group plus one block per edit.
                    inner.decorations = 1 + inner.registry.len();
                }
                self.set_state(inner, state);
            }
            TaskState::Finished => {
                if inner.closing {
                    debug!(session = %self.id, "task finished while an action is finishing");
                    return;
                }
                self.set_state(inner, state);
                self.dispose_locked(inner);
            }
            TaskState::Error => {
                self.fail(inner, error.unwrap_or_else(|| "edit task failed".to_string()));
            }
        }
    }

    // ── User actions ───────────────────────────────────────────────

    /// Keeps the edits. Only available once the task is `Applied`.
    pub async fn accept(&self) -> bool {
        let Some(claim) = self.begin_action("accept", |state| state == TaskState::Applied, false) else {
            return false;
        };
        if let Some(task_id) = claim.task_id {
            self.notify("accept", self.collaborator.accept_task(&task_id)).await;
        }
        let mut inner = self.lock();
        info!(session = %self.id, "edits accepted");
        self.emit(SessionEvent::Accepted);
        if !inner.state.is_terminal() {
            self.set_state(&mut inner, TaskState::Finished);
        }
        self.dispose_locked(&mut inner);
        true
    }

    /// Stops the task and reverses whatever was applied.
    pub async fn cancel(&self) -> bool {
        let Some(claim) = self.begin_action("cancel", |_| true, true) else {
            return false;
        };
        // Nothing to wait for before the agent has taken the task.
        if claim.task_id.is_none() {
            self.cancel.cancel();
        }
        if let Some(task_id) = &claim.task_id {
            self.notify("cancel", self.collaborator.cancel_task(task_id)).await;
        }
        let mut inner = self.lock();
        info!(session = %self.id, applied = claim.actions.len(), "session cancelled");
        self.restore_claimed(&mut inner, claim.actions);
        self.reverse_locked(&mut inner);
        self.emit(SessionEvent::Cancelled);
        if !inner.state.is_terminal() {
            self.set_state(&mut inner, TaskState::Finished);
        }
        self.dispose_locked(&mut inner);
        true
    }

    /// Reverses every applied edit. Only available once the task is `Applied`.
    pub async fn undo(&self) -> bool {
        let Some(claim) = self.begin_action("undo", |state| state == TaskState::Applied, true) else {
            return false;
        };
        if let Some(task_id) = &claim.task_id {
            self.notify("undo", self.collaborator.undo_task(task_id)).await;
        }
        let mut inner = self.lock();
        info!(session = %self.id, applied = claim.actions.len(), "session undone");
        self.restore_claimed(&mut inner, claim.actions);
        self.reverse_locked(&mut inner);
        self.emit(SessionEvent::Undone);
        if !inner.state.is_terminal() {
            self.set_state(&mut inner, TaskState::Finished);
        }
        self.dispose_locked(&mut inner);
        true
    }

    /// Closes the session locally: no notification, no reversal.
    pub fn dismiss(&self) -> bool {
        let mut inner = self.lock();
        if inner.disposed {
            return false;
        }
        self.emit(SessionEvent::Dismissed);
        if !inner.state.is_terminal() {
            self.set_state(&mut inner, TaskState::Finished);
        }
        self.dispose_locked(&mut inner);
        true
    }

    /// Keeps one edit and forgets its decoration.
    pub fn accept_edit(&self, edit_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.disposed || inner.closing || inner.state != TaskState::Applied {
            return false;
        }
        if inner.registry.remove(edit_id).is_none() {
            return false;
        }
        self.emit(SessionEvent::EditAccepted { edit_id: edit_id.to_string() });
        true
    }

    /// Reverses one applied edit and forgets it.
    pub fn reject_edit(&self, edit_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.disposed || inner.closing || inner.state != TaskState::Applied {
            return false;
        }
        let known = inner.registry.remove(edit_id).is_some();
        let position = inner.applied.iter().position(|a| a.mutation.edit_id() == edit_id);
        if let Some(position) = position {
            let mut action = inner.applied.remove(position);
            let outcome = action.document.transact(&self.origin, |buffer| action.mutation.undo(buffer));
            if let Err(error) = outcome {
                warn!(session = %self.id, edit_id, %error, "could not reverse edit");
            }
            action.mutation.dispose();
        }
        if !known && position.is_none() {
            return false;
        }
        self.emit(SessionEvent::EditRejected { edit_id: edit_id.to_string() });
        true
    }

    /// Force-disposes the session, as when its editing surface closes.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        self.dispose_locked(&mut inner);
    }

    /// Claims the session for a user action, or `None` when the action is not
    /// allowed right now. With `take_applied` the applied edits move into the
    /// claim, so nothing that happens during the round trip can drop them.
    fn begin_action(
        &self,
        action: &'static str,
        allowed: impl Fn(TaskState) -> bool,
        take_applied: bool,
    ) -> Option<Claim> {
        let mut inner = self.lock();
        let state = inner.state;
        if inner.disposed || inner.closing || state.is_terminal() || !allowed(state) {
            let label = if inner.disposed { "disposed".to_string() } else { state.to_string() };
            let error = FixupError::InvalidSessionState { state: label, action };
            debug!(session = %self.id, %error);
            return None;
        }
        inner.closing = true;
        let actions = if take_applied { std::mem::take(&mut inner.applied) } else { Vec::new() };
        Some(Claim { task_id: inner.task_id.clone(), actions })
    }

    /// Puts claimed edits back ahead of any applied since the claim.
    fn restore_claimed(&self, inner: &mut SessionInner, mut claimed: Vec<AppliedAction>) {
        claimed.append(&mut inner.applied);
        inner.applied = claimed;
    }

    // ── Diff view ──────────────────────────────────────────────────

    /// Before/after text of the current document.
    pub fn diff(&self) -> Option<SessionDiff> {
        let inner = self.lock();
        if inner.disposed {
            return None;
        }
        Some(self.diff_for(&inner, &inner.document))
    }

    /// Before/after text of every document the session has edited.
    pub fn diffs(&self) -> Vec<SessionDiff> {
        let inner = self.lock();
        if inner.disposed {
            return Vec::new();
        }
        let mut documents: Vec<&Arc<TextDocument>> = Vec::new();
        for action in &inner.applied {
            if !documents.iter().any(|d| Arc::ptr_eq(d, &action.document)) {
                documents.push(&action.document);
            }
        }
        documents.into_iter().map(|document| self.diff_for(&inner, document)).collect()
    }

    fn diff_for(&self, inner: &SessionInner, document: &Arc<TextDocument>) -> SessionDiff {
        let mutations: Vec<&Mutation> = inner
            .applied
            .iter()
            .filter(|action| Arc::ptr_eq(&action.document, document))
            .map(|action| &action.mutation)
            .collect();
        let (before, after) = document.transact(&self.origin, |live| {
            let after = live.text();
            let mut copy = DetachedBuffer::new(after.clone());
            let mut replays = Vec::with_capacity(mutations.len());
            for mutation in &mutations {
                replays.push(mutation.copy_to(&*live, &mut copy));
            }
            for replay in replays.iter_mut().rev() {
                if let Err(error) = replay.undo(&mut copy) {
                    debug!(session = %self.id, %error, "diff copy could not reverse edit");
                }
            }
            (copy.into_text(), after)
        });
        SessionDiff { uri: document.uri().to_string(), before, after }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, inner: &mut SessionInner, state: TaskState) {
        if inner.state == state {
            return;
        }
        debug!(session = %self.id, from = %inner.state, to = %state, "state changed");
        inner.state = state;
        self.emit(SessionEvent::StateChanged(state));
    }

    fn report(&self, inner: &mut SessionInner, error: FixupError) {
        warn!(session = %self.id, %error, "edit failure");
        inner.failures.push(error.clone());
        self.emit(SessionEvent::EditFailed(error));
    }

    /// Moves to `Error`. The session stays active until dismissed or replaced.
    fn fail(&self, inner: &mut SessionInner, message: String) {
        if inner.disposed || inner.state.is_terminal() {
            return;
        }
        warn!(session = %self.id, error = %message, "session failed");
        self.cancel.cancel();
        inner.error = Some(message.clone());
        self.set_state(inner, TaskState::Error);
        self.emit(SessionEvent::Failed(message));
    }

    /// Undoes every applied action, newest first, one transaction per run of
    /// actions on the same document. Failures are logged and skipped.
    fn reverse_locked(&self, inner: &mut SessionInner) {
        let mut actions = std::mem::take(&mut inner.applied);
        while let Some(last) = actions.last() {
            let document = Arc::clone(&last.document);
            let split = actions
                .iter()
                .rposition(|action| !Arc::ptr_eq(&action.document, &document))
                .map_or(0, |index| index + 1);
            let mut run: Vec<Mutation> =
                actions.split_off(split).into_iter().map(|action| action.mutation).collect();
            let failures = document.transact(&self.origin, |buffer| undo_in_reverse(&mut run, buffer));
            for error in failures {
                warn!(session = %self.id, uri = document.uri(), %error, "could not reverse edit");
            }
        }
    }

    fn dispose_locked(&self, inner: &mut SessionInner) {
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        for action in &mut inner.applied {
            action.mutation.dispose();
        }
        inner.applied.clear();
        inner.held_pushes.clear();
        inner.registry.clear();
        if let Some(range) = inner.anchor.take().and_then(|anchor| inner.document.resolve_range(&anchor)) {
            inner.anchor_range = range;
        }
        inner.subscriptions.clear();
        self.cancel.cancel();
        self.closed.cancel();
        debug!(session = %self.id, state = %inner.state, "session disposed");
        self.emit(SessionEvent::Disposed);
    }

    /// Awaits `call` for at most `limit`, giving up early if the session is
    /// cancelled.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        limit: Duration,
        call: CollaboratorFuture<T>,
    ) -> Result<T, FixupError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FixupError::InvalidSessionState {
                state: "cancelled".to_string(),
                action: operation,
            }),
            outcome = tokio::time::timeout(limit, call) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(source)) => Err(FixupError::RequestFailed { operation, source }),
                Err(_) => Err(FixupError::RequestTimeout { operation, timeout: limit }),
            },
        }
    }

    /// Fire-and-forget notification: failures are logged, never surfaced.
    async fn notify(&self, operation: &'static str, call: CollaboratorFuture<()>) {
        let limit = self.config.notify_timeout();
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(FixupError::RequestFailed { operation, source }),
            Err(_) => Err(FixupError::RequestTimeout { operation, timeout: limit }),
        };
        if let Err(error) = outcome {
            warn!(session = %self.id, %error, "agent notification failed");
        }
    }

    fn watch(&self, document: &TextDocument) -> Option<UpdateSubscription> {
        let origin = self.origin.clone();
        let foreign = Arc::clone(&self.foreign_edits);
        let watched = document.observe_updates(move |update_origin| {
            if update_origin != Some(origin.as_bytes()) {
                foreign.fetch_add(1, Ordering::Relaxed);
            }
        });
        match watched {
            Ok(subscription) => Some(subscription),
            Err(error) => {
                warn!(session = %self.id, %error, "document updates will not be observed");
                None
            }
        }
    }
}

impl std::fmt::Debug for FixupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixupSession")
            .field("id", &self.id)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}
