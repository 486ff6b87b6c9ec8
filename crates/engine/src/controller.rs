// Owner of the single active fixup session of one editing surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use fixup_common::protocol::{Range, TaskNotification};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::collaborator::Collaborator;
use crate::command::EditCommand;
use crate::config::FixupConfig;
use crate::document::{normalize_uri, DocumentStore};
use crate::error::FixupError;
use crate::session::FixupSession;

pub struct SessionController {
    collaborator: Arc<dyn Collaborator>,
    documents: Arc<DocumentStore>,
    config: FixupConfig,
    active: Mutex<Option<Arc<FixupSession>>>,
    disposed: AtomicBool,
}

impl SessionController {
    pub fn new(
        collaborator: Arc<dyn Collaborator>,
        documents: Arc<DocumentStore>,
        config: FixupConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            collaborator,
            documents,
            config,
            active: Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.documents
    }

    pub fn config(&self) -> &FixupConfig {
        &self.config
    }

    /// Starts a session over `selection` in `uri`, replacing the active one.
    ///
    /// Returns once the edit request has been answered, timed out or failed;
    /// the returned session reflects that outcome.
    pub async fn start_session(
        self: &Arc<Self>,
        command: EditCommand,
        uri: &str,
        selection: Range,
    ) -> Result<Arc<FixupSession>, FixupError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(FixupError::InvalidSessionState {
                state: "disposed".into(),
                action: "start session",
            });
        }
        let document = self.documents.open_or_create(uri).map_err(|error| {
            FixupError::FileSwitchFailed { uri: uri.to_string(), reason: error.to_string() }
        })?;

        let session = FixupSession::new(
            command,
            document,
            selection,
            Arc::clone(&self.collaborator),
            Arc::clone(&self.documents),
            self.config.clone(),
        );
        self.set_active_session(Arc::clone(&session));
        session.start().await;
        Ok(session)
    }

    /// Installs `session` as the active one. The prior session is disposed
    /// before the new one becomes visible.
    pub fn set_active_session(self: &Arc<Self>, session: Arc<FixupSession>) {
        {
            let mut active = self.lock();
            if self.disposed.load(Ordering::Acquire) {
                session.dispose();
                return;
            }
            if let Some(prior) = active.take() {
                if !Arc::ptr_eq(&prior, &session) {
                    info!(session = %prior.id(), "replacing active session");
                    prior.dispose();
                }
            }
            *active = Some(Arc::clone(&session));
        }
        self.watch(session);
    }

    /// The active session, if it has not been disposed.
    pub fn active_session(&self) -> Option<Arc<FixupSession>> {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|session| session.is_disposed()) {
            *active = None;
        }
        active.clone()
    }

    /// Cancels the active session, reversing its edits. Sessions that no longer
    /// accept a cancel are dismissed instead.
    pub async fn cancel_active_session(&self) -> bool {
        let Some(session) = self.active_session() else {
            return false;
        };
        if !session.cancel().await {
            session.dismiss();
        }
        self.release(&session);
        true
    }

    /// Dismisses and forgets the active session.
    pub fn clear_active_session(&self) -> Option<Arc<FixupSession>> {
        let session = self.lock().take()?;
        session.dismiss();
        Some(session)
    }

    /// Cancels `session` and starts a fresh one over the same document and
    /// anchor range, optionally with new instruction text.
    pub async fn retry(
        self: &Arc<Self>,
        session: &Arc<FixupSession>,
        instruction: Option<String>,
    ) -> Result<Arc<FixupSession>, FixupError> {
        let command = session.command().with_instruction(instruction);
        info!(session = %session.id(), "retrying edit");
        if !session.cancel().await {
            session.dismiss();
        }
        // Read after the reversal so the range matches the restored text.
        let uri = session.document_uri();
        let range = session.anchor_range();
        self.start_session(command, &uri, range).await
    }

    /// Hands a collaborator push to the session it belongs to.
    pub async fn handle_notification(&self, notification: TaskNotification) {
        let Some(session) = self.active_session() else {
            debug!(method = notification.method(), "no active session for push");
            return;
        };
        match notification {
            // Tagged pushes are matched to the task inside the session.
            TaskNotification::StateChanged(task) => session.handle_state(task),
            TaskNotification::TaskDeleted(task) => session.task_deleted(&task.id),
            TaskNotification::WorkspaceEdit(params) => session.apply_workspace_edit(params).await,
            TaskNotification::TextDocumentEdit(params) => {
                session.apply_text_document_edit(params).await;
            }
        }
    }

    /// Feeds pushes from `pushes` to [`Self::handle_notification`] one at a
    /// time, in arrival order, until the channel closes.
    pub fn spawn_notification_pump(
        self: &Arc<Self>,
        mut pushes: mpsc::UnboundedReceiver<TaskNotification>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = pushes.recv().await {
                controller.handle_notification(notification).await;
            }
            debug!("notification channel closed");
        })
    }

    /// The surface showing `uri` went away.
    pub fn document_closed(&self, uri: &str) {
        let Ok(uri) = normalize_uri(uri) else {
            return;
        };
        let mut active = self.lock();
        if active.as_ref().is_some_and(|session| session.document_uri() == uri) {
            if let Some(session) = active.take() {
                session.dispose();
            }
        }
    }

    /// Disposes the active session and refuses new ones.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        if let Some(session) = self.lock().take() {
            session.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<FixupSession>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forgets `session` if it is still the active one.
    fn release(&self, session: &Arc<FixupSession>) {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|current| Arc::ptr_eq(current, session)) {
            *active = None;
        }
    }

    /// Clears `session` from the controller once it is disposed.
    fn watch(self: &Arc<Self>, session: Arc<FixupSession>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let closed = session.closed_token();
        let controller: Weak<Self> = Arc::downgrade(self);
        let session = Arc::downgrade(&session);
        runtime.spawn(async move {
            closed.cancelled().await;
            if let (Some(controller), Some(session)) = (controller.upgrade(), session.upgrade()) {
                controller.release(&session);
            }
        });
    }
}
