// Workspace edit pushes: file switching and batched inline edits.

use std::sync::Arc;

use fixup_common::protocol::{
    OperationKind, Position, Range, TextDocumentEditParams, TextEdit, WorkspaceEditOperation,
    WorkspaceEditParams,
};
use tracing::{debug, info, warn};

use super::{AppliedAction, FixupSession, SessionEvent, SessionInner};
use crate::document::{normalize_uri, TextDocument};
use crate::error::FixupError;
use crate::mutation::{apply_in_order, Mutation};

impl FixupSession {
    /// Applies a `workspace/edit` push, operation by operation, in order.
    pub async fn apply_workspace_edit(&self, params: WorkspaceEditParams) {
        for operation in params.operations {
            if self.cancel.is_cancelled() {
                debug!(session = %self.id, "dropping workspace edit for closed session");
                return;
            }
            self.perform_operation(operation).await;
        }
    }

    /// Applies a `textDocument/edit` push as one `edit-file` operation.
    pub async fn apply_text_document_edit(&self, params: TextDocumentEditParams) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.perform_operation(WorkspaceEditOperation::edit_file(params.uri, params.edits)).await;
    }

    async fn perform_operation(&self, operation: WorkspaceEditOperation) {
        match operation.kind {
            OperationKind::EditFile => {
                let Some(uri) = operation.uri.as_deref() else {
                    self.report_now(FixupError::FileSwitchFailed {
                        uri: String::new(),
                        reason: "edit-file operation without a uri".into(),
                    });
                    return;
                };
                let Some(document) = self.switch_document(uri).await else {
                    return;
                };
                let edits = operation.edits.unwrap_or_default();
                let mut inner = self.lock();
                if inner.disposed || self.cancel.is_cancelled() {
                    return;
                }
                self.perform_inline_edits(&mut inner, &document, edits);
            }
            OperationKind::CreateFile => {
                let Some(uri) = operation.uri.as_deref() else {
                    return;
                };
                match self.documents.open_or_create_with(uri, operation.text_contents.as_deref()) {
                    Ok(document) => info!(session = %self.id, uri = document.uri(), "file ready"),
                    Err(error) => self.report_now(FixupError::FileSwitchFailed {
                        uri: uri.to_string(),
                        reason: error.to_string(),
                    }),
                }
            }
            OperationKind::RenameFile | OperationKind::DeleteFile | OperationKind::Unknown => {
                warn!(
                    session = %self.id,
                    operation = operation.kind.as_str(),
                    "skipping unsupported workspace operation"
                );
            }
        }
    }

    /// Makes `uri` the working document, opening or creating it and
    /// re-resolving the anchor range there. `None` if the switch failed or
    /// the session closed meanwhile.
    async fn switch_document(&self, uri: &str) -> Option<Arc<TextDocument>> {
        let target = match normalize_uri(uri) {
            Ok(target) => target,
            Err(error) => {
                self.report_now(FixupError::FileSwitchFailed {
                    uri: uri.to_string(),
                    reason: error.to_string(),
                });
                return None;
            }
        };
        {
            let inner = self.lock();
            if inner.document.uri() == target {
                return Some(Arc::clone(&inner.document));
            }
        }

        let document = match self.documents.open_or_create(&target) {
            Ok(document) => document,
            Err(error) => {
                self.report_now(FixupError::FileSwitchFailed { uri: target, reason: error.to_string() });
                return None;
            }
        };
        info!(session = %self.id, uri = document.uri(), "switching working document");

        // No selection exists in a file the user never looked at.
        let range = self.resolve_anchor(document.uri(), Range::point(Position::new(0, 0))).await;
        if self.cancel.is_cancelled() {
            return None;
        }

        let mut inner = self.lock();
        if inner.disposed {
            return None;
        }
        inner.document = Arc::clone(&document);
        self.place_anchor(&mut inner, &document, range);
        let watched = inner.subscriptions.iter().any(|(uri, _)| uri == document.uri());
        if !watched {
            if let Some(subscription) = self.watch(&document) {
                inner.subscriptions.push((document.uri().to_string(), subscription));
            }
        }
        self.emit(SessionEvent::FileSwitched { uri: document.uri().to_string() });
        Some(document)
    }

    /// Converts `edits` and applies them to `document` in one transaction.
    ///
    /// Every edit is anchored against the text as it was before the batch, so
    /// positions in one payload never see each other's effects. Unconvertible
    /// edits are skipped. The first application failure aborts the rest of the
    /// batch; what was applied before it stays applied and tracked.
    pub(super) fn perform_inline_edits(
        &self,
        inner: &mut SessionInner,
        document: &Arc<TextDocument>,
        edits: Vec<TextEdit>,
    ) {
        let batch = inner.registry.extend(edits);
        if batch.is_empty() {
            return;
        }

        let (applied, failures) = document.transact(&self.origin, |buffer| {
            let mut failures = Vec::new();
            let mut mutations = Vec::with_capacity(batch.len());
            for edit in &batch {
                match Mutation::from_edit(edit, &mut *buffer) {
                    Ok(mutation) => mutations.push(mutation),
                    Err(error) => failures.push(error),
                }
            }

            let (applied, failure) = apply_in_order(mutations, &mut *buffer);
            failures.extend(failure);
            (applied, failures)
        });

        for error in failures {
            self.report(inner, error);
        }
        let count = applied.len();
        inner.applied.extend(
            applied
                .into_iter()
                .map(|mutation| AppliedAction { document: Arc::clone(document), mutation }),
        );
        if count > 0 {
            info!(session = %self.id, uri = document.uri(), count, "edits applied");
            self.emit(SessionEvent::EditsApplied { uri: document.uri().to_string(), count });
        }
    }

    fn report_now(&self, error: FixupError) {
        let mut inner = self.lock();
        if !inner.disposed {
            self.report(&mut inner, error);
        }
    }
}
