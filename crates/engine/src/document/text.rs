// Live text document backed by a yrs CRDT text.

use fixup_common::protocol::Range;
use yrs::{Doc, GetString, Text, TextRef, Transact};

use super::anchor::{resolve_sticky, Anchor, LiveBuffer};
use super::lines::LineIndex;
use super::{DocumentError, Span};

/// Name of the shared text type holding the document body.
pub const CONTENT_TEXT: &str = "content";

/// Handle returned by [`TextDocument::observe_updates`]; dropping it stops
/// the callback.
pub type UpdateSubscription = yrs::Subscription;

/// A document open in the editing surface.
///
/// One call to [`TextDocument::transact`] is one yrs transaction, so the
/// host's undo manager and sync peers see its edits as a single update.
pub struct TextDocument {
    uri: String,
    doc: Doc,
}

impl TextDocument {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), doc: Doc::new() }
    }

    pub fn with_text(uri: impl Into<String>, content: &str) -> Self {
        let document = Self::new(uri);
        if !content.is_empty() {
            document.edit(0, 0, content);
        }
        document
    }

    /// Create a document with a specific client ID (for deterministic testing).
    pub fn with_client_id(uri: impl Into<String>, client_id: u64) -> Self {
        let options = yrs::Options { client_id, ..Default::default() };
        Self { uri: uri.into(), doc: Doc::with_options(options) }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn content(&self) -> TextRef {
        self.doc.get_or_insert_text(CONTENT_TEXT)
    }

    pub fn text(&self) -> String {
        let content = self.content();
        let txn = self.doc.transact();
        content.get_string(&txn)
    }

    pub fn len(&self) -> u32 {
        let content = self.content();
        let txn = self.doc.transact();
        content.len(&txn)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` inside one write transaction tagged with `origin`.
    ///
    /// `f` must not touch this document through any other path: the
    /// transaction holds the document until it returns.
    pub fn transact<R>(&self, origin: &str, f: impl FnOnce(&mut LiveBuffer<'_, '_>) -> R) -> R {
        let content = self.content();
        let mut txn = self.doc.transact_mut_with(origin);
        let mut buffer = LiveBuffer::new(&content, &mut txn);
        f(&mut buffer)
    }

    /// Untagged edit, as a user or a sync peer would make it.
    pub fn edit(&self, offset: u32, remove: u32, insert: &str) {
        let content = self.content();
        let mut txn = self.doc.transact_mut();
        if remove > 0 {
            content.remove_range(&mut txn, offset, remove);
        }
        if !insert.is_empty() {
            content.insert(&mut txn, offset, insert);
        }
    }

    /// Current span of a live anchor.
    pub fn resolve(&self, anchor: &Anchor) -> Option<Span> {
        let Anchor::Sticky { start, end } = anchor else {
            return None;
        };
        let txn = self.doc.transact();
        resolve_sticky(&txn, start, end)
    }

    /// Current line/character range of a live anchor.
    pub fn resolve_range(&self, anchor: &Anchor) -> Option<Range> {
        let span = self.resolve(anchor)?;
        let text = self.text();
        Some(LineIndex::new(&text).range(span))
    }

    /// Calls `on_update` with the origin of every committed transaction that
    /// changed the document.
    pub fn observe_updates<F>(&self, on_update: F) -> Result<UpdateSubscription, DocumentError>
    where
        F: Fn(Option<&[u8]>) + Send + Sync + 'static,
    {
        self.doc
            .observe_update_v1(move |txn, _| on_update(txn.origin().map(|origin| origin.as_ref())))
            .map_err(|error| DocumentError::Observe(format!("{error:?}")))
    }
}

impl std::fmt::Debug for TextDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDocument").field("uri", &self.uri).finish_non_exhaustive()
    }
}
