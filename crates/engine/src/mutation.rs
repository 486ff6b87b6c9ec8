// Reversible text mutations built from edit instructions.
//
// A mutation holds a "before" anchor from construction and, once applied,
// an "after" anchor over the text it wrote. Undo writes the captured
// original content back over wherever the after anchor has moved to.

use fixup_common::protocol::{EditKind, TextEdit};

use crate::document::{Anchor, LineIndex, Span, TextBuffer};
use crate::error::FixupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    /// Replace or delete; a delete replaces with the empty string.
    Replace,
}

#[derive(Debug, Clone)]
pub struct Mutation {
    edit_id: String,
    kind: MutationKind,
    text: String,
    before: Option<Anchor>,
    after: Option<Anchor>,
    original: String,
}

impl Mutation {
    /// Converts `edit` against the current content of `buffer`.
    ///
    /// Ranges are order-corrected and `-1` sentinels resolved before the
    /// before anchor is placed.
    pub fn from_edit(edit: &TextEdit, buffer: &mut dyn TextBuffer) -> Result<Self, FixupError> {
        let kind = edit.kind.as_str();
        let id = edit.id.as_deref();
        let fail = |reason: String| FixupError::creation(id, kind, reason);

        let content = buffer.text();
        let lines = LineIndex::new(&content);
        let (mutation_kind, span, text) = match edit.kind {
            EditKind::Insert => {
                let position = edit.position.ok_or_else(|| fail("missing position".into()))?;
                let position = lines.normalize_position(position);
                let offset = lines.offset(position).ok_or_else(|| {
                    fail(format!(
                        "position {}:{} is outside the document",
                        position.line, position.character
                    ))
                })?;
                let text = edit.value.clone().unwrap_or_default();
                (MutationKind::Insert, Span::new(offset, offset), text)
            }
            EditKind::Replace | EditKind::Delete => {
                let range = edit.range.ok_or_else(|| fail("missing range".into()))?;
                let span = lines.span(range).ok_or_else(|| {
                    fail(format!(
                        "range {}:{}-{}:{} is outside the document",
                        range.start.line, range.start.character, range.end.line, range.end.character
                    ))
                })?;
                let text = match edit.kind {
                    EditKind::Delete => String::new(),
                    _ => edit.value.clone().unwrap_or_default(),
                };
                (MutationKind::Replace, span, text)
            }
            EditKind::Unknown => return Err(fail("unsupported edit kind".into())),
        };

        let before = buffer.anchor(span).ok_or_else(|| fail("could not anchor target".into()))?;
        Ok(Self {
            edit_id: edit.id.clone().unwrap_or_default(),
            kind: mutation_kind,
            text,
            before: Some(before),
            after: None,
            original: String::new(),
        })
    }

    pub fn edit_id(&self) -> &str {
        &self.edit_id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn is_applied(&self) -> bool {
        self.after.is_some()
    }

    /// Writes the mutation into `buffer`. Must not be called again before
    /// [`Mutation::undo`].
    pub fn apply(&mut self, buffer: &mut dyn TextBuffer) -> Result<(), FixupError> {
        if self.after.is_some() {
            return Err(FixupError::application(&self.edit_id, "already applied"));
        }
        let before = self
            .before
            .as_ref()
            .ok_or_else(|| FixupError::application(&self.edit_id, "mutation was disposed"))?;
        let resolved = buffer
            .resolve(before)
            .ok_or_else(|| FixupError::application(&self.edit_id, "target anchor no longer resolves"))?;
        let target = match self.kind {
            MutationKind::Insert => Span::new(resolved.start, resolved.start),
            MutationKind::Replace => resolved,
        };
        let original = buffer
            .read(target)
            .ok_or_else(|| FixupError::application(&self.edit_id, "target is not readable"))?;

        buffer.splice(target, &self.text);
        let written = Span::new(target.start, target.start + self.text.len() as u32);
        let Some(after) = buffer.anchor(written) else {
            buffer.splice(written, &original);
            return Err(FixupError::application(&self.edit_id, "could not anchor written text"));
        };
        self.after = Some(after);
        self.original = original;
        Ok(())
    }

    /// Restores the content captured by [`Mutation::apply`].
    pub fn undo(&mut self, buffer: &mut dyn TextBuffer) -> Result<(), FixupError> {
        let after = self
            .after
            .as_ref()
            .ok_or_else(|| FixupError::application(&self.edit_id, "undo before apply"))?;
        let written = buffer
            .resolve(after)
            .ok_or_else(|| FixupError::application(&self.edit_id, "written text no longer resolves"))?;

        buffer.splice(written, &self.original);
        let restored = match self.kind {
            MutationKind::Insert => Span::new(written.start, written.start),
            MutationKind::Replace => {
                Span::new(written.start, written.start + self.original.len() as u32)
            }
        };
        self.before = buffer.anchor(restored);
        self.after = None;
        self.original.clear();
        Ok(())
    }

    /// Equivalent mutation tracked in `target`, a copy of `source`.
    ///
    /// Anchors are re-created at the positions they currently resolve to in
    /// `source`, so replaying `undo` on the copy leaves `source` alone.
    pub fn copy_to(&self, source: &dyn TextBuffer, target: &mut dyn TextBuffer) -> Self {
        let mut carry = |anchor: &Option<Anchor>| {
            anchor.as_ref().and_then(|a| source.resolve(a)).and_then(|span| target.anchor(span))
        };
        let before = carry(&self.before);
        let after = carry(&self.after);
        Self {
            edit_id: self.edit_id.clone(),
            kind: self.kind,
            text: self.text.clone(),
            before,
            after,
            original: self.original.clone(),
        }
    }

    /// Releases both anchors. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.before = None;
        self.after = None;
    }
}

/// Applies `mutations` in order and stops at the first failure. Returns the
/// mutations applied before it; the failed one and the rest are dropped.
pub fn apply_in_order(
    mutations: Vec<Mutation>,
    buffer: &mut dyn TextBuffer,
) -> (Vec<Mutation>, Option<FixupError>) {
    let mut applied = Vec::with_capacity(mutations.len());
    for mut mutation in mutations {
        if let Err(error) = mutation.apply(buffer) {
            return (applied, Some(error));
        }
        applied.push(mutation);
    }
    (applied, None)
}

/// Undoes `mutations` newest first and disposes each one. A failed undo does
/// not stop the others.
pub fn undo_in_reverse(mutations: &mut [Mutation], buffer: &mut dyn TextBuffer) -> Vec<FixupError> {
    let mut failures = Vec::new();
    for mutation in mutations.iter_mut().rev() {
        if let Err(error) = mutation.undo(buffer) {
            failures.push(error);
        }
        mutation.dispose();
    }
    failures
}
