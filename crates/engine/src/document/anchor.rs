// Position anchors that survive edits made around them.
//
// Two backends: sticky indices bound to the live CRDT text, and offset slots
// owned by a detached in-memory copy. Mutations only see `TextBuffer`.

use yrs::{Assoc, GetString, IndexedSequence, ReadTxn, StickyIndex, Text, TextRef, TransactionMut};

use super::Span;

#[derive(Debug, Clone)]
pub enum Anchor {
    /// Bound to items of a live document.
    Sticky { start: StickyIndex, end: StickyIndex },
    /// Slot in a `DetachedBuffer` offset table.
    Detached(usize),
}

/// Text storage a mutation can be applied to.
pub trait TextBuffer {
    fn text(&self) -> String;

    fn len(&self) -> u32;

    /// Starts tracking `span`. `None` when the span is outside the buffer.
    fn anchor(&mut self, span: Span) -> Option<Anchor>;

    /// Where a previously created anchor sits now.
    fn resolve(&self, anchor: &Anchor) -> Option<Span>;

    /// Replaces `span` with `replacement`.
    fn splice(&mut self, span: Span, replacement: &str);

    fn read(&self, span: Span) -> Option<String> {
        self.text().get(span.start as usize..span.end as usize).map(str::to_string)
    }
}

// ── Live backend ───────────────────────────────────────────────────

/// A live document seen through one open write transaction.
pub struct LiveBuffer<'a, 'doc> {
    text: &'a TextRef,
    txn: &'a mut TransactionMut<'doc>,
}

impl<'a, 'doc> LiveBuffer<'a, 'doc> {
    pub(crate) fn new(text: &'a TextRef, txn: &'a mut TransactionMut<'doc>) -> Self {
        Self { text, txn }
    }
}

impl TextBuffer for LiveBuffer<'_, '_> {
    fn text(&self) -> String {
        self.text.get_string(&*self.txn)
    }

    fn len(&self) -> u32 {
        self.text.len(&*self.txn)
    }

    fn anchor(&mut self, span: Span) -> Option<Anchor> {
        if span.end > self.len() {
            return None;
        }
        // A collapsed anchor binds both ends to the same item so it stays
        // collapsed when text lands exactly on it.
        if span.is_empty() {
            let point = self.text.sticky_index(self.txn, span.start, Assoc::After)?;
            return Some(Anchor::Sticky { start: point.clone(), end: point });
        }
        let start = self.text.sticky_index(self.txn, span.start, Assoc::After)?;
        let end = self.text.sticky_index(self.txn, span.end, Assoc::Before)?;
        Some(Anchor::Sticky { start, end })
    }

    fn resolve(&self, anchor: &Anchor) -> Option<Span> {
        match anchor {
            Anchor::Sticky { start, end } => resolve_sticky(&*self.txn, start, end),
            Anchor::Detached(_) => None,
        }
    }

    fn splice(&mut self, span: Span, replacement: &str) {
        if !span.is_empty() {
            self.text.remove_range(self.txn, span.start, span.len());
        }
        if !replacement.is_empty() {
            self.text.insert(self.txn, span.start, replacement);
        }
    }
}

pub(crate) fn resolve_sticky<T: ReadTxn>(
    txn: &T,
    start: &StickyIndex,
    end: &StickyIndex,
) -> Option<Span> {
    let start = start.get_offset(txn)?.index;
    let end = end.get_offset(txn)?.index;
    // Deleting everything between the ends can leave them crossed.
    Some(Span::new(start, end.max(start)))
}

// ── Detached backend ───────────────────────────────────────────────

/// An in-memory copy of a document with its own offset-table anchors.
#[derive(Debug, Clone, Default)]
pub struct DetachedBuffer {
    content: String,
    slots: Vec<Span>,
}

impl DetachedBuffer {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), slots: Vec::new() }
    }

    pub fn into_text(self) -> String {
        self.content
    }
}

impl TextBuffer for DetachedBuffer {
    fn text(&self) -> String {
        self.content.clone()
    }

    fn len(&self) -> u32 {
        self.content.len() as u32
    }

    fn anchor(&mut self, span: Span) -> Option<Anchor> {
        let fits = (span.end as usize) <= self.content.len()
            && self.content.is_char_boundary(span.start as usize)
            && self.content.is_char_boundary(span.end as usize);
        if !fits {
            return None;
        }
        self.slots.push(span);
        Some(Anchor::Detached(self.slots.len() - 1))
    }

    fn resolve(&self, anchor: &Anchor) -> Option<Span> {
        match anchor {
            Anchor::Detached(slot) => self.slots.get(*slot).copied(),
            Anchor::Sticky { .. } => None,
        }
    }

    fn splice(&mut self, span: Span, replacement: &str) {
        self.content.replace_range(span.start as usize..span.end as usize, replacement);
        let inserted = replacement.len() as u32;
        for slot in &mut self.slots {
            *slot = shift_slot(*slot, span, inserted);
        }
    }

    fn read(&self, span: Span) -> Option<String> {
        self.content.get(span.start as usize..span.end as usize).map(str::to_string)
    }
}

/// Moves a tracked span across a splice of `edit` that inserted `inserted`
/// bytes. The leading edge follows the character after it and the trailing
/// edge the character before it, the same way the live backend binds them.
fn shift_slot(slot: Span, edit: Span, inserted: u32) -> Span {
    let start = shift_point(slot.start, edit, inserted, true);
    if slot.is_empty() {
        return Span::new(start, start);
    }
    let end = shift_point(slot.end, edit, inserted, false);
    Span::new(start, end.max(start))
}

fn shift_point(point: u32, edit: Span, inserted: u32, leading: bool) -> u32 {
    let moved = |p: u32| p - edit.len() + inserted;
    if leading {
        if point < edit.start {
            point
        } else if point >= edit.end {
            moved(point)
        } else {
            edit.start
        }
    } else if point <= edit.start {
        point
    } else if point > edit.end {
        moved(point)
    } else {
        edit.start + inserted
    }
}
