use fixup_common::protocol::TextEdit;
use uuid::Uuid;

/// Ordered edit instructions of one session, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct EditRegistry {
    edits: Vec<TextEdit>,
}

impl EditRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with `edits`, giving every edit without an id a
    /// fresh one. Returns the stored edits.
    pub fn assign(&mut self, edits: Vec<TextEdit>) -> &[TextEdit] {
        self.edits = edits.into_iter().map(with_id).collect();
        &self.edits
    }

    /// Appends a later batch, assigning ids the same way as [`Self::assign`].
    pub fn extend(&mut self, edits: Vec<TextEdit>) -> Vec<TextEdit> {
        let batch: Vec<TextEdit> = edits.into_iter().map(with_id).collect();
        self.edits.extend(batch.iter().cloned());
        batch
    }

    pub fn get(&self, id: &str) -> Option<&TextEdit> {
        self.edits.iter().find(|edit| edit.id.as_deref() == Some(id))
    }

    pub fn remove(&mut self, id: &str) -> Option<TextEdit> {
        let index = self.edits.iter().position(|edit| edit.id.as_deref() == Some(id))?;
        Some(self.edits.remove(index))
    }

    pub fn clear(&mut self) {
        self.edits.clear();
    }

    /// The edit anchored on the smallest line.
    pub fn lowest(&self) -> Option<&TextEdit> {
        self.edits
            .iter()
            .filter_map(|edit| edit.anchor_line().map(|line| (line, edit)))
            .min_by_key(|(line, _)| *line)
            .map(|(_, edit)| edit)
    }

    /// Shifts every edit down so that its decoration never overlaps another
    /// edit or the `decoration_count` reserved lines.
    ///
    /// Edits are visited from the highest anchor line down. Each one moves by
    /// the line spans of the edits visited before it plus `decoration_count`.
    /// Edits on the same line keep their relative order.
    pub fn reposition(&mut self, decoration_count: usize) {
        let mut order: Vec<usize> = (0..self.edits.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.edits[i].anchor_line().unwrap_or(i64::MIN)));

        let reserved = decoration_count as i64;
        let mut spans_above = 0;
        for index in order {
            let edit = &mut self.edits[index];
            let span = edit.line_span();
            edit.shift_lines(spans_above + reserved);
            spans_above += span;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextEdit> {
        self.edits.iter()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

fn with_id(mut edit: TextEdit) -> TextEdit {
    if edit.id.is_none() {
        edit.id = Some(Uuid::new_v4().to_string());
    }
    edit
}
