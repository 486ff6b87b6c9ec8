use similar::{ChangeTag, TextDiff};

/// Text of one document before and after the edits of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDiff {
    pub uri: String,
    pub before: String,
    pub after: String,
}

impl SessionDiff {
    pub fn is_empty(&self) -> bool {
        self.before == self.after
    }

    /// Unified diff with three lines of context.
    pub fn unified(&self) -> String {
        let diff = TextDiff::from_lines(&self.before, &self.after);
        diff.unified_diff().context_radius(3).header(&self.uri, &self.uri).to_string()
    }

    /// Number of inserted and deleted lines.
    pub fn line_counts(&self) -> (usize, usize) {
        let diff = TextDiff::from_lines(&self.before, &self.after);
        diff.iter_all_changes().fold((0, 0), |(ins, del), change| match change.tag() {
            ChangeTag::Insert => (ins + 1, del),
            ChangeTag::Delete => (ins, del + 1),
            ChangeTag::Equal => (ins, del),
        })
    }
}
