// Wire types exchanged with the edit-task collaborator.

use serde::{Deserialize, Serialize};

/// Sentinel line number meaning "start of document" on a range start and
/// "end of document" on a range end.
pub const SENTINEL_LINE: i64 = -1;

/// A zero-based line/character position. `character` counts Unicode scalar
/// values within the line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: i64,
    pub character: i64,
}

impl Position {
    pub const fn new(line: i64, character: i64) -> Self {
        Self { line, character }
    }

    pub fn is_sentinel(&self) -> bool {
        self.line == SENTINEL_LINE
    }

    #[must_use]
    pub fn shifted(self, lines: i64) -> Self {
        Self { line: self.line + lines, character: self.character }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Shorthand for `Range::new(Position::new(..), Position::new(..))`.
    pub const fn lines(start_line: i64, start_char: i64, end_line: i64, end_char: i64) -> Self {
        Self::new(Position::new(start_line, start_char), Position::new(end_line, end_char))
    }

    /// Collapsed range at `position`.
    pub const fn point(position: Position) -> Self {
        Self { start: position, end: position }
    }

    /// Returns the range with start and end swapped when they arrive reversed.
    ///
    /// Sentinel lines are left where they are: a `-1` start already means the
    /// top of the document and a `-1` end the bottom, so they never need
    /// swapping.
    #[must_use]
    pub fn ordered(self) -> Self {
        if self.start.is_sentinel() || self.end.is_sentinel() {
            return self;
        }
        if self.start > self.end {
            Self { start: self.end, end: self.start }
        } else {
            self
        }
    }

    /// Number of lines between start and end, after ordering.
    pub fn line_span(&self) -> i64 {
        let ordered = self.ordered();
        (ordered.end.line - ordered.start.line).max(0)
    }

    #[must_use]
    pub fn shifted(self, lines: i64) -> Self {
        Self { start: self.start.shifted(lines), end: self.end.shifted(lines) }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// ── Edit instructions ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Insert,
    Replace,
    Delete,
    /// Any kind this engine does not understand.
    #[serde(other)]
    Unknown,
}

impl EditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Unknown => "unknown",
        }
    }
}

/// One raw edit instruction as proposed by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextEdit {
    #[serde(rename = "type")]
    pub kind: EditKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl TextEdit {
    pub fn insert(position: Position, value: impl Into<String>) -> Self {
        Self {
            kind: EditKind::Insert,
            id: None,
            range: None,
            position: Some(position),
            value: Some(value.into()),
        }
    }

    pub fn replace(range: Range, value: impl Into<String>) -> Self {
        Self {
            kind: EditKind::Replace,
            id: None,
            range: Some(range),
            position: None,
            value: Some(value.into()),
        }
    }

    pub fn delete(range: Range) -> Self {
        Self { kind: EditKind::Delete, id: None, range: Some(range), position: None, value: None }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The line this edit is anchored to: the insert position, or the start of
    /// the (ordered) range for replacements and deletions.
    pub fn anchor_line(&self) -> Option<i64> {
        match self.kind {
            EditKind::Insert => self.position.map(|p| p.line),
            _ => self.range.map(|r| r.ordered().start.line),
        }
    }

    /// Lines covered by the edit's range; zero for inserts.
    pub fn line_span(&self) -> i64 {
        match self.kind {
            EditKind::Insert => 0,
            _ => self.range.map(|r| r.line_span()).unwrap_or(0),
        }
    }

    /// Moves the stored position/range down by `lines`.
    pub fn shift_lines(&mut self, lines: i64) {
        if let Some(position) = self.position.as_mut() {
            *position = position.shifted(lines);
        }
        if let Some(range) = self.range.as_mut() {
            *range = range.shifted(lines);
        }
    }
}

// ── Workspace edits ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    CreateFile,
    RenameFile,
    DeleteFile,
    EditFile,
    #[serde(other)]
    Unknown,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateFile => "create-file",
            Self::RenameFile => "rename-file",
            Self::DeleteFile => "delete-file",
            Self::EditFile => "edit-file",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEditOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_contents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edits: Option<Vec<TextEdit>>,
}

impl WorkspaceEditOperation {
    pub fn edit_file(uri: impl Into<String>, edits: Vec<TextEdit>) -> Self {
        Self {
            kind: OperationKind::EditFile,
            uri: Some(uri.into()),
            old_uri: None,
            new_uri: None,
            text_contents: None,
            edits: Some(edits),
        }
    }

    pub fn create_file(uri: impl Into<String>, text_contents: Option<String>) -> Self {
        Self {
            kind: OperationKind::CreateFile,
            uri: Some(uri.into()),
            old_uri: None,
            new_uri: None,
            text_contents,
            edits: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceEditParams {
    #[serde(default)]
    pub operations: Vec<WorkspaceEditOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextDocumentEditParams {
    pub uri: String,
    #[serde(default)]
    pub edits: Vec<TextEdit>,
}

// ── Tasks ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Internal marker before the collaborator reports progress.
    Pending,
    Working,
    Inserting,
    Applying,
    Formatting,
    Applied,
    Finished,
    Error,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Working => "Working",
            Self::Inserting => "Inserting",
            Self::Applying => "Applying",
            Self::Formatting => "Formatting",
            Self::Applied => "Applied",
            Self::Finished => "Finished",
            Self::Error => "Error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    pub fn is_transient(self) -> bool {
        matches!(self, Self::Working | Self::Inserting | Self::Applying | Self::Formatting)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskError {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditTask {
    pub id: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Edits the collaborator plans to make.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<TextEdit>,
}

impl EditTask {
    pub fn new(id: impl Into<String>, state: TaskState) -> Self {
        Self {
            id: id.into(),
            state,
            error: None,
            selection_range: None,
            instruction: None,
            model: None,
            edits: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_selection(mut self, range: Range) -> Self {
        self.selection_range = Some(range);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskIdParams {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoldingRangeParams {
    pub uri: String,
    pub range: Range,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ordered_swaps_reversed_range() {
        let range = Range::lines(5, 2, 1, 0);
        assert_eq!(range.ordered(), Range::lines(1, 0, 5, 2));
        assert_eq!(range.line_span(), 4);
    }

    #[test]
    fn ordered_keeps_sentinels_in_place() {
        let range = Range::lines(3, 0, -1, 0);
        assert_eq!(range.ordered(), range);
    }

    #[test]
    fn text_edit_decodes_camel_case_wire_format() {
        let edit: TextEdit = serde_json::from_value(json!({
            "type": "replace",
            "id": "e1",
            "range": { "start": { "line": 2, "character": 0 }, "end": { "line": 4, "character": 3 } },
            "value": "fn main() {}"
        }))
        .expect("edit should decode");
        assert_eq!(edit.kind, EditKind::Replace);
        assert_eq!(edit.anchor_line(), Some(2));
        assert_eq!(edit.line_span(), 2);
    }

    #[test]
    fn unknown_edit_kind_decodes_without_failing() {
        let edit: TextEdit = serde_json::from_value(json!({ "type": "wrap", "value": "x" }))
            .expect("unknown kinds should still decode");
        assert_eq!(edit.kind, EditKind::Unknown);
    }

    #[test]
    fn workspace_operation_uses_kebab_case_kinds() {
        let params: WorkspaceEditParams = serde_json::from_value(json!({
            "operations": [
                { "type": "create-file", "uri": "file:///tmp/a.rs", "textContents": "" },
                { "type": "rename-file", "oldUri": "file:///a", "newUri": "file:///b" },
                { "type": "edit-file", "uri": "file:///tmp/a.rs", "edits": [] }
            ]
        }))
        .expect("operations should decode");
        let kinds: Vec<_> = params.operations.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::CreateFile, OperationKind::RenameFile, OperationKind::EditFile]
        );
        assert_eq!(params.operations[1].new_uri.as_deref(), Some("file:///b"));
    }

    #[test]
    fn edit_task_round_trips_selection_range() {
        let task = EditTask::new("task-1", TaskState::Working).with_selection(Range::lines(0, 0, 5, 0));
        let value = serde_json::to_value(&task).expect("task should serialize");
        assert_eq!(value["state"], "Working");
        assert_eq!(value["selectionRange"]["end"]["line"], 5);
        assert!(value.get("edits").is_none());
    }

    #[test]
    fn shift_lines_moves_position_and_range() {
        let mut edit = TextEdit::replace(Range::lines(10, 0, 12, 4), "x");
        edit.shift_lines(3);
        assert_eq!(edit.range, Some(Range::lines(13, 0, 15, 4)));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Error.is_terminal());
        assert!(!TaskState::Applied.is_terminal());
        assert!(TaskState::Formatting.is_transient());
        assert!(!TaskState::Pending.is_transient());
    }
}
