// Method names for the edit-task protocol.

// ── Host → agent requests ──────────────────────────────────────────
pub const EDIT_TASK_ACCEPT: &str = "editTask/accept";
pub const EDIT_TASK_UNDO: &str = "editTask/undo";
pub const EDIT_TASK_CANCEL: &str = "editTask/cancel";
pub const EDIT_TASK_GET_FOLDING_RANGES: &str = "editTask/getFoldingRanges";

// ── Edit commands ──────────────────────────────────────────────────
pub const EDIT_COMMANDS_CODE: &str = "editCommands/code";
pub const EDIT_COMMANDS_DOCUMENT: &str = "editCommands/document";
pub const EDIT_COMMANDS_TEST: &str = "editCommands/test";
pub const COMMANDS_FIX: &str = "commands/fix";

// ── Agent → host pushes ────────────────────────────────────────────
pub const EDIT_TASK_DID_UPDATE: &str = "editTask/didUpdate";
pub const EDIT_TASK_DID_DELETE: &str = "editTask/didDelete";
pub const WORKSPACE_EDIT: &str = "workspace/edit";
pub const TEXT_DOCUMENT_EDIT: &str = "textDocument/edit";

/// Every push the session engine knows how to route.
pub const PUSH_METHODS: &[&str] =
    &[EDIT_TASK_DID_UPDATE, EDIT_TASK_DID_DELETE, WORKSPACE_EDIT, TEXT_DOCUMENT_EDIT];

/// Every request that starts a new edit task.
pub const EDIT_COMMAND_METHODS: &[&str] =
    &[EDIT_COMMANDS_CODE, EDIT_COMMANDS_DOCUMENT, EDIT_COMMANDS_TEST, COMMANDS_FIX];

#[must_use]
pub fn is_push_method(method: &str) -> bool {
    PUSH_METHODS.contains(&method)
}
