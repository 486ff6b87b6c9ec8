use fixup_common::protocol::{Range, TaskState};

use crate::error::FixupError;

/// Progress of a session, broadcast to whoever renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The anchor range is final; decorations may be shown from here on.
    AnchorResolved(Range),
    StateChanged(TaskState),
    FileSwitched { uri: String },
    EditsApplied { uri: String, count: usize },
    /// A non-fatal failure inside a batch or workspace operation.
    EditFailed(FixupError),
    EditAccepted { edit_id: String },
    EditRejected { edit_id: String },
    Accepted,
    Cancelled,
    Undone,
    Dismissed,
    /// The session reached `Error`; the message is meant for the user.
    Failed(String),
    Disposed,
}
