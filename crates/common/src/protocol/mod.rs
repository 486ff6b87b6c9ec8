pub mod jsonrpc;
pub mod methods;
pub mod notification;
pub mod types;

pub use notification::{DecodeError, TaskNotification};
pub use types::{
    EditKind, EditTask, FoldingRangeParams, OperationKind, Position, Range, TaskError,
    TaskIdParams, TaskState, TextDocumentEditParams, TextEdit, WorkspaceEditOperation,
    WorkspaceEditParams,
};
