pub mod anchor;
pub mod lines;
pub mod store;
pub mod text;

use std::path::PathBuf;

pub use anchor::{Anchor, DetachedBuffer, LiveBuffer, TextBuffer};
pub use lines::LineIndex;
pub use store::{normalize_uri, uri_to_path, DocumentStore};
pub use text::{TextDocument, UpdateSubscription, CONTENT_TEXT};

/// Half-open UTF-8 byte range `[start, end)` in a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("`{0}` is not a file URI or path")]
    InvalidUri(String),
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not observe document updates: {0}")]
    Observe(String),
}
