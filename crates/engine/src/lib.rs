// fixup-engine: inline AI edit sessions over live CRDT documents.

pub mod collaborator;
pub mod command;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod mutation;
pub mod registry;
pub mod session;

pub use collaborator::{Collaborator, CollaboratorFuture};
pub use command::{EditCommand, EditRequest};
pub use config::FixupConfig;
pub use controller::SessionController;
pub use document::{DocumentStore, TextDocument};
pub use error::{CollaboratorError, FixupError};
pub use session::{FixupSession, SessionDiff, SessionEvent};
