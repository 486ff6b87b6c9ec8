// Edit commands a session can be started with.

use fixup_common::protocol::{methods, Range};
use serde::Serialize;
use serde_json::{json, Value};

/// The one thing that differs between kinds of edit session: which request
/// starts the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EditCommand {
    DocumentCode,
    GenerateTests,
    FixProblem,
    Instruction {
        instruction: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
}

impl EditCommand {
    pub fn instruction(instruction: impl Into<String>) -> Self {
        Self::Instruction { instruction: instruction.into(), model: None }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::DocumentCode => methods::EDIT_COMMANDS_DOCUMENT,
            Self::GenerateTests => methods::EDIT_COMMANDS_TEST,
            Self::FixProblem => methods::COMMANDS_FIX,
            Self::Instruction { .. } => methods::EDIT_COMMANDS_CODE,
        }
    }

    /// Same command with the instruction text replaced, for a retry. Commands
    /// without free-form text become instruction commands.
    #[must_use]
    pub fn with_instruction(&self, instruction: Option<String>) -> Self {
        match (self, instruction) {
            (command, None) => command.clone(),
            (Self::Instruction { model, .. }, Some(instruction)) => {
                Self::Instruction { instruction, model: model.clone() }
            }
            (_, Some(instruction)) => Self::Instruction { instruction, model: None },
        }
    }
}

/// Everything the collaborator needs to start a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub command: EditCommand,
    pub uri: String,
    pub range: Range,
}

impl EditRequest {
    pub fn method(&self) -> &'static str {
        self.command.method()
    }

    /// JSON-RPC params for [`Self::method`].
    pub fn params(&self) -> Value {
        match &self.command {
            EditCommand::Instruction { instruction, model } => json!({
                "uri": self.uri,
                "range": self.range,
                "instruction": instruction,
                "model": model,
            }),
            _ => json!({ "uri": self.uri, "range": self.range }),
        }
    }
}
