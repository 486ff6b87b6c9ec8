// Consistent exit codes for the fixup CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = session ended in Error
//   11 = agent round trip timed out
//   12 = file could not be read or written

use std::process;

use fixup_engine::error::FixupError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    SessionFailed = 10,
    Timeout = 11,
    Io = 12,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(fixup) = cause.downcast_ref::<FixupError>() {
                return Self::from_fixup(fixup);
            }
            if cause.downcast_ref::<std::io::Error>().is_some() {
                return Self::Io;
            }
            if cause.downcast_ref::<serde_json::Error>().is_some() {
                return Self::Usage;
            }
        }
        Self::Error
    }

    pub fn from_fixup(err: &FixupError) -> Self {
        match err {
            FixupError::RequestTimeout { .. } => Self::Timeout,
            FixupError::RequestFailed { .. } => Self::SessionFailed,
            FixupError::FileSwitchFailed { .. } => Self::Io,
            FixupError::InvalidSessionState { .. } => Self::Usage,
            FixupError::EditCreationFailed { .. } | FixupError::EditApplicationFailed { .. } => {
                Self::Error
            }
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
