// Output layer for the fixup CLI.
//
// Reports go to stdout: human text on a terminal, one JSON object per line
// otherwise (or with `--json`). Errors and warnings go to stderr in the same
// format so logs and machine output never mix.

use serde::Serialize;
use std::io::{self, IsTerminal, Write};

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    /// JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Print a report to stdout. `human_fn` only runs for human output.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    if format == OutputFormat::Human {
        return writeln!(writer, "{}", human_fn(value));
    }
    serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
    writeln!(writer)
}

pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    print_diagnostic(format, Severity::Error, code, message);
}

pub fn print_warning(format: OutputFormat, code: &str, message: &str) {
    print_diagnostic(format, Severity::Warning, code, message);
}

#[derive(Debug, Clone, Copy)]
enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Error => ANSI_RED,
            Self::Warning => ANSI_YELLOW,
        }
    }
}

fn print_diagnostic(format: OutputFormat, severity: Severity, code: &str, message: &str) {
    let is_tty = io::stderr().is_terminal();
    let _ = write_diagnostic(&mut io::stderr().lock(), format, severity, code, message, is_tty);
}

fn write_diagnostic<W: Write>(
    writer: &mut W,
    format: OutputFormat,
    severity: Severity,
    code: &str,
    message: &str,
    is_tty: bool,
) -> io::Result<()> {
    match format {
        OutputFormat::Human => {
            let line = render_human_stderr_line(severity.label(), message, is_tty, severity.color());
            writeln!(writer, "{line}")
        }
        OutputFormat::Json => {
            let mut body = serde_json::Map::new();
            body.insert(
                severity.label().to_string(),
                serde_json::json!({ "code": code, "message": message }),
            );
            serde_json::to_writer(&mut *writer, &body).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    let message = format!("{error:#}");
    let lower = message.to_ascii_lowercase();

    if lower.contains("timed out") {
        return (
            "REQUEST_TIMEOUT",
            format!("{message}. Raise the bound in ~/.fixup/config.toml under [timeouts]"),
        );
    }

    if lower.contains("transcript") {
        let path = extract_backticked(&message).unwrap_or_else(|| "<transcript>".to_string());
        return ("TRANSCRIPT_INVALID", format!("Could not use transcript {path}: {message}"));
    }

    if lower.contains("selection") {
        return ("USAGE", format!("{message}. Expected LINE:COL-LINE:COL, e.g. 0:0-5:0"));
    }

    if lower.contains("no such file") || lower.contains("does not exist") {
        let path = extract_backticked(&message).unwrap_or_else(|| "<file>".to_string());
        return ("FILE_NOT_FOUND", format!("File {path} not found"));
    }

    ("ERROR", message)
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}

fn extract_backticked(message: &str) -> Option<String> {
    let mut parts = message.split('`');
    let _before = parts.next()?;
    let candidate = parts.next()?.trim();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}
