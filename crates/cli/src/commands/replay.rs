// `fixup replay`: drive one edit session against a recorded agent transcript.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, ValueEnum};
use fixup_common::protocol::{Position, Range, TaskState};
use fixup_engine::{DocumentStore, EditCommand, FixupConfig, FixupSession, SessionController};
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::output::{self, OutputFormat};
use crate::transcript::{ReplayCollaborator, Transcript};

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// File the session starts in.
    pub file: PathBuf,

    /// Recorded agent answers and pushes (JSON).
    #[arg(long)]
    transcript: PathBuf,

    /// Kind of edit request to start.
    #[arg(long, value_enum, default_value_t = CommandKind::Edit)]
    command: CommandKind,

    /// Instruction text for `--command edit`.
    #[arg(long)]
    instruction: Option<String>,

    /// Selection as `LINE:COL-LINE:COL` (zero-based). Defaults to the whole file.
    #[arg(long)]
    selection: Option<String>,

    /// What to do once the pushes have been delivered.
    #[arg(long, value_enum, default_value_t = FinalAction::None)]
    then: FinalAction,

    /// Write the resulting documents back to disk.
    #[arg(long)]
    write: bool,

    /// Config file to use instead of `~/.fixup/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CommandKind {
    Document,
    Test,
    Fix,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalAction {
    Accept,
    Undo,
    Cancel,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub task_id: Option<String>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub anchor: Range,
    pub applied: usize,
    pub failures: Vec<String>,
    pub action: FinalAction,
    pub action_taken: bool,
    pub files: Vec<FileChange>,
    pub written: Vec<String>,
    /// Methods the host sent to the agent, in order.
    pub sent: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub uri: String,
    pub inserted: usize,
    pub deleted: usize,
    pub diff: String,
}

pub fn run(args: ReplayArgs) -> anyhow::Result<ReplayReport> {
    let format = OutputFormat::detect(args.json);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report = runtime.block_on(replay(args))?;
    output::print_output(format, &report, format_human)?;
    if report.action != FinalAction::None && !report.action_taken {
        output::print_warning(
            format,
            "ACTION_UNAVAILABLE",
            &format!("session was {} so {:?} was not performed", report.state, report.action),
        );
    }
    Ok(report)
}

async fn replay(args: ReplayArgs) -> anyhow::Result<ReplayReport> {
    let config = match &args.config {
        Some(path) => FixupConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => FixupConfig::load(),
    };
    let transcript = Transcript::load(&args.transcript)?;
    let pushes = transcript.pushes();
    let agent = Arc::new(ReplayCollaborator::new(transcript));

    let uri = file_uri(&args.file)?;
    let selection = match &args.selection {
        Some(raw) => parse_selection(raw)?,
        None => Range::lines(0, 0, -1, -1),
    };
    let command = edit_command(args.command, args.instruction.clone())?;

    let documents = Arc::new(DocumentStore::new(config.session.create_missing_files));
    let controller = SessionController::new(agent.clone(), Arc::clone(&documents), config);
    let session = controller.start_session(command, &uri, selection).await?;
    info!(task_id = ?session.task_id(), state = %session.state(), "edit request answered");

    for push in pushes {
        controller.handle_notification(push).await;
    }

    let changes = collect_changes(&session);
    let applied = session.applied_action_count();
    let state_before_action = session.state();
    let action_taken = match args.then {
        FinalAction::Accept => session.accept().await,
        FinalAction::Undo => session.undo().await,
        FinalAction::Cancel => session.cancel().await,
        FinalAction::None => false,
    };

    let mut written = Vec::new();
    if args.write {
        for change in &changes {
            let path = documents
                .save(&change.uri)
                .with_context(|| format!("failed to write `{}`", change.uri))?;
            written.push(path.display().to_string());
        }
    }

    let state = if action_taken { session.state() } else { state_before_action };
    Ok(ReplayReport {
        task_id: session.task_id(),
        state: state.to_string(),
        error: session.error_message(),
        anchor: session.anchor_range(),
        applied,
        failures: session.failures().iter().map(ToString::to_string).collect(),
        action: args.then,
        action_taken,
        files: changes,
        written,
        sent: agent.sent(),
    })
}

fn collect_changes(session: &FixupSession) -> Vec<FileChange> {
    session
        .diffs()
        .into_iter()
        .map(|diff| {
            let (inserted, deleted) = diff.line_counts();
            FileChange { uri: diff.uri.clone(), inserted, deleted, diff: diff.unified() }
        })
        .collect()
}

fn edit_command(kind: CommandKind, instruction: Option<String>) -> anyhow::Result<EditCommand> {
    Ok(match kind {
        CommandKind::Document => EditCommand::DocumentCode,
        CommandKind::Test => EditCommand::GenerateTests,
        CommandKind::Fix => EditCommand::FixProblem,
        CommandKind::Edit => {
            let instruction =
                instruction.context("--instruction is required with --command edit")?;
            EditCommand::instruction(instruction)
        }
    })
}

fn file_uri(path: &Path) -> anyhow::Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().context("failed to read current directory")?.join(path)
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| anyhow::anyhow!("`{}` is not a valid file path", absolute.display()))
}

/// Parses `LINE:COL-LINE:COL`.
pub fn parse_selection(raw: &str) -> anyhow::Result<Range> {
    let invalid = || anyhow::anyhow!("invalid selection `{raw}`");
    let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
    let position = |part: &str| -> anyhow::Result<Position> {
        let (line, character) = part.trim().split_once(':').ok_or_else(invalid)?;
        let line = line.parse::<i64>().map_err(|_| invalid())?;
        let character = character.parse::<i64>().map_err(|_| invalid())?;
        Ok(Position::new(line, character))
    };
    Ok(Range::new(position(start)?, position(end)?))
}

fn format_human(report: &ReplayReport) -> String {
    let mut lines = Vec::new();
    let task = report.task_id.as_deref().unwrap_or("-");
    lines.push(format!("task {task}: {}", report.state));
    if let Some(error) = &report.error {
        lines.push(format!("  error: {error}"));
    }
    lines.push(format!(
        "  anchor {}:{}-{}:{}",
        report.anchor.start.line,
        report.anchor.start.character,
        report.anchor.end.line,
        report.anchor.end.character
    ));
    for failure in &report.failures {
        lines.push(format!("  skipped: {failure}"));
    }
    if report.action != FinalAction::None {
        let outcome = if report.action_taken { "done" } else { "not available" };
        lines.push(format!("  {:?}: {outcome}", report.action).to_lowercase());
    }

    if report.files.is_empty() {
        lines.push("  No changes.".into());
    }
    for file in &report.files {
        lines.push(String::new());
        lines.push(format!("{} (+{} -{})", file.uri, file.inserted, file.deleted));
        lines.push(file.diff.trim_end().to_string());
    }
    for path in &report.written {
        lines.push(format!("wrote {path}"));
    }
    lines.join("\n")
}

/// Whether the session ended in a state the caller should treat as failure.
pub fn failed(report: &ReplayReport) -> bool {
    report.state == TaskState::Error.as_str()
}
