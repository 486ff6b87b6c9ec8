// `fixup config`: show or initialize the engine configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use fixup_engine::config::{global_config_path, FixupConfig};
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config file to read instead of `~/.fixup/config.toml`.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Write the default configuration if no file exists yet.
    #[arg(long)]
    init: bool,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub path: String,
    pub exists: bool,
    pub created: bool,
    pub config: FixupConfig,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let path = match args.path {
        Some(path) => path,
        None => global_config_path().context("could not determine home directory")?,
    };
    let report = inspect(&path, args.init)?;
    output::print_output(format, &report, format_human)?;
    Ok(())
}

fn inspect(path: &Path, init: bool) -> anyhow::Result<ConfigReport> {
    let mut created = false;
    if init && !path.exists() {
        FixupConfig::default()
            .save_to(path)
            .with_context(|| format!("failed to write config `{}`", path.display()))?;
        created = true;
    }

    let exists = path.exists();
    let config = if exists {
        FixupConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?
    } else {
        FixupConfig::default()
    };
    Ok(ConfigReport { path: path.display().to_string(), exists, created, config })
}

fn format_human(report: &ConfigReport) -> String {
    let source = match (report.created, report.exists) {
        (true, _) => "created",
        (false, true) => "loaded",
        (false, false) => "not found, using defaults",
    };
    let timeouts = &report.config.timeouts;
    let session = &report.config.session;
    [
        format!("{} ({source})", report.path),
        "[timeouts]".to_string(),
        format!("  request_ms = {}", timeouts.request_ms),
        format!("  anchor_ms = {}", timeouts.anchor_ms),
        format!("  notify_ms = {}", timeouts.notify_ms),
        "[session]".to_string(),
        format!("  create_missing_files = {}", session.create_missing_files),
        format!("  event_capacity = {}", session.event_capacity),
    ]
    .join("\n")
}
