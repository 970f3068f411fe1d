//! Subcommand handlers.

use crate::config::Config;
use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;
use ying_core::{
    format_host_banner, run_command, update_bucket_sizes, JsonSheet, RateLimitedRelay,
    StorageSizer, TelegramRelay,
};
use ying_types::{BucketUsage, DisplayMode, Engine};

/// Wrap `command`, mirroring output to `out` and to the configured chat.
pub fn plog(config: &Config, command: &str, mode: DisplayMode, out: impl Write) -> Result<()> {
    let options = config.plog.options(mode);
    let relay = TelegramRelay::new(
        config.telegram.api_base.clone(),
        config.telegram.bot_token.clone(),
    );
    let relay = RateLimitedRelay::new(relay, config.telegram.chat_id.clone(), options.cadence());
    let banner = format_host_banner();

    run_command(command, &options, relay, &banner, out)?;
    Ok(())
}

/// Print the size of one bucket as JSON.
pub fn bucket_size(
    config: &Config,
    sizer: &StorageSizer,
    uri: &str,
    engine: Engine,
    project_id: Option<String>,
    mut out: impl Write,
) -> Result<BucketUsage> {
    let project_id = project_id.or_else(|| config.storage.google_project_id.clone());
    let usage = sizer
        .bucket_usage(uri, engine, project_id.as_deref())
        .with_context(|| format!("failed to size {}", uri))?;
    writeln!(out, "{}", serde_json::to_string(&usage)?)?;
    Ok(usage)
}

/// Refresh every bucket listed in the report sheet.
pub fn bucket_report(
    config: &Config,
    sizer: &StorageSizer,
    sheet_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let path = sheet_path.unwrap_or_else(|| config.report.sheet_path.clone());
    let mut sheet = JsonSheet::open(&path)
        .with_context(|| format!("failed to open sheet {}", path.display()))?;
    let summary = update_bucket_sizes(
        &mut sheet,
        sizer,
        &config.report.columns(),
        config.storage.google_project_id.as_deref(),
    )?;
    info!(
        target: "ying::report",
        "Updated {} buckets, {} failed",
        summary.updated,
        summary.failed.len()
    );
    Ok(())
}
