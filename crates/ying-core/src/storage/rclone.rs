//! Bucket usage through `rclone size`.
//!
//! The URI scheme doubles as the rclone remote name, which must be defined
//! in the environment (`RCLONE_CONFIG_<REMOTE>_TYPE`).

use super::runner::CommandRunner;
use super::BucketUri;
use crate::{Result, YingError};
use serde::Deserialize;
use tracing::debug;
use ying_types::BucketUsage;

#[derive(Debug, Deserialize)]
struct RcloneSize {
    count: i64,
    bytes: i64,
}

pub fn remote_env_key(remote: &str) -> String {
    format!("RCLONE_CONFIG_{}_TYPE", remote.to_ascii_uppercase())
}

pub fn parse_rclone_size(json: &str) -> Result<BucketUsage> {
    let size: RcloneSize = serde_json::from_str(json.trim())
        .map_err(|e| YingError::ParseError(format!("rclone size output: {}", e)))?;
    Ok(BucketUsage::new(size.bytes, size.count))
}

/// `None` when no remote is configured for the scheme.
pub fn rclone_usage(
    runner: &dyn CommandRunner,
    env: &dyn Fn(&str) -> Option<String>,
    uri: &BucketUri,
) -> Result<Option<BucketUsage>> {
    let remote = uri.scheme.as_str();
    if env(&remote_env_key(remote)).is_none_or(|v| v.is_empty()) {
        debug!(target: "ying::storage", "No rclone remote configured for '{}'", remote);
        return Ok(None);
    }

    let target = format!("{}:{}", remote, uri.bucket);
    let out = runner.run("rclone", &["size".into(), "--json".into(), target])?;
    parse_rclone_size(&out).map(Some)
}
