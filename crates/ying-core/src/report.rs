//! Refresh bucket sizes recorded in a sheet.

use crate::sheet::{Row, Sheet};
use crate::storage::StorageSizer;
use crate::Result;
use human_bytes::human_bytes;
use serde_json::Value;
use tracing::{error, info};
use ying_types::{BucketUsage, Engine};

/// Column names used by the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportColumns {
    pub bucket: String,
    pub bytes: String,
    pub count: String,
}

impl Default for ReportColumns {
    fn default() -> Self {
        Self {
            bucket: "bucket".into(),
            bytes: "bytes".into(),
            count: "count".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub updated: usize,
    pub failed: Vec<String>,
}

/// Human-readable size; the unknown sentinel is kept as-is.
pub fn format_bytes(bytes: i64) -> Value {
    if bytes < 0 {
        Value::from(BucketUsage::UNKNOWN)
    } else {
        Value::from(human_bytes(bytes as f64))
    }
}

/// Query every bucket listed in the sheet and write back its size and count.
///
/// A bucket that fails is logged and skipped.
pub fn update_bucket_sizes(
    sheet: &mut dyn Sheet,
    sizer: &StorageSizer,
    columns: &ReportColumns,
    project_id: Option<&str>,
) -> Result<ReportSummary> {
    let uris: Vec<String> = sheet
        .find(&Row::new())?
        .iter()
        .filter_map(|row| row.get(&columns.bucket))
        .filter_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .collect();
    info!(target: "ying::report", "Updating {} buckets", uris.len());

    let mut summary = ReportSummary::default();
    for uri in uris {
        let usage = match sizer.bucket_usage(uri.trim(), Engine::Auto, project_id) {
            Ok(usage) => usage,
            Err(e) => {
                error!(target: "ying::report", "Failed to size {}: {}", uri, e);
                summary.failed.push(uri);
                continue;
            }
        };

        let mut filter = Row::new();
        filter.insert(columns.bucket.clone(), Value::from(uri.as_str()));
        let mut patch = Row::new();
        patch.insert(columns.bytes.clone(), format_bytes(usage.bytes));
        patch.insert(columns.count.clone(), Value::from(usage.count));
        sheet.update_one(&filter, &patch, true)?;
        summary.updated += 1;
    }
    Ok(summary)
}
