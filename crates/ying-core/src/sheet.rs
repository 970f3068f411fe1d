//! Row store used by the bucket report.

use crate::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A spreadsheet row: column name to cell value.
pub type Row = Map<String, Value>;

/// Minimal spreadsheet interface.
pub trait Sheet {
    /// Rows whose cells equal every entry of `filter`. An empty filter
    /// matches all rows.
    fn find(&self, filter: &Row) -> Result<Vec<Row>>;

    /// Merge `patch` into the first row matching `filter`. When nothing
    /// matches and `upsert` is set, append `filter` merged with `patch`.
    fn update_one(&mut self, filter: &Row, patch: &Row, upsert: bool) -> Result<()>;
}

fn matches(row: &Row, filter: &Row) -> bool {
    filter.iter().all(|(k, v)| row.get(k) == Some(v))
}

/// Sheet persisted as a JSON array of row objects.
#[derive(Debug)]
pub struct JsonSheet {
    path: PathBuf,
    rows: Vec<Row>,
}

impl JsonSheet {
    /// Open the sheet at `path`; a missing file is an empty sheet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };
        debug!(target: "ying::report", "Opened sheet {:?} with {} rows", path, rows.len());
        Ok(Self { path, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.rows)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Sheet for JsonSheet {
    fn find(&self, filter: &Row) -> Result<Vec<Row>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| matches(row, filter))
            .cloned()
            .collect())
    }

    fn update_one(&mut self, filter: &Row, patch: &Row, upsert: bool) -> Result<()> {
        if let Some(row) = self.rows.iter_mut().find(|row| matches(row, filter)) {
            for (k, v) in patch {
                row.insert(k.clone(), v.clone());
            }
        } else if upsert {
            let mut row = filter.clone();
            for (k, v) in patch {
                row.insert(k.clone(), v.clone());
            }
            self.rows.push(row);
        } else {
            return Ok(());
        }
        self.save()
    }
}
