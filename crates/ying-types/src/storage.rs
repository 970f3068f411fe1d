//! Bucket-size types shared by the aggregator and the report job.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage provider named by a bucket URI scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Google Cloud Storage (`gs://`).
    Gs,
    /// Amazon S3 (`s3://`).
    S3,
    /// Alibaba Cloud OSS (`oss://`).
    Oss,
    /// Self-hosted MinIO (`minio://`).
    Minio,
    /// Azure Blob Storage (`az://`).
    Az,
    /// Anything else; kept verbatim for error messages.
    Other(String),
}

impl Scheme {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "gs" => Scheme::Gs,
            "s3" => Scheme::S3,
            "oss" => Scheme::Oss,
            "minio" => Scheme::Minio,
            "az" => Scheme::Az,
            other => Scheme::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Gs => "gs",
            Scheme::S3 => "s3",
            Scheme::Oss => "oss",
            Scheme::Minio => "minio",
            Scheme::Az => "az",
            Scheme::Other(s) => s,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend selection policy for a bucket-size query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum Engine {
    /// Metrics for `gs`, then rclone, then provider listing.
    #[default]
    Auto,
    /// Cloud Monitoring time series (Google Cloud Storage only).
    Metrics,
    /// `rclone size` against a remote configured through the environment.
    #[value(alias = "generic-tool")]
    Rclone,
    /// Provider-specific listing.
    Sdk,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Auto => "auto",
            Engine::Metrics => "metrics",
            Engine::Rclone => "rclone",
            Engine::Sdk => "sdk",
        };
        f.write_str(name)
    }
}

/// Total size and object count of a bucket.
///
/// A field holds [`BucketUsage::UNKNOWN`] when the backend could not
/// retrieve that particular figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketUsage {
    pub bytes: i64,
    pub count: i64,
}

impl BucketUsage {
    pub const UNKNOWN: i64 = -1;

    pub fn new(bytes: i64, count: i64) -> Self {
        Self { bytes, count }
    }

    /// Neither figure could be retrieved.
    pub fn is_unknown(&self) -> bool {
        self.bytes == Self::UNKNOWN && self.count == Self::UNKNOWN
    }
}
