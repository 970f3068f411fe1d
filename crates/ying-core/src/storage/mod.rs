//! Bucket size and object count across storage providers.
//!
//! [`StorageSizer::bucket_usage`] picks a backend by [`Engine`]:
//! - `metrics`: Cloud Monitoring time series (`gs` only)
//! - `rclone`: `rclone size` on a remote named after the scheme
//! - `sdk`: provider listing, through the S3 API for `s3`/`minio` and the
//!   vendor CLI elsewhere
//! - `auto`: metrics for `gs`, then rclone, then provider listing

mod listing;
mod metrics;
mod rclone;
mod runner;
mod s3;

pub use listing::{
    listing_usage, parse_az_lengths, parse_gcloud_total, parse_ossutil_du, AZURE_ACCOUNT_ENV,
};
pub use metrics::{
    latest_time_series_value, query_bucket_metrics, CloudMonitoring, MetricSource,
    OBJECT_COUNT_METRIC, TOTAL_BYTES_METRIC,
};
pub use rclone::{parse_rclone_size, rclone_usage, remote_env_key};
pub use runner::{CommandRunner, SystemRunner};
pub use s3::{
    sum_pages, ObjectPage, ObjectStore, RusotoStore, S3Endpoint, MINIO_ACCESS_KEY_ENV,
    MINIO_ENDPOINT_ENV, MINIO_SECRET_KEY_ENV,
};

use crate::{Result, YingError};
use tracing::{debug, info, warn};
use url::Url;
use ying_types::{BucketUsage, Engine, Scheme};

/// A parsed `<scheme>://<bucket>[/path]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketUri {
    pub raw: String,
    pub scheme: Scheme,
    pub bucket: String,
}

impl BucketUri {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| YingError::InvalidBucketUri(format!("{}: {}", raw, e)))?;
        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| YingError::InvalidBucketUri(format!("{}: missing bucket name", raw)))?;
        Ok(Self {
            raw: raw.trim().to_string(),
            scheme: Scheme::parse(url.scheme()),
            bucket: bucket.to_string(),
        })
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Dispatches bucket-size queries to the configured backends.
pub struct StorageSizer {
    metrics: Box<dyn MetricSource>,
    runner: Box<dyn CommandRunner>,
    objects: Box<dyn ObjectStore>,
    env: EnvLookup,
}

impl StorageSizer {
    pub fn new(
        metrics: Box<dyn MetricSource>,
        runner: Box<dyn CommandRunner>,
        objects: Box<dyn ObjectStore>,
        env: impl Fn(&str) -> Option<String> + 'static,
    ) -> Self {
        Self {
            metrics,
            runner,
            objects,
            env: Box::new(env),
        }
    }

    /// Real backends: Cloud Monitoring, the S3 API, local CLIs and the
    /// process environment.
    pub fn system() -> Self {
        Self::new(
            Box::new(CloudMonitoring::new(SystemRunner)),
            Box::new(SystemRunner),
            Box::new(RusotoStore),
            |key| std::env::var(key).ok(),
        )
    }

    pub fn bucket_usage(
        &self,
        uri: &str,
        engine: Engine,
        project_id: Option<&str>,
    ) -> Result<BucketUsage> {
        let uri = BucketUri::parse(uri)?;
        debug!(target: "ying::storage", "Querying {} with engine {}", uri.raw, engine);
        let usage = match engine {
            Engine::Auto => self.by_auto(&uri, project_id)?,
            Engine::Metrics => self.by_metrics(&uri, project_id)?,
            Engine::Rclone => self
                .by_rclone(&uri)?
                .ok_or_else(|| YingError::NoResult {
                    engine: engine.to_string(),
                    bucket: uri.raw.clone(),
                })?,
            Engine::Sdk => self.by_listing(&uri)?,
        };
        info!(
            target: "ying::storage",
            "{}: {} bytes, {} objects",
            uri.raw, usage.bytes, usage.count
        );
        Ok(usage)
    }

    fn by_auto(&self, uri: &BucketUri, project_id: Option<&str>) -> Result<BucketUsage> {
        if uri.scheme == Scheme::Gs {
            match project_id {
                Some(_) => {
                    let usage = self.by_metrics(uri, project_id)?;
                    if !usage.is_unknown() {
                        return Ok(usage);
                    }
                    debug!(target: "ying::storage", "No metrics for {}, falling back", uri.raw);
                }
                None => {
                    debug!(target: "ying::storage", "No project id, skipping metrics for {}", uri.raw)
                }
            }
        }
        match self.by_rclone(uri) {
            Ok(Some(usage)) => return Ok(usage),
            Ok(None) => {}
            Err(e) => warn!(target: "ying::storage", "rclone failed for {}: {}", uri.raw, e),
        }
        self.by_listing(uri)
    }

    fn by_metrics(&self, uri: &BucketUri, project_id: Option<&str>) -> Result<BucketUsage> {
        if uri.scheme != Scheme::Gs {
            return Err(YingError::UnsupportedScheme(format!(
                "{} (metrics only support google cloud storage)",
                uri.scheme
            )));
        }
        let project_id = project_id
            .filter(|p| !p.is_empty())
            .ok_or_else(|| YingError::Config("project_id is required for metrics".into()))?;
        Ok(query_bucket_metrics(self.metrics.as_ref(), project_id, &uri.bucket))
    }

    fn by_rclone(&self, uri: &BucketUri) -> Result<Option<BucketUsage>> {
        rclone_usage(self.runner.as_ref(), self.env.as_ref(), uri)
    }

    fn by_listing(&self, uri: &BucketUri) -> Result<BucketUsage> {
        listing_usage(self.runner.as_ref(), self.objects.as_ref(), self.env.as_ref(), uri)
    }
}
