//! Bucket usage from Google Cloud Monitoring.

use super::runner::CommandRunner;
use crate::{Result, YingError};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::Value;
use tracing::warn;
use ying_types::BucketUsage;

pub const TOTAL_BYTES_METRIC: &str = "storage.googleapis.com/storage/total_bytes";
pub const OBJECT_COUNT_METRIC: &str = "storage.googleapis.com/storage/object_count";

const DEFAULT_MONITORING_BASE: &str = "https://monitoring.googleapis.com";
const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Source of the latest value of a bucket metric.
pub trait MetricSource {
    fn latest(&self, project_id: &str, metric_type: &str, bucket: &str) -> Result<i64>;
}

/// Query both usage metrics. A failed metric is reported as
/// [`BucketUsage::UNKNOWN`] instead of failing the whole query.
pub fn query_bucket_metrics(
    source: &dyn MetricSource,
    project_id: &str,
    bucket: &str,
) -> BucketUsage {
    let fetch = |metric: &str| match source.latest(project_id, metric, bucket) {
        Ok(value) => value,
        Err(e) => {
            warn!(target: "ying::storage", "Metric {} for {} unavailable: {}", metric, bucket, e);
            BucketUsage::UNKNOWN
        }
    };
    BucketUsage::new(fetch(TOTAL_BYTES_METRIC), fetch(OBJECT_COUNT_METRIC))
}

/// Cloud Monitoring v3 `timeSeries.list` client.
pub struct CloudMonitoring<C> {
    agent: ureq::Agent,
    api_base: String,
    runner: C,
}

impl<C: CommandRunner> CloudMonitoring<C> {
    pub fn new(runner: C) -> Self {
        Self::with_base(DEFAULT_MONITORING_BASE, runner)
    }

    pub fn with_base(api_base: impl Into<String>, runner: C) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            api_base: api_base.into(),
            runner,
        }
    }

    /// Token from the environment, else from the gcloud CLI.
    fn access_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }
        let out = self.runner.run(
            "gcloud",
            &["auth".into(), "print-access-token".into()],
        )?;
        Ok(out.trim().to_string())
    }
}

impl<C: CommandRunner> MetricSource for CloudMonitoring<C> {
    fn latest(&self, project_id: &str, metric_type: &str, bucket: &str) -> Result<i64> {
        let token = self.access_token()?;
        let end = Utc::now();
        // Storage metrics are sampled once a day.
        let start = end - ChronoDuration::days(2);
        let url = format!("{}/v3/projects/{}/timeSeries", self.api_base, project_id);

        let resp = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", token))
            .query("filter", &time_series_filter(metric_type, bucket))
            .query("interval.startTime", &start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .query("interval.endTime", &end.to_rfc3339_opts(SecondsFormat::Secs, true))
            .call()
            .map_err(|e| YingError::Http(e.to_string()))?;
        let body: Value = serde_json::from_str(
            &resp.into_string().map_err(|e| YingError::Http(e.to_string()))?,
        )?;
        latest_time_series_value(&body)
    }
}

pub fn time_series_filter(metric_type: &str, bucket: &str) -> String {
    format!(
        "metric.type=\"{}\" AND resource.labels.bucket_name=\"{}\"",
        metric_type, bucket
    )
}

/// Sum the newest point of every series (one series per storage class).
pub fn latest_time_series_value(body: &Value) -> Result<i64> {
    let series = body
        .get("timeSeries")
        .and_then(Value::as_array)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| YingError::ParseError("no time series returned".into()))?;

    let mut total = 0i64;
    for s in series {
        let value = s
            .pointer("/points/0/value")
            .ok_or_else(|| YingError::ParseError("time series has no points".into()))?;
        total += point_value(value)?;
    }
    Ok(total)
}

fn point_value(value: &Value) -> Result<i64> {
    if let Some(v) = value.get("int64Value") {
        // int64 values are encoded as JSON strings
        return match v {
            Value::String(s) => s
                .parse()
                .map_err(|_| YingError::ParseError(format!("bad int64Value: {}", s))),
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| YingError::ParseError(format!("bad int64Value: {}", n))),
            other => Err(YingError::ParseError(format!("bad int64Value: {}", other))),
        };
    }
    if let Some(v) = value.get("doubleValue").and_then(Value::as_f64) {
        return Ok(v.round() as i64);
    }
    Err(YingError::ParseError(format!("unsupported point value: {}", value)))
}
