//! S3-compatible object listing (AWS S3 and MinIO).

use crate::{Result, YingError};
use rusoto_core::credential::{ChainProvider, StaticProvider};
use rusoto_core::{HttpClient, Region};
use rusoto_s3::{ListObjectsV2Request, S3Client, S3};
use std::time::Duration;
use tracing::debug;
use ying_types::BucketUsage;

pub const MINIO_ENDPOINT_ENV: &str = "MINIO_ENDPOINT";
pub const MINIO_ACCESS_KEY_ENV: &str = "MINIO_ACCESS_KEY";
pub const MINIO_SECRET_KEY_ENV: &str = "MINIO_SECRET_KEY";

/// Where an S3-compatible bucket lives and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S3Endpoint {
    /// AWS, with region and credentials from the standard provider chain.
    Aws,
    /// A MinIO server with static keys.
    Minio {
        endpoint: String,
        access_key: String,
        secret_key: String,
    },
}

impl S3Endpoint {
    /// MinIO settings from `MINIO_ENDPOINT`, `MINIO_ACCESS_KEY` and
    /// `MINIO_SECRET_KEY`. An endpoint without a scheme is plain http.
    pub fn minio_from_env(env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            env(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| YingError::Config(format!("{key} is required for minio buckets")))
        };
        let endpoint = require(MINIO_ENDPOINT_ENV)?;
        let endpoint = if endpoint.contains("://") {
            endpoint
        } else {
            format!("http://{endpoint}")
        };
        Ok(Self::Minio {
            endpoint,
            access_key: require(MINIO_ACCESS_KEY_ENV)?,
            secret_key: require(MINIO_SECRET_KEY_ENV)?,
        })
    }
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub sizes: Vec<i64>,
    pub next: Option<String>,
}

/// Sum sizes and counts over every page, following continuation tokens.
pub fn sum_pages(mut fetch: impl FnMut(Option<String>) -> Result<ObjectPage>) -> Result<BucketUsage> {
    let mut usage = BucketUsage::new(0, 0);
    let mut token = None;
    loop {
        let page = fetch(token)?;
        usage.bytes += page.sizes.iter().sum::<i64>();
        usage.count += page.sizes.len() as i64;
        match page.next {
            Some(next) => token = Some(next),
            None => return Ok(usage),
        }
    }
}

/// Lists S3-compatible buckets.
pub trait ObjectStore {
    fn usage(&self, endpoint: &S3Endpoint, bucket: &str) -> Result<BucketUsage>;
}

/// [`ObjectStore`] backed by rusoto, driven on a current-thread runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusotoStore;

impl RusotoStore {
    fn client(endpoint: &S3Endpoint) -> Result<S3Client> {
        let http = HttpClient::new().map_err(|e| YingError::ObjectStore(e.to_string()))?;
        let client = match endpoint {
            S3Endpoint::Aws => {
                let mut chain = ChainProvider::new();
                chain.set_timeout(Duration::from_millis(500));
                S3Client::new_with(http, chain, Region::default())
            }
            S3Endpoint::Minio {
                endpoint,
                access_key,
                secret_key,
            } => {
                let creds = StaticProvider::new_minimal(access_key.clone(), secret_key.clone());
                let region = Region::Custom {
                    name: "us-east-1".into(),
                    endpoint: endpoint.clone(),
                };
                S3Client::new_with(http, creds, region)
            }
        };
        Ok(client)
    }
}

impl ObjectStore for RusotoStore {
    fn usage(&self, endpoint: &S3Endpoint, bucket: &str) -> Result<BucketUsage> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = Self::client(endpoint)?;

        sum_pages(|continuation_token| {
            let request = ListObjectsV2Request {
                bucket: bucket.to_string(),
                continuation_token,
                ..Default::default()
            };
            let output = runtime
                .block_on(client.list_objects_v2(request))
                .map_err(|e| YingError::ObjectStore(format!("{bucket}: {e}")))?;
            let sizes: Vec<i64> = output
                .contents
                .unwrap_or_default()
                .iter()
                .map(|object| object.size.unwrap_or(0))
                .collect();
            debug!(target: "ying::storage", "Listed {} objects in {}", sizes.len(), bucket);
            let next = if output.is_truncated.unwrap_or(false) {
                output.next_continuation_token
            } else {
                None
            };
            Ok(ObjectPage { sizes, next })
        })
    }
}
