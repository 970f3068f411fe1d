//! Provider-specific object listing.
//!
//! S3 and MinIO are listed through the S3 API; the other providers through
//! their vendor CLIs.

use super::runner::CommandRunner;
use super::s3::{ObjectStore, S3Endpoint};
use super::BucketUri;
use crate::{Result, YingError};
use once_cell::sync::Lazy;
use regex::Regex;
use ying_types::{BucketUsage, Scheme};

static GCS_TOTAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TOTAL:\s*(\d+)\s+objects?,\s*(\d+)\s+bytes").unwrap());

static OSS_COUNT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)total object count:\s*(\d+)").unwrap());

static OSS_SIZE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)total object sum size:\s*(\d+)").unwrap());

pub const AZURE_ACCOUNT_ENV: &str = "AZURE_STORAGE_ACCOUNT";

/// List every object in the bucket and total it up.
pub fn listing_usage(
    runner: &dyn CommandRunner,
    objects: &dyn ObjectStore,
    env: &dyn Fn(&str) -> Option<String>,
    uri: &BucketUri,
) -> Result<BucketUsage> {
    let bucket = &uri.bucket;
    match &uri.scheme {
        Scheme::Gs => {
            let out = runner.run(
                "gcloud",
                &args(&["storage", "ls", "--long", "--recursive", &format!("gs://{bucket}/**")]),
            )?;
            parse_gcloud_total(&out)
        }
        Scheme::S3 => objects.usage(&S3Endpoint::Aws, bucket),
        Scheme::Minio => objects.usage(&S3Endpoint::minio_from_env(env)?, bucket),
        Scheme::Oss => {
            let out = runner.run("ossutil", &args(&["du", &format!("oss://{bucket}")]))?;
            parse_ossutil_du(&out)
        }
        Scheme::Az => {
            let mut a = args(&[
                "storage",
                "blob",
                "list",
                "--container-name",
                bucket.as_str(),
                "--num-results",
                "*",
                "--query",
                "[].properties.contentLength",
                "--output",
                "json",
            ]);
            if let Some(account) = env(AZURE_ACCOUNT_ENV) {
                a.push("--account-name".into());
                a.push(account);
            }
            let out = runner.run("az", &a)?;
            parse_az_lengths(&out)
        }
        Scheme::Other(s) => Err(YingError::UnsupportedScheme(s.clone())),
    }
}

fn args(a: &[&str]) -> Vec<String> {
    a.iter().map(|s| s.to_string()).collect()
}

fn capture_i64(re: &Regex, text: &str, what: &str) -> Result<i64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| YingError::ParseError(format!("missing {} in listing output", what)))
}

pub fn parse_gcloud_total(out: &str) -> Result<BucketUsage> {
    let caps = GCS_TOTAL_REGEX
        .captures(out)
        .ok_or_else(|| YingError::ParseError("missing TOTAL line in gcloud output".into()))?;
    let count = caps[1].parse().map_err(|_| YingError::ParseError("bad object count".into()))?;
    let bytes = caps[2].parse().map_err(|_| YingError::ParseError("bad byte count".into()))?;
    Ok(BucketUsage::new(bytes, count))
}

pub fn parse_ossutil_du(out: &str) -> Result<BucketUsage> {
    Ok(BucketUsage::new(
        capture_i64(&OSS_SIZE_REGEX, out, "total object sum size")?,
        capture_i64(&OSS_COUNT_REGEX, out, "total object count")?,
    ))
}

pub fn parse_az_lengths(out: &str) -> Result<BucketUsage> {
    let lengths: Vec<Option<i64>> = serde_json::from_str(out.trim())?;
    let bytes = lengths.iter().flatten().sum();
    Ok(BucketUsage::new(bytes, lengths.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::s3::{MINIO_ACCESS_KEY_ENV, MINIO_ENDPOINT_ENV, MINIO_SECRET_KEY_ENV};
    use std::cell::RefCell;

    struct Canned {
        program: RefCell<Option<(String, Vec<String>)>>,
        reply: &'static str,
    }

    impl Canned {
        fn new(reply: &'static str) -> Self {
            Self { program: RefCell::new(None), reply }
        }
    }

    impl CommandRunner for Canned {
        fn run(&self, program: &str, args: &[String]) -> Result<String> {
            *self.program.borrow_mut() = Some((program.to_string(), args.to_vec()));
            Ok(self.reply.to_string())
        }
    }

    /// Records the endpoint it was asked for and answers with a fixed usage.
    #[derive(Default)]
    struct Recorded {
        asked: RefCell<Option<(S3Endpoint, String)>>,
    }

    impl ObjectStore for Recorded {
        fn usage(&self, endpoint: &S3Endpoint, bucket: &str) -> Result<BucketUsage> {
            *self.asked.borrow_mut() = Some((endpoint.clone(), bucket.to_string()));
            Ok(BucketUsage::new(40, 4))
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_gcloud_total() {
        let out = "      1024  2024-01-01T00:00:00Z  gs://b/a.txt\n\
                   TOTAL: 2 objects, 3072 bytes (3KiB)\n";
        assert_eq!(parse_gcloud_total(out).unwrap(), BucketUsage::new(3072, 2));
    }

    #[test]
    fn test_parse_ossutil_du() {
        let out = "storage class   object count            sum size(byte)\n\
                   ----------------------------------------------------------\n\
                   Standard        3                       300\n\
                   ----------------------------------------------------------\n\
                   total object count: 3                       total object sum size: 300\n";
        assert_eq!(parse_ossutil_du(out).unwrap(), BucketUsage::new(300, 3));
    }

    #[test]
    fn test_parse_az_lengths() {
        assert_eq!(parse_az_lengths("[10, 20, null]").unwrap(), BucketUsage::new(30, 3));
        assert_eq!(parse_az_lengths("[]").unwrap(), BucketUsage::new(0, 0));
    }

    #[test]
    fn test_unsupported_scheme() {
        let runner = Canned::new("");
        let uri = BucketUri::parse("ftp://files").unwrap();
        let err = listing_usage(&runner, &Recorded::default(), &no_env, &uri).unwrap_err();
        assert!(matches!(err, YingError::UnsupportedScheme(s) if s == "ftp"));
        assert!(runner.program.borrow().is_none());
    }

    #[test]
    fn test_az_passes_account() {
        let runner = Canned::new("[1]");
        let uri = BucketUri::parse("az://backups").unwrap();
        let env = |k: &str| (k == AZURE_ACCOUNT_ENV).then(|| "acct".to_string());
        listing_usage(&runner, &Recorded::default(), &env, &uri).unwrap();
        let (_, args) = runner.program.borrow().clone().unwrap();
        assert!(args.contains(&"backups".to_string()));
        assert!(args.ends_with(&["--account-name".to_string(), "acct".to_string()]));
    }

    #[test]
    fn test_s3_lists_through_api() {
        let runner = Canned::new("");
        let store = Recorded::default();
        let uri = BucketUri::parse("s3://archive/2024").unwrap();
        let usage = listing_usage(&runner, &store, &no_env, &uri).unwrap();

        assert_eq!(usage, BucketUsage::new(40, 4));
        assert_eq!(*store.asked.borrow(), Some((S3Endpoint::Aws, "archive".to_string())));
        assert!(runner.program.borrow().is_none());
    }

    #[test]
    fn test_minio_requires_endpoint() {
        let store = Recorded::default();
        let uri = BucketUri::parse("minio://media").unwrap();
        let err = listing_usage(&Canned::new(""), &store, &no_env, &uri).unwrap_err();
        assert!(matches!(err, YingError::Config(_)));
        assert!(store.asked.borrow().is_none());
    }

    #[test]
    fn test_minio_uses_endpoint() {
        let store = Recorded::default();
        let uri = BucketUri::parse("minio://media").unwrap();
        let env = |k: &str| match k {
            MINIO_ENDPOINT_ENV => Some("minio:9000".to_string()),
            MINIO_ACCESS_KEY_ENV => Some("key".to_string()),
            MINIO_SECRET_KEY_ENV => Some("secret".to_string()),
            _ => None,
        };
        listing_usage(&Canned::new(""), &store, &env, &uri).unwrap();

        let (endpoint, bucket) = store.asked.borrow().clone().unwrap();
        assert_eq!(bucket, "media");
        assert!(matches!(endpoint, S3Endpoint::Minio { endpoint, .. } if endpoint == "http://minio:9000"));
    }
}
