//! Core of the ying operations toolkit: the progress logger and bucket-size
//! reporting.

mod ansi;
mod banner;
mod error;
mod plog;
mod relay;
mod report;
mod sheet;
pub mod storage;
mod throttle;

pub use ansi::strip_ansi_codes;
pub use banner::{format_host_banner, HostInfo};
pub use error::{RelayError, YingError};
pub use plog::{
    compose_message, run_command, OutputAccumulator, PlogOptions, StreamPipeline,
    MAX_MESSAGE_LEN, READ_CHUNK_SIZE,
};
pub use relay::{is_message_not_modified, ChatRelay, TelegramRelay, DEFAULT_API_BASE};
pub use report::{format_bytes, update_bucket_sizes, ReportColumns, ReportSummary};
pub use sheet::{JsonSheet, Row, Sheet};
pub use storage::{BucketUri, StorageSizer};
pub use throttle::{RateLimitedRelay, RelayState};

/// Result type for ying operations.
pub type Result<T> = std::result::Result<T, YingError>;
