//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use ying_core::storage::{CommandRunner, MetricSource, ObjectStore, S3Endpoint, TOTAL_BYTES_METRIC};
use ying_core::{ChatRelay, RelayError, Result, YingError};
use ying_types::{BucketUsage, MessageId};

/// A relay call as seen by [`FakeRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCall {
    Send(String),
    Edit(MessageId, String),
}

/// In-memory relay that records every call.
#[derive(Default)]
pub struct FakeRelay {
    pub calls: RefCell<Vec<RelayCall>>,
    /// Number of upcoming calls that fail with a transport error.
    pub failures: RefCell<usize>,
    next_id: RefCell<i64>,
}

impl FakeRelay {
    pub fn sends(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, RelayCall::Send(_)))
            .count()
    }

    pub fn last_text(&self) -> Option<String> {
        self.calls.borrow().last().map(|c| match c {
            RelayCall::Send(t) | RelayCall::Edit(_, t) => t.clone(),
        })
    }

    fn take_failure(&self) -> bool {
        let mut failures = self.failures.borrow_mut();
        if *failures > 0 {
            *failures -= 1;
            true
        } else {
            false
        }
    }
}

impl ChatRelay for FakeRelay {
    fn send_message(&self, _chat_id: &str, text: &str) -> std::result::Result<MessageId, RelayError> {
        self.calls.borrow_mut().push(RelayCall::Send(text.to_string()));
        if self.take_failure() {
            return Err(RelayError::Transport("connection refused".into()));
        }
        let mut id = self.next_id.borrow_mut();
        *id += 1;
        Ok(MessageId(*id))
    }

    fn edit_message(
        &self,
        _chat_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> std::result::Result<(), RelayError> {
        self.calls
            .borrow_mut()
            .push(RelayCall::Edit(message_id, text.to_string()));
        if self.take_failure() {
            return Err(RelayError::Api {
                status: 502,
                description: "Bad Gateway".into(),
            });
        }
        Ok(())
    }
}

/// Text between the opening and closing fences of a relayed message.
pub fn fenced_body(message: &str) -> &str {
    let start = message.find("```\n").expect("opening fence") + 4;
    let end = message.rfind("```").expect("closing fence");
    &message[start..end]
}

/// Command runner answering from a table keyed by program name.
#[derive(Default)]
pub struct ScriptedRunner {
    pub replies: HashMap<String, String>,
    pub calls: RefCell<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn with(mut self, program: &str, reply: &str) -> Self {
        self.replies.insert(program.to_string(), reply.to_string());
        self
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        self.calls
            .borrow_mut()
            .push((program.to_string(), args.to_vec()));
        self.replies
            .get(program)
            .cloned()
            .ok_or_else(|| YingError::CommandFailed {
                program: program.to_string(),
                message: "not scripted".into(),
            })
    }
}

/// Metric source with a fixed byte and count answer; `None` fails.
pub struct FixedMetrics {
    pub bytes: Option<i64>,
    pub count: Option<i64>,
}

impl MetricSource for FixedMetrics {
    fn latest(&self, _project_id: &str, metric_type: &str, _bucket: &str) -> Result<i64> {
        let value = if metric_type == TOTAL_BYTES_METRIC {
            self.bytes
        } else {
            self.count
        };
        value.ok_or_else(|| YingError::Http("503 Service Unavailable".into()))
    }
}

/// S3 object store with a fixed answer for every bucket; `None` fails.
#[derive(Default)]
pub struct FixedObjects {
    pub usage: Option<BucketUsage>,
    pub asked: RefCell<Vec<(S3Endpoint, String)>>,
}

impl FixedObjects {
    pub fn answering(bytes: i64, count: i64) -> Self {
        Self {
            usage: Some(BucketUsage::new(bytes, count)),
            ..Default::default()
        }
    }
}

impl ObjectStore for FixedObjects {
    fn usage(&self, endpoint: &S3Endpoint, bucket: &str) -> Result<BucketUsage> {
        self.asked
            .borrow_mut()
            .push((endpoint.clone(), bucket.to_string()));
        self.usage
            .ok_or_else(|| YingError::ObjectStore(format!("{bucket}: AccessDenied")))
    }
}
