//! Progress-logger types: display mode, pipeline state and relay identifiers.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How successive output chunks are combined into the relayed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Chunks are concatenated; the message grows over the invocation.
    #[default]
    #[value(name = "a", alias = "append")]
    Append,
    /// Each chunk overwrites the previous one.
    #[value(name = "r", alias = "replace")]
    Replace,
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Append => write!(f, "append"),
            DisplayMode::Replace => write!(f, "replace"),
        }
    }
}

/// Lifecycle of a wrapped command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Process alive, output being read.
    Running,
    /// Output channel closed, exit not yet observed.
    Draining,
    /// Process has been waited on.
    Terminated,
}

/// Identifier of a message created through the chat relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
