//! Rate-limited relay adapter.
//!
//! Wraps a [`ChatRelay`] so that updates for one invocation are sent at most
//! once per cadence. The first accepted update creates a message; later ones
//! edit it in place.

use crate::error::RelayError;
use crate::relay::ChatRelay;
use crate::Result;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use ying_types::MessageId;

/// Relay bookkeeping owned by a single invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayState {
    /// Message being edited; `None` until a send succeeds.
    pub message_id: Option<MessageId>,
    /// When the last send was attempted.
    pub last_sent: Option<Instant>,
}

pub struct RateLimitedRelay<R> {
    relay: R,
    chat_id: Option<String>,
    cadence: Duration,
    state: RelayState,
}

impl<R: ChatRelay> RateLimitedRelay<R> {
    pub fn new(relay: R, chat_id: Option<String>, cadence: Duration) -> Self {
        Self {
            relay,
            chat_id: chat_id.filter(|c| !c.is_empty()),
            cadence,
            state: RelayState::default(),
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.state.message_id
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Whether a submission at `now` would reach the relay.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.state.last_sent {
            Some(last) => now.saturating_duration_since(last) >= self.cadence,
            None => true,
        }
    }

    /// Submit `text`, subject to the cadence.
    pub fn submit(&mut self, text: &str) -> Result<Option<MessageId>> {
        self.submit_at(text, Instant::now())
    }

    /// Submit `text` as of `now`.
    ///
    /// Within the cadence of the previous send this is a no-op that returns
    /// the current message id. Missing relay configuration is an error;
    /// any other relay failure is logged and clears the message id.
    pub fn submit_at(&mut self, text: &str, now: Instant) -> Result<Option<MessageId>> {
        let chat_id = self.require_chat_id()?;
        if !self.is_due(now) {
            return Ok(self.state.message_id);
        }
        self.deliver(&chat_id, text, now)
    }

    /// Send `text` regardless of the cadence.
    pub fn force(&mut self, text: &str) -> Result<Option<MessageId>> {
        let chat_id = self.require_chat_id()?;
        self.deliver(&chat_id, text, Instant::now())
    }

    fn require_chat_id(&self) -> Result<String> {
        self.chat_id
            .clone()
            .ok_or_else(|| RelayError::NotConfigured("tg_chat_id").into())
    }

    fn deliver(&mut self, chat_id: &str, text: &str, now: Instant) -> Result<Option<MessageId>> {
        self.state.last_sent = Some(now);
        let outcome = match self.state.message_id {
            None => self.relay.send_message(chat_id, text).map(Some),
            Some(id) => self.relay.edit_message(chat_id, id, text).map(|()| Some(id)),
        };
        match outcome {
            Ok(id) => {
                debug!(target: "ying::relay", "Relayed {} chars to message {:?}", text.chars().count(), id);
                self.state.message_id = id;
            }
            Err(RelayError::NotConfigured(what)) => {
                return Err(RelayError::NotConfigured(what).into());
            }
            Err(e) => {
                warn!(target: "ying::relay", "Relay update failed: {}", e);
                self.state.message_id = None;
            }
        }
        Ok(self.state.message_id)
    }
}
