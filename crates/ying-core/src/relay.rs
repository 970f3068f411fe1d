//! Chat relay: create and edit messages through a Telegram-style bot API.

use crate::error::RelayError;
use serde::Deserialize;
use tracing::debug;
use ying_types::MessageId;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// A chat service that can post a message and later replace its text.
pub trait ChatRelay {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<MessageId, RelayError>;

    fn edit_message(
        &self,
        chat_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), RelayError>;
}

impl<R: ChatRelay + ?Sized> ChatRelay for &R {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<MessageId, RelayError> {
        (**self).send_message(chat_id, text)
    }

    fn edit_message(
        &self,
        chat_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), RelayError> {
        (**self).edit_message(chat_id, message_id, text)
    }
}

impl<R: ChatRelay + ?Sized> ChatRelay for Box<R> {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<MessageId, RelayError> {
        (**self).send_message(chat_id, text)
    }

    fn edit_message(
        &self,
        chat_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), RelayError> {
        (**self).edit_message(chat_id, message_id, text)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Bot API client. Requests are form-encoded POSTs with Markdown parse mode.
pub struct TelegramRelay {
    agent: ureq::Agent,
    api_base: String,
    bot_token: Option<String>,
}

impl TelegramRelay {
    pub fn new(api_base: impl Into<String>, bot_token: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.filter(|t| !t.is_empty()),
        }
    }

    fn method_url(&self, method: &str) -> Result<String, RelayError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or(RelayError::NotConfigured("tg_bot_token"))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    fn post<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        form: &[(&str, &str)],
    ) -> Result<Option<T>, RelayError> {
        let url = self.method_url(method)?;
        let resp = match self.agent.post(&url).send_form(form) {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(RelayError::Api {
                    status,
                    description: describe_failure(&body),
                });
            }
            Err(e) => return Err(RelayError::Transport(e.to_string())),
        };

        let status = resp.status();
        let body = resp
            .into_string()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| RelayError::Transport(format!("invalid response body: {e}")))?;
        if !parsed.ok {
            return Err(RelayError::Api {
                status,
                description: parsed.description.unwrap_or_default(),
            });
        }
        Ok(parsed.result)
    }
}

impl ChatRelay for TelegramRelay {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<MessageId, RelayError> {
        let sent: Option<SentMessage> = self.post(
            "sendMessage",
            &[("chat_id", chat_id), ("text", text), ("parse_mode", "Markdown")],
        )?;
        let sent = sent.ok_or_else(|| RelayError::Transport("response has no result".into()))?;
        debug!(target: "ying::relay", "Created message {}", sent.message_id);
        Ok(MessageId(sent.message_id))
    }

    fn edit_message(
        &self,
        chat_id: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), RelayError> {
        let id = message_id.to_string();
        let result: Result<Option<serde_json::Value>, _> = self.post(
            "editMessageText",
            &[
                ("chat_id", chat_id),
                ("message_id", &id),
                ("text", text),
                ("parse_mode", "Markdown"),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified(&e) => {
                debug!(target: "ying::relay", "Message {} unchanged", message_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Editing with identical text is rejected by the API; the message already
/// shows what we wanted.
pub fn is_message_not_modified(err: &RelayError) -> bool {
    matches!(err, RelayError::Api { description, .. } if description.contains("message is not modified"))
}

fn describe_failure(body: &str) -> String {
    serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|r| r.description)
        .unwrap_or_else(|| body.trim().to_string())
}
