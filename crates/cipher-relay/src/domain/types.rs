//! Wire and record types shared by the relay core and the HTTP layer.

use crate::domain::ids::PendingId;
use serde::{Deserialize, Serialize};

/// Default value of the operator-controlled response option.
pub const DEFAULT_RESPONSE_OPTION: &str =
    "Default response: Your message has been successfully processed.";

/// Timestamp layout used for log records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry in the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub encrypted_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decrypted_text: Option<String>,
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

impl MessageRecord {
    /// Build a record stamped with the current local time.
    pub fn now(encrypted_text: impl Into<String>, decrypted_text: Option<String>) -> Self {
        Self {
            encrypted_text: encrypted_text.into(),
            decrypted_text,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Body of `POST /send_data`.
///
/// Unknown fields are ignored; a non-string `encrypted_message` is a
/// malformed payload rather than a missing one.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub encrypted_message: Option<String>,
}

/// Successful answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub status: String,
    pub message: String,
    pub decrypted_text: String,
    pub response_option: String,
}

impl SubmissionReceipt {
    pub fn success(decrypted_text: impl Into<String>, response_option: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: "Data received".to_string(),
            decrypted_text: decrypted_text.into(),
            response_option: response_option.into(),
        }
    }
}

/// Redirect instruction returned when a submission is deferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectNotice {
    pub status: String,
    pub message: String,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<PendingId>,
}

impl RedirectNotice {
    pub fn new(
        message: impl Into<String>,
        redirect_url: impl Into<String>,
        pending_id: Option<PendingId>,
    ) -> Self {
        Self {
            status: "redirect".to_string(),
            message: message.into(),
            redirect_url: redirect_url.into(),
            pending_id,
        }
    }
}

/// Error payload; carries the current response option like every other reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_option: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, response_option: Option<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            response_option,
        }
    }
}

/// How a submission is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePolicy {
    /// Decode, log, and answer in the same request.
    #[default]
    Immediate,
    /// Park the submission and send the client to the operator form.
    Redirect,
    /// Stash the submission in the client's session until the option is set.
    Session,
}

impl std::str::FromStr for ResponsePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "redirect" => Ok(Self::Redirect),
            "session" => Ok(Self::Session),
            other => Err(format!("unknown response policy: {}", other)),
        }
    }
}
