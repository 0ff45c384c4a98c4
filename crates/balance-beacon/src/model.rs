//! Journal records and reply types shared by the pipeline and the database.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mail_parser::decoders::html::html_to_text;
use serde::{Deserialize, Serialize};

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the value stored in the database.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Delivery state of an outbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Pending,
    Success,
    Failed,
    Responded,
}

string_enum!(SendStatus, "send status", {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
    Responded => "responded",
});

/// Kind of transactional email recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmailCategory {
    /// Balance-confirmation request ("CONFIRMARE").
    Confirmare,
    Reminder,
    Test,
    General,
}

string_enum!(EmailCategory, "email category", {
    Confirmare => "CONFIRMARE",
    Reminder => "REMINDER",
    Test => "TEST",
    General => "GENERAL",
});

/// Intent of a partner reply, as decided by the keyword classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyClassification {
    Confirmed,
    Disputed,
    Corrections,
    GeneralResponse,
}

string_enum!(ReplyClassification, "reply classification", {
    Confirmed => "CONFIRMED",
    Disputed => "DISPUTED",
    Corrections => "CORRECTIONS",
    GeneralResponse => "GENERAL_RESPONSE",
});

impl ReplyClassification {
    /// Response type recorded on a linked confirmation request.
    ///
    /// A general response carries no verdict and leaves the stored type alone.
    pub fn response_type(&self) -> Option<ResponseType> {
        match self {
            Self::Confirmed => Some(ResponseType::Confirmed),
            Self::Disputed => Some(ResponseType::Disputed),
            Self::Corrections => Some(ResponseType::Corrections),
            Self::GeneralResponse => None,
        }
    }

    /// Request status that follows from this classification.
    pub fn request_status(&self) -> RequestStatus {
        match self {
            Self::Confirmed => RequestStatus::Confirmed,
            Self::Disputed => RequestStatus::Refused,
            Self::Corrections | Self::GeneralResponse => RequestStatus::Sent,
        }
    }
}

/// Processing state of the reply attached to an outbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Pending,
    Received,
    Processed,
}

string_enum!(ReplyStatus, "reply status", {
    Pending => "pending",
    Received => "received",
    Processed => "processed",
});

/// Partner verdict stored on a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Confirmed,
    Disputed,
    Corrections,
}

string_enum!(ResponseType, "response type", {
    Confirmed => "confirmed",
    Disputed => "disputed",
    Corrections => "corrections",
});

/// Workflow state of a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Sent,
    Confirmed,
    Refused,
}

string_enum!(RequestStatus, "request status", {
    Sent => "sent",
    Confirmed => "confirmed",
    Refused => "refused",
});

/// One sent email in the journal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmailRecord {
    pub id: String,
    pub recipient_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub category: EmailCategory,
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replied_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_classification: Option<ReplyClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_status: Option<ReplyStatus>,
}

/// Fields needed to journal a freshly sent email.
#[derive(Debug, Clone)]
pub struct NewOutboundEmail {
    pub recipient_address: String,
    pub recipient_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub category: EmailCategory,
    pub status: SendStatus,
    pub provider_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub confirmation_request_id: Option<String>,
}

/// Reply fields written onto an outbound record by the ledger updater.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyUpdate {
    pub replied_at: DateTime<Utc>,
    pub body: String,
    pub classification: ReplyClassification,
    pub status: ReplyStatus,
}

/// A balance-confirmation workflow item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_notes: Option<String>,
    pub status: RequestStatus,
}

/// Response fields written onto a confirmation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResponse {
    pub response_date: DateTime<Utc>,
    /// `None` keeps whatever type is already stored.
    pub response_type: Option<ResponseType>,
    pub notes: Option<String>,
    pub status: RequestStatus,
}

/// A reply that matched no outbound email, kept for manual triage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReply {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub from_address: String,
    pub subject: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_to_email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_notes: Option<String>,
}

/// Fields captured verbatim when filing an orphan.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrphanReply {
    pub message_id: Option<String>,
    pub from_address: String,
    pub subject: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    pub in_reply_to: Option<String>,
}

/// Operator decision closing an orphan.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanResolution {
    pub linked_to_email_id: Option<String>,
    pub processing_notes: Option<String>,
}

/// Normalized form of one fetched mailbox message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Message-ID in `<id>` form, empty when the header is missing.
    pub message_id: String,
    /// `Name <addr>` or a bare address.
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub date: DateTime<Utc>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

impl ParsedReply {
    /// Body stored for the reply: plain text, else HTML.
    pub fn content(&self) -> &str {
        if self.text.is_empty() {
            self.html.as_deref().unwrap_or_default()
        } else {
            &self.text
        }
    }

    /// Body as readable text: plain text, else the HTML rendered without markup.
    pub fn readable_text(&self) -> Cow<'_, str> {
        match &self.html {
            Some(html) if self.text.is_empty() => Cow::Owned(html_to_text(html)),
            _ => Cow::Borrowed(&self.text),
        }
    }
}
