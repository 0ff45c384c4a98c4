//! Builders for raw replies and journal entries.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};

use balance_beacon::model::{EmailCategory, NewOutboundEmail, SendStatus};

/// Builder for RFC 5322 partner replies.
pub struct ReplyBuilder {
    from: String,
    to: String,
    subject: String,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    date: DateTime<Utc>,
    body: String,
}

impl ReplyBuilder {
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
            to: "office@firma.ro".to_string(),
            subject: String::new(),
            message_id: Some(format!("<{}@partner.test>", uuid::Uuid::new_v4())),
            in_reply_to: None,
            date: Utc::now(),
            body: String::new(),
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn message_id(mut self, id: &str) -> Self {
        self.message_id = Some(id.to_string());
        self
    }

    pub fn without_message_id(mut self) -> Self {
        self.message_id = None;
        self
    }

    pub fn in_reply_to(mut self, id: &str) -> Self {
        self.in_reply_to = Some(id.to_string());
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut raw = format!("From: {}\r\nTo: {}\r\n", self.from, self.to);
        raw.push_str(&format!("Subject: {}\r\n", self.subject));
        if let Some(id) = &self.message_id {
            raw.push_str(&format!("Message-ID: {}\r\n", id));
        }
        if let Some(id) = &self.in_reply_to {
            raw.push_str(&format!("In-Reply-To: {}\r\nReferences: {}\r\n", id, id));
        }
        raw.push_str(&format!("Date: {}\r\n", self.date.to_rfc2822()));
        raw.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
        raw.push_str(&self.body);
        raw.push_str("\r\n");
        raw.into_bytes()
    }
}

/// Builder for journaled outbound emails, successfully sent by default.
pub struct OutboundBuilder {
    email: NewOutboundEmail,
}

impl OutboundBuilder {
    pub fn new(to: &str, subject: &str) -> Self {
        Self {
            email: NewOutboundEmail {
                recipient_address: to.to_string(),
                recipient_name: None,
                subject: subject.to_string(),
                body: "Vă rugăm să confirmați soldul.".to_string(),
                category: EmailCategory::Confirmare,
                status: SendStatus::Success,
                provider_message_id: None,
                sent_at: Utc::now(),
                confirmation_request_id: None,
            },
        }
    }

    pub fn provider_message_id(mut self, id: &str) -> Self {
        self.email.provider_message_id = Some(id.to_string());
        self
    }

    pub fn sent_days_ago(mut self, days: i64) -> Self {
        self.email.sent_at = Utc::now() - Duration::days(days);
        self
    }

    pub fn confirmation_request(mut self, id: &str) -> Self {
        self.email.confirmation_request_id = Some(id.to_string());
        self
    }

    pub fn build(self) -> NewOutboundEmail {
        self.email
    }
}
