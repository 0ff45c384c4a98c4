//! Turns raw RFC 5322 messages into [`ParsedReply`] values.

use chrono::{DateTime, Utc};
use log::debug;
use mail_parser::{Addr, HeaderValue, MessageParser, PartType};

use crate::model::ParsedReply;

use super::error::{EmailError, Result};

/// Parses one raw message. A missing `From` yields an empty sender, which
/// never correlates and so files the reply as an orphan. A missing `Date`
/// falls back to the current time.
pub fn parse_reply(raw: &[u8]) -> Result<ParsedReply> {
    parse_reply_at(raw, Utc::now())
}

/// Parses one raw message, using `now` when the `Date` header is missing.
pub fn parse_reply_at(raw: &[u8], now: DateTime<Utc>) -> Result<ParsedReply> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(EmailError::Parse("empty message".to_string()));
    }

    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| EmailError::Parse("Failed to parse email message".to_string()))?;

    let from = message
        .from()
        .and_then(|addr| addr.first())
        .map(format_address)
        .unwrap_or_default();

    let to = message
        .to()
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(|a| a.address())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let text = message
        .text_bodies()
        .find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    let html = message.html_bodies().find_map(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    });

    let date = message
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(now);

    let reply = ParsedReply {
        message_id: message.message_id().map(bracketed).unwrap_or_default(),
        from,
        to,
        subject: message.subject().unwrap_or_default().to_string(),
        text,
        html,
        date,
        in_reply_to: header_ids(message.in_reply_to()).into_iter().next(),
        references: header_ids(message.references()),
    };

    debug!(
        "Parsed message {} from {} subject={:?}",
        reply.message_id, reply.from, reply.subject
    );
    Ok(reply)
}

/// Formats an email address for display.
/// If the address has a display name, formats as "Name <email@example.com>".
/// Otherwise, returns just the email address.
fn format_address(addr: &Addr) -> String {
    let address = addr.address().unwrap_or_default();
    match addr.name() {
        Some(name) if !name.trim().is_empty() && !address.is_empty() => {
            format!("{} <{}>", name.trim(), address)
        }
        _ => address.to_string(),
    }
}

/// Wraps a message-id in angle brackets, the form outbound ids are stored in.
fn bracketed(id: &str) -> String {
    let bare = id.trim().trim_start_matches('<').trim_end_matches('>').trim();
    if bare.is_empty() {
        String::new()
    } else {
        format!("<{}>", bare)
    }
}

fn header_ids(value: &HeaderValue<'_>) -> Vec<String> {
    let ids: Vec<String> = match value {
        HeaderValue::Text(id) => vec![bracketed(id)],
        HeaderValue::TextList(ids) => ids.iter().map(|id| bracketed(id)).collect(),
        _ => Vec::new(),
    };
    ids.into_iter().filter(|id| !id.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PLAIN_REPLY: &str = "From: Ion Pop <ion@partner.ro>\r\n\
To: office@firma.ro, contabil@firma.ro\r\n\
Subject: RE: Cerere confirmare sold\r\n\
Message-ID: <reply-1@partner.ro>\r\n\
In-Reply-To: <msg-123@firma.ro>\r\n\
References: <root@firma.ro> <msg-123@firma.ro>\r\n\
Date: Mon, 12 Oct 2026 09:30:00 +0300\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Confirmăm soldul, este corect.\r\n";

    #[test]
    fn test_parse_plain_reply() {
        let reply = parse_reply(PLAIN_REPLY.as_bytes()).unwrap();
        assert_eq!(reply.message_id, "<reply-1@partner.ro>");
        assert_eq!(reply.from, "Ion Pop <ion@partner.ro>");
        assert_eq!(reply.to, vec!["office@firma.ro", "contabil@firma.ro"]);
        assert_eq!(reply.subject, "RE: Cerere confirmare sold");
        assert!(reply.text.starts_with("Confirmăm soldul"));
        assert!(reply.html.is_none());
        assert_eq!(reply.in_reply_to.as_deref(), Some("<msg-123@firma.ro>"));
        assert_eq!(
            reply.references,
            vec!["<root@firma.ro>", "<msg-123@firma.ro>"]
        );
        assert_eq!(
            reply.date,
            Utc.with_ymd_and_hms(2026, 10, 12, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_optional_headers() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let raw = "From: ion@partner.ro\r\n\r\nDa\r\n";
        let reply = parse_reply_at(raw.as_bytes(), now).unwrap();
        assert_eq!(reply.message_id, "");
        assert_eq!(reply.from, "ion@partner.ro");
        assert_eq!(reply.subject, "");
        assert!(reply.in_reply_to.is_none());
        assert!(reply.references.is_empty());
        assert_eq!(reply.date, now);
    }

    #[test]
    fn test_html_only_reply() {
        let raw = "From: ion@partner.ro\r\n\
Subject: Re: Sold\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Suntem de acord</p>\r\n";
        let reply = parse_reply(raw.as_bytes()).unwrap();
        assert_eq!(reply.text, "");
        assert!(reply.html.as_deref().unwrap().contains("<p>Suntem de acord</p>"));
        assert!(reply.content().contains("Suntem de acord"));
    }

    #[test]
    fn test_multipart_alternative() {
        let raw = "From: ion@partner.ro\r\n\
Subject: Re: Sold\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Soldul este gresit\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<b>Soldul este gresit</b>\r\n\
--b1--\r\n";
        let reply = parse_reply(raw.as_bytes()).unwrap();
        assert_eq!(reply.text.trim(), "Soldul este gresit");
        assert!(reply.html.unwrap().contains("<b>Soldul este gresit</b>"));
    }

    #[test]
    fn test_message_without_sender_keeps_empty_from() {
        let raw = "Subject: fara expeditor\r\nMessage-ID: <anon-1@x.ro>\r\n\r\ntext\r\n";
        let reply = parse_reply(raw.as_bytes()).unwrap();
        assert_eq!(reply.from, "");
        assert_eq!(reply.subject, "fara expeditor");
        assert_eq!(reply.message_id, "<anon-1@x.ro>");
    }

    #[test]
    fn test_rejects_empty_message() {
        assert!(matches!(parse_reply(b""), Err(EmailError::Parse(_))));
        assert!(matches!(parse_reply(b" \r\n\r\n"), Err(EmailError::Parse(_))));
    }

    #[test]
    fn test_bracketed() {
        assert_eq!(bracketed("abc@x"), "<abc@x>");
        assert_eq!(bracketed(" <abc@x> "), "<abc@x>");
        assert_eq!(bracketed(""), "");
    }
}
