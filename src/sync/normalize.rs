//! Message normalization.
//!
//! Header-level parsing shared by both adapters (address lists, reference
//! chains, Message-ID canonicalization) plus full RFC 5322 parsing for the
//! IMAP path, where the provider hands us raw message bytes instead of a
//! structured payload.

use chrono::{DateTime, Utc};
use mail_parser::{Addr, MessageParser, MimeHeaders};
use thiserror::Error;

use crate::domain::{Address, AttachmentMeta, MessageId, NormalizedMessage, ProviderType};

/// Errors from message normalization.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Canonicalizes a Message-ID header value.
///
/// Trims whitespace and ensures the angle-bracket form, so the same
/// logical identifier compares equal whether it came from a Gmail header
/// or a parsed RFC 5322 message.
pub fn canonical_message_id(raw: &str) -> MessageId {
    let trimmed = raw.trim();
    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        MessageId::from(trimmed)
    } else {
        MessageId::from(format!("<{}>", trimmed))
    }
}

/// Builds a deterministic Message-ID for messages that lack one.
///
/// Some providers deliver messages without a Message-ID header. The
/// synthetic identifier is derived from stable inputs so re-fetching the
/// same message produces the same identifier and the dedup gate still
/// recognizes it.
pub fn synthetic_message_id(
    provider_type: ProviderType,
    provider_ref: &str,
    received_at: DateTime<Utc>,
) -> MessageId {
    MessageId::from(format!(
        "<{}-{}-{}@outpost.sync>",
        provider_type,
        provider_ref,
        received_at.timestamp()
    ))
}

/// Parses one address from its header form.
///
/// Accepts `Display Name <user@host>` or a bare `user@host`. The mailbox
/// part is lower-cased; a missing or empty display name yields `None`.
pub fn parse_address(raw: &str) -> Address {
    let raw = raw.trim();

    if let Some(open) = raw.find('<') {
        if let Some(close) = raw.rfind('>') {
            if close > open {
                let email = raw[open + 1..close].trim().to_lowercase();
                let name = raw[..open].trim().trim_matches('"').trim();
                return if name.is_empty() {
                    Address::new(email)
                } else {
                    Address::with_name(email, name)
                };
            }
        }
    }

    Address::new(raw.to_lowercase())
}

/// Parses a comma-separated address list header.
///
/// Commas inside quoted display names do not split.
pub fn parse_address_list(raw: &str) -> Vec<Address> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                if !current.trim().is_empty() {
                    out.push(parse_address(&current));
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        out.push(parse_address(&current));
    }

    out
}

/// Splits a References header into its ordered identifier chain.
pub fn split_references(raw: &str) -> Vec<MessageId> {
    raw.split_whitespace()
        .filter(|s| !s.is_empty())
        .map(canonical_message_id)
        .collect()
}

fn addr_to_address(addr: &Addr) -> Address {
    Address {
        email: addr.address().unwrap_or("").to_lowercase(),
        name: addr
            .name()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

fn extract_addresses(header: Option<&mail_parser::Address>) -> Vec<Address> {
    header
        .and_then(|addr| addr.as_list())
        .map(|list| list.iter().map(addr_to_address).collect())
        .unwrap_or_default()
}

/// Parses raw RFC 5322 message bytes into the normalized shape.
///
/// Used by the IMAP adapter. The result carries no provider-native thread
/// reference and `is_sent` defaults to false; the adapter sets it from the
/// sender address afterwards.
pub fn from_rfc822(raw: &[u8], provider_ref: &str) -> Result<NormalizedMessage, ParseError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ParseError::Malformed(format!("unparseable message: {}", provider_ref)))?;

    let received_at = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let message_id = match message.message_id() {
        Some(id) => canonical_message_id(id),
        None => synthetic_message_id(ProviderType::Imap, provider_ref, received_at),
    };

    let from = extract_addresses(message.from())
        .into_iter()
        .next()
        .unwrap_or_else(|| Address::new("unknown@unknown.invalid"));

    let in_reply_to = message.in_reply_to().as_text().map(canonical_message_id);

    let references = message
        .references()
        .as_text_list()
        .map(|refs| refs.iter().map(|s| canonical_message_id(s)).collect())
        .unwrap_or_default();

    let attachments = message
        .attachments()
        .map(|part| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            AttachmentMeta {
                filename: part.attachment_name().unwrap_or("attachment").to_string(),
                content_type,
                size_bytes: Some(part.contents().len() as u64),
                provider_attachment_id: None,
            }
        })
        .collect();

    Ok(NormalizedMessage {
        message_id,
        provider_ref: provider_ref.to_string(),
        provider_thread_id: None,
        in_reply_to,
        references,
        from,
        to: extract_addresses(message.to()),
        cc: extract_addresses(message.cc()),
        bcc: extract_addresses(message.bcc()),
        subject: message.subject().map(|s| s.to_string()),
        body_text: message.body_text(0).map(|s| s.to_string()),
        body_html: message.body_html(0).map(|s| s.to_string()),
        received_at,
        attachments,
        is_sent: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_address_is_lowercased_with_no_name() {
        let addr = parse_address("Alice@Example.COM");
        assert_eq!(addr.email, "alice@example.com");
        assert_eq!(addr.name, None);
    }

    #[test]
    fn named_address_keeps_display_name() {
        let addr = parse_address("\"John Doe\" <John@Example.com>");
        assert_eq!(addr.email, "john@example.com");
        assert_eq!(addr.name.as_deref(), Some("John Doe"));
    }

    #[test]
    fn unquoted_display_name_is_kept() {
        let addr = parse_address("John Doe <john@example.com>");
        assert_eq!(addr.name.as_deref(), Some("John Doe"));
    }

    #[test]
    fn empty_display_name_becomes_none() {
        let addr = parse_address("<john@example.com>");
        assert_eq!(addr.email, "john@example.com");
        assert_eq!(addr.name, None);
    }

    #[test]
    fn address_list_splits_on_commas() {
        let list = parse_address_list("a@example.com, B <b@example.com>");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].email, "a@example.com");
        assert_eq!(list[1].email, "b@example.com");
        assert_eq!(list[1].name.as_deref(), Some("B"));
    }

    #[test]
    fn quoted_comma_does_not_split_list() {
        let list = parse_address_list("\"Doe, John\" <john@example.com>, b@example.com");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].email, "john@example.com");
        assert_eq!(list[0].name.as_deref(), Some("Doe, John"));
    }

    #[test]
    fn canonical_id_adds_missing_brackets() {
        assert_eq!(canonical_message_id("m1@example.com").0, "<m1@example.com>");
        assert_eq!(
            canonical_message_id(" <m1@example.com> ").0,
            "<m1@example.com>"
        );
    }

    #[test]
    fn references_split_in_order() {
        let refs = split_references("<a@x>  <b@x>\t<c@x>");
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].0, "<a@x>");
        assert_eq!(refs[2].0, "<c@x>");
    }

    #[test]
    fn synthetic_id_is_deterministic() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let a = synthetic_message_id(ProviderType::Imap, "INBOX:7", at);
        let b = synthetic_message_id(ProviderType::Imap, "INBOX:7", at);
        assert_eq!(a, b);
        assert!(a.0.contains("INBOX:7"));
    }

    #[test]
    fn rfc822_parsing_extracts_headers_and_body() {
        let raw = b"Message-ID: <m1@example.com>\r\n\
            From: \"Alice\" <Alice@Example.com>\r\n\
            To: sales@example.com\r\n\
            Subject: Re: Pricing\r\n\
            Date: Tue, 14 Nov 2023 12:00:00 +0000\r\n\
            In-Reply-To: <m0@example.com>\r\n\
            References: <m0@example.com>\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            Happy to discuss.\r\n";

        let message = from_rfc822(raw, "INBOX:42").unwrap();

        assert_eq!(message.message_id.0, "<m1@example.com>");
        assert_eq!(message.provider_ref, "INBOX:42");
        assert_eq!(message.provider_thread_id, None);
        assert_eq!(message.from.email, "alice@example.com");
        assert_eq!(message.from.name.as_deref(), Some("Alice"));
        assert_eq!(message.to.len(), 1);
        assert_eq!(message.subject.as_deref(), Some("Re: Pricing"));
        assert_eq!(message.in_reply_to.as_ref().unwrap().0, "<m0@example.com>");
        assert_eq!(message.references.len(), 1);
        assert!(message
            .body_text
            .as_deref()
            .unwrap()
            .contains("Happy to discuss"));
        assert!(!message.is_sent);
    }

    #[test]
    fn rfc822_without_message_id_gets_synthetic_one() {
        let raw = b"From: a@example.com\r\n\
            Subject: no id\r\n\
            Date: Tue, 14 Nov 2023 12:00:00 +0000\r\n\
            \r\n\
            body\r\n";

        let message = from_rfc822(raw, "INBOX:7").unwrap();
        assert!(message.message_id.0.contains("INBOX:7"));
        assert!(message.message_id.0.starts_with('<'));
    }

    #[test]
    fn rfc822_attachment_metadata_is_extracted() {
        let raw = b"Message-ID: <att@example.com>\r\n\
            From: alice@example.com\r\n\
            To: sales@example.com\r\n\
            Subject: Report attached\r\n\
            Date: Tue, 14 Nov 2023 12:00:00 +0000\r\n\
            MIME-Version: 1.0\r\n\
            Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
            \r\n\
            --b1\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            See attached.\r\n\
            --b1\r\n\
            Content-Type: application/pdf; name=\"report.pdf\"\r\n\
            Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
            Content-Transfer-Encoding: base64\r\n\
            \r\n\
            JVBERi0xLjQ=\r\n\
            --b1--\r\n";

        let message = from_rfc822(raw, "INBOX:9").unwrap();

        assert!(message.body_text.as_deref().unwrap().contains("See attached"));
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].filename, "report.pdf");
        assert_eq!(message.attachments[0].content_type, "application/pdf");
        assert_eq!(message.attachments[0].size_bytes, Some(8));
    }
}
