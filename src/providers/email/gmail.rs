//! Gmail REST adapter.
//!
//! Implements [`MailProvider`] against the Gmail API v1:
//! - `users.messages.list` with a `q=after:` filter for windowed listing
//! - `users.messages.get` (format=full) for fetching and normalizing
//! - `users.messages.send` for outbound mail
//! - `users.getProfile` for connection checks
//!
//! # Token refresh
//!
//! Access tokens are short-lived. Before a run's first provider call, if
//! the stored token expires within a five-minute horizon the adapter
//! performs a refresh-token exchange and hands the replacement credential
//! set back to the worker, which persists it immediately. A refreshed
//! token must never be lost: the worker retries the persist rather than
//! discarding the new pair.

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{
    Credentials, GmailCredentials, MailProvider, MessageRef, MessageRefPage, OutgoingMessage,
    ProviderError, Result,
};
use crate::domain::{AccountId, AttachmentMeta, NormalizedMessage, ProviderType};
use crate::sync::normalize;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this horizon are refreshed before use.
const REFRESH_HORIZON_SECS: i64 = 300;

/// Skew subtracted from the provider's expires_in when caching a token.
const EXPIRY_SKEW_SECS: i64 = 30;

/// Page size for listing calls; the worker caps the total per run.
const PAGE_SIZE: u32 = 100;

/// Gmail message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageListEntry>>,
    next_page_token: Option<String>,
}

/// One entry of the message list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListEntry {
    id: String,
    thread_id: String,
}

/// Gmail API message (format=full).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: String,
    label_ids: Option<Vec<String>>,
    payload: Option<GmailMessagePayload>,
    internal_date: Option<String>,
}

/// Gmail message payload (headers and body parts).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessagePayload {
    headers: Option<Vec<GmailHeader>>,
    parts: Option<Vec<GmailPart>>,
    body: Option<GmailBody>,
    mime_type: Option<String>,
}

/// Gmail message header.
#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail message part (for multipart messages).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    filename: Option<String>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
}

/// Gmail message body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBody {
    data: Option<String>,
    size: Option<u64>,
    attachment_id: Option<String>,
}

/// OAuth token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Returns whether the stored access token needs a refresh before use.
///
/// Missing tokens always refresh; otherwise refresh when the expiry is
/// within [`REFRESH_HORIZON_SECS`] of `now`.
fn needs_refresh(credentials: &GmailCredentials, now: DateTime<Utc>) -> bool {
    match (&credentials.access_token, &credentials.expires_at) {
        (Some(_), Some(expires_at)) => {
            *expires_at <= now + Duration::seconds(REFRESH_HORIZON_SECS)
        }
        _ => true,
    }
}

/// Gmail API provider.
///
/// Implements [`MailProvider`] using the Gmail REST API with OAuth 2.0
/// authentication.
pub struct GmailProvider {
    /// Account this provider syncs.
    account_id: AccountId,
    /// Mailbox address, used as the From address when sending.
    account_email: String,
    /// HTTP client for API requests.
    client: reqwest::Client,
    /// OAuth credentials, updated in place on refresh.
    credentials: GmailCredentials,
}

impl GmailProvider {
    /// Creates a new Gmail provider for the specified account.
    pub fn new(
        account_id: AccountId,
        account_email: impl Into<String>,
        credentials: GmailCredentials,
    ) -> Self {
        Self {
            account_id,
            account_email: account_email.into(),
            client: reqwest::Client::new(),
            credentials,
        }
    }

    /// Returns the account ID for this provider.
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Exchanges the refresh token for a fresh access token.
    async fn refresh_access_token(&mut self) -> Result<()> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Authentication(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("parse token response: {}", e)))?;

        let lifetime = (token.expires_in as i64).saturating_sub(EXPIRY_SKEW_SECS);
        self.credentials.access_token = Some(token.access_token);
        self.credentials.expires_at = Some(Utc::now() + Duration::seconds(lifetime));

        tracing::debug!(account_id = %self.account_id, "Gmail access token refreshed");
        Ok(())
    }

    /// Builds authorization headers for API requests.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self
            .credentials
            .access_token
            .as_ref()
            .ok_or_else(|| ProviderError::Authentication("not authenticated".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request to the Gmail API.
    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let headers = self.auth_headers()?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Makes an authenticated POST request to the Gmail API.
    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Handles API responses, mapping error statuses.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("parse response: {}", e)))
    }

    /// Maps an API error response to a [`ProviderError`].
    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => ProviderError::Authentication(format!("unauthorized: {}", body)),
            404 => ProviderError::NotFound(body),
            _ => ProviderError::Protocol(format!("API error ({}): {}", status, body)),
        }
    }

    /// Decodes a base64url body data field to UTF-8 text.
    fn decode_body_data(data: &str) -> Option<String> {
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(data).ok()?;
        String::from_utf8(decoded).ok()
    }

    /// Extracts body text and attachments from a Gmail payload.
    ///
    /// Recursively descends multipart structures, keeping the first
    /// text/plain and first text/html parts. Parts with a filename and a
    /// body attachment reference are recorded as metadata only.
    fn extract_content(
        payload: &GmailMessagePayload,
    ) -> (Option<String>, Option<String>, Vec<AttachmentMeta>) {
        let mut text = None;
        let mut html = None;
        let mut attachments = Vec::new();

        // Single-part messages carry the body directly on the payload.
        if let Some(body) = &payload.body {
            if let Some(data) = &body.data {
                if let Some(decoded) = Self::decode_body_data(data) {
                    match payload.mime_type.as_deref() {
                        Some("text/html") => html = Some(decoded),
                        _ => text = Some(decoded),
                    }
                }
            }
        }

        if let Some(parts) = &payload.parts {
            Self::walk_parts(parts, &mut text, &mut html, &mut attachments);
        }

        (text, html, attachments)
    }

    /// Recursive multipart descent.
    fn walk_parts(
        parts: &[GmailPart],
        text: &mut Option<String>,
        html: &mut Option<String>,
        attachments: &mut Vec<AttachmentMeta>,
    ) {
        for part in parts {
            let mime = part.mime_type.as_deref().unwrap_or("");
            let filename = part.filename.as_deref().unwrap_or("");

            if !filename.is_empty() {
                let (size_bytes, provider_attachment_id) = match &part.body {
                    Some(body) => (body.size, body.attachment_id.clone()),
                    None => (None, None),
                };
                attachments.push(AttachmentMeta {
                    filename: filename.to_string(),
                    content_type: if mime.is_empty() {
                        "application/octet-stream".to_string()
                    } else {
                        mime.to_string()
                    },
                    size_bytes,
                    provider_attachment_id,
                });
            } else if mime == "text/plain" && text.is_none() {
                if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
                    *text = Self::decode_body_data(data);
                }
            } else if mime == "text/html" && html.is_none() {
                if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
                    *html = Self::decode_body_data(data);
                }
            }

            if let Some(nested) = &part.parts {
                Self::walk_parts(nested, text, html, attachments);
            }
        }
    }

    /// Converts a Gmail API message into the common normalized shape.
    fn to_normalized(&self, msg: &GmailMessage) -> NormalizedMessage {
        let payload = msg.payload.as_ref();
        let headers = payload.and_then(|p| p.headers.as_ref());

        let get_header = |name: &str| -> Option<String> {
            headers.and_then(|h| {
                h.iter()
                    .find(|hdr| hdr.name.eq_ignore_ascii_case(name))
                    .map(|hdr| hdr.value.clone())
            })
        };

        let received_at = msg
            .internal_date
            .as_ref()
            .and_then(|d| d.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let message_id = match get_header("Message-ID") {
            Some(value) => normalize::canonical_message_id(&value),
            None => normalize::synthetic_message_id(ProviderType::Gmail, &msg.id, received_at),
        };

        let from = get_header("From")
            .map(|v| normalize::parse_address(&v))
            .unwrap_or_else(|| crate::domain::Address::new("unknown@unknown.invalid"));
        let to = get_header("To")
            .map(|v| normalize::parse_address_list(&v))
            .unwrap_or_default();
        let cc = get_header("Cc")
            .map(|v| normalize::parse_address_list(&v))
            .unwrap_or_default();
        let bcc = get_header("Bcc")
            .map(|v| normalize::parse_address_list(&v))
            .unwrap_or_default();

        let in_reply_to = get_header("In-Reply-To").map(|v| normalize::canonical_message_id(&v));
        let references = get_header("References")
            .map(|v| normalize::split_references(&v))
            .unwrap_or_default();

        let labels = msg.label_ids.clone().unwrap_or_default();
        let is_sent = labels.iter().any(|l| l == "SENT");

        let (body_text, body_html, attachments) = payload
            .map(Self::extract_content)
            .unwrap_or((None, None, Vec::new()));

        NormalizedMessage {
            message_id,
            provider_ref: msg.id.clone(),
            provider_thread_id: Some(msg.thread_id.clone()),
            in_reply_to,
            references,
            from,
            to,
            cc,
            bcc,
            subject: get_header("Subject"),
            body_text,
            body_html,
            received_at,
            attachments,
            is_sent,
        }
    }

    /// Builds an RFC 5322 message for the send endpoint.
    fn build_raw_message(&self, draft: &OutgoingMessage) -> String {
        let mut message = String::new();

        message.push_str(&format!("From: {}\r\n", self.account_email));

        let to_addrs: Vec<String> = draft.to.iter().map(|a| a.display()).collect();
        message.push_str(&format!("To: {}\r\n", to_addrs.join(", ")));

        if !draft.cc.is_empty() {
            let cc_addrs: Vec<String> = draft.cc.iter().map(|a| a.display()).collect();
            message.push_str(&format!("Cc: {}\r\n", cc_addrs.join(", ")));
        }

        if !draft.bcc.is_empty() {
            let bcc_addrs: Vec<String> = draft.bcc.iter().map(|a| a.display()).collect();
            message.push_str(&format!("Bcc: {}\r\n", bcc_addrs.join(", ")));
        }

        message.push_str(&format!("Subject: {}\r\n", draft.subject));

        if let Some(in_reply_to) = &draft.in_reply_to {
            message.push_str(&format!("In-Reply-To: {}\r\n", in_reply_to.0));
        }

        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("\r\n");
        message.push_str(&draft.body_text);

        message
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Gmail
    }

    async fn ensure_authenticated(&mut self) -> Result<Option<Credentials>> {
        if !needs_refresh(&self.credentials, Utc::now()) {
            return Ok(None);
        }

        self.refresh_access_token().await?;
        Ok(Some(Credentials::Gmail(self.credentials.clone())))
    }

    async fn list_message_refs(
        &mut self,
        since: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<MessageRefPage> {
        let mut endpoint = format!(
            "/messages?maxResults={}&q=after:{}",
            PAGE_SIZE,
            since.timestamp()
        );
        if let Some(token) = page_token {
            endpoint.push_str(&format!("&pageToken={}", token));
        }

        let response: MessageListResponse = self.get(&endpoint).await?;

        let refs = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| MessageRef {
                provider_ref: m.id,
                thread_ref: Some(m.thread_id),
            })
            .collect();

        Ok(MessageRefPage {
            refs,
            next_page_token: response.next_page_token,
        })
    }

    async fn fetch_message(&mut self, msg_ref: &MessageRef) -> Result<NormalizedMessage> {
        let endpoint = format!("/messages/{}?format=full", msg_ref.provider_ref);
        let msg: GmailMessage = self.get(&endpoint).await?;
        Ok(self.to_normalized(&msg))
    }

    async fn send_message(&mut self, draft: &OutgoingMessage) -> Result<String> {
        let raw = self.build_raw_message(draft);
        let encoded = BASE64_URL_SAFE_NO_PAD.encode(raw.as_bytes());

        #[derive(Serialize)]
        struct SendRequest {
            raw: String,
        }

        #[derive(Deserialize)]
        struct SendResponse {
            id: String,
        }

        let response: SendResponse = self
            .post("/messages/send", &SendRequest { raw: encoded })
            .await?;

        tracing::info!(account_id = %self.account_id, provider_ref = %response.id, "message sent via Gmail API");
        Ok(response.id)
    }

    async fn test_connection(&mut self) -> Result<bool> {
        if let Err(e) = self.ensure_authenticated().await {
            tracing::debug!(account_id = %self.account_id, error = %e, "Gmail connection test failed");
            return Ok(false);
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Profile {
            #[allow(dead_code)]
            email_address: String,
        }

        match self.get::<Profile>("/profile").await {
            Ok(_) => Ok(true),
            Err(ProviderError::Authentication(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
