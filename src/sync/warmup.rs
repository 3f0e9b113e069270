//! Warmup message classification.
//!
//! Deliverability warmup tools exchange automated mail that should not
//! surface in the shared inbox. Each inbox carries a keyword list; a
//! synced message matching any keyword is stored with the filtered flag
//! set rather than dropped, so classification mistakes are recoverable.

use crate::domain::NormalizedMessage;

/// Returns whether a message matches any of the inbox's warmup keywords.
///
/// Matching is a case-insensitive substring check over the subject and
/// plain-text body. Keywords are expected pre-lowercased (the inbox
/// normalizes them on write); empty keyword lists match nothing.
pub fn is_warmup(message: &NormalizedMessage, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }

    let haystack = format!(
        "{} {}",
        message.subject.as_deref().unwrap_or(""),
        message.body_text.as_deref().unwrap_or("")
    )
    .to_lowercase();

    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| haystack.contains(k.as_str()))
}
