//! Conversation thread resolution.
//!
//! Every stored message carries a thread identifier so replies group into
//! one conversation regardless of which provider delivered them.
//!
//! Resolution order:
//!
//! 1. A provider-native thread reference (Gmail's threadId) is used
//!    verbatim.
//! 2. Otherwise the thread key is the conversation root: the first entry
//!    of the References chain, then the In-Reply-To header, then the
//!    normalized subject. The key is hashed so subject-derived and
//!    header-derived identifiers share one uniform namespace.
//!
//! Hashing the root rather than chaining per-message means a reply that
//! arrives before its parent still lands in the same thread once the
//! parent shows up: both resolve through the same root identifier.

use ring::digest;

use crate::domain::{NormalizedMessage, ThreadId};

/// Strips reply/forward prefixes and normalizes a subject for threading.
///
/// Prefixes stack in the wild ("Re: Fwd: Re: Hello"), so stripping loops
/// until the subject stabilizes. The result is trimmed and lower-cased.
pub fn normalize_subject(subject: &str) -> String {
    let mut current = subject.trim();

    loop {
        // Prefix comparison stays on the original bytes; lower-casing the
        // whole subject first can change its UTF-8 length and misalign the
        // strip index.
        let stripped = ["re:", "fwd:", "fw:"].iter().find_map(|prefix| {
            current
                .get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &current[prefix.len()..])
        });

        match stripped {
            Some(rest) => current = rest.trim(),
            None => break,
        }
    }

    current.to_lowercase()
}

fn hash_key(key: &str) -> ThreadId {
    let digest = digest::digest(&digest::SHA256, key.as_bytes());
    let hex: String = digest.as_ref().iter().map(|b| format!("{:02x}", b)).collect();
    ThreadId::from(hex)
}

/// Resolves the thread identifier for a normalized message.
pub fn resolve(message: &NormalizedMessage) -> ThreadId {
    if let Some(native) = &message.provider_thread_id {
        return ThreadId::from(native.as_str());
    }

    let root = if let Some(first_ref) = message.references.first() {
        first_ref.0.clone()
    } else if let Some(in_reply_to) = &message.in_reply_to {
        in_reply_to.0.clone()
    } else {
        normalize_subject(message.subject.as_deref().unwrap_or(""))
    };

    hash_key(&root)
}
