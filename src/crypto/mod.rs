//! Credential encryption.
//!
//! Provider credentials are encrypted at rest with an authenticated
//! cipher; see [`CredentialVault`].

mod vault;

pub use vault::{CredentialVault, CryptoError, Result, VAULT_KEY_ENV};
