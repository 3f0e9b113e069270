//! SQL schema definitions as const strings.
//!
//! The messages table carries both deduplication tiers as declarative
//! constraints: a global UNIQUE on message_id and a per-account UNIQUE on
//! (account_id, provider_ref). Application-level pre-checks are an
//! optimization; these constraints are the authority, including under
//! concurrent writers.

/// SQL to create the accounts table.
pub const CREATE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    provider_type TEXT NOT NULL,
    provider_config TEXT NOT NULL,
    credentials BLOB NOT NULL,
    status TEXT NOT NULL,
    last_error TEXT,
    last_synced_at TEXT,
    inbox_id TEXT REFERENCES inboxes(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create account indexes.
pub const CREATE_ACCOUNT_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts(owner_id);
CREATE INDEX IF NOT EXISTS idx_accounts_status ON accounts(status)
"#;

/// SQL to create the inboxes table.
pub const CREATE_INBOXES: &str = r#"
CREATE TABLE IF NOT EXISTS inboxes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    warmup_keywords TEXT NOT NULL,
    default_stage TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the messages table.
pub const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    inbox_id TEXT REFERENCES inboxes(id),
    thread_id TEXT NOT NULL,
    message_id TEXT NOT NULL UNIQUE,
    provider_ref TEXT NOT NULL,
    provider_thread_id TEXT,
    in_reply_to TEXT,
    references_json TEXT NOT NULL,
    from_address TEXT NOT NULL,
    from_name TEXT,
    to_addresses TEXT NOT NULL,
    cc_addresses TEXT NOT NULL,
    bcc_addresses TEXT NOT NULL,
    subject TEXT,
    body_text TEXT,
    body_html TEXT,
    received_at TEXT NOT NULL,
    attachments_json TEXT NOT NULL,
    is_sent INTEGER NOT NULL DEFAULT 0,
    is_read INTEGER NOT NULL DEFAULT 0,
    is_archived INTEGER NOT NULL DEFAULT 0,
    is_filtered INTEGER NOT NULL DEFAULT 0,
    stage TEXT,
    tags_json TEXT NOT NULL,
    assignee TEXT,
    notes_json TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// SQL to create message indexes and the per-account dedup constraint.
pub const CREATE_MESSAGE_INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_account_ref ON messages(account_id, provider_ref);
CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
CREATE INDEX IF NOT EXISTS idx_messages_inbox ON messages(inbox_id);
CREATE INDEX IF NOT EXISTS idx_messages_received ON messages(received_at DESC)
"#;

/// Returns all schema creation statements in order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![
        CREATE_INBOXES,
        CREATE_ACCOUNTS,
        CREATE_ACCOUNT_INDEXES,
        CREATE_MESSAGES,
        CREATE_MESSAGE_INDEXES,
    ]
}
