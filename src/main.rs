//! outpost - Entry point for the sync service

use std::sync::Arc;

use outpost::{CredentialVault, Database, Settings, SyncOrchestrator};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting outpost");

    if let Err(e) = run().await {
        tracing::error!("Service error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::load_or_default()?;

    // Credentials cannot be decrypted without the vault key; refuse to
    // start rather than limp along with unusable accounts.
    let vault = Arc::new(CredentialVault::from_env()?);

    let database_path = settings.database_path()?;
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&database_path).await?;
    tracing::info!(path = %database_path.display(), "database ready");

    let orchestrator = SyncOrchestrator::new(db, vault, settings.sync.clone());

    // One-shot pass when invoked with `sync-once`, otherwise the
    // scheduled loop.
    let one_shot = std::env::args().nth(1).as_deref() == Some("sync-once");
    if one_shot {
        let summary = orchestrator.sync_all_eligible().await?;
        tracing::info!(
            accounts = summary.outcomes.len(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            new_messages = summary.new_messages(),
            "sync pass complete"
        );
        return Ok(());
    }

    orchestrator.run_scheduled().await;
    Ok(())
}
