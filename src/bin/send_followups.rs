//! Runs one follow-up pass without going through HTTP, for system cron.

use chrono::Utc;
use std::sync::Arc;

use atlas_intake_api::config::Config;
use atlas_intake_api::db::Database;
use atlas_intake_api::handlers::AppState;
use atlas_intake_api::notifier::ResendClient;
use atlas_intake_api::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url, false).await?;
    let notifier = ResendClient::new(
        &config.resend_base_url,
        config.resend_api_key.clone(),
        config.resend_from_email.clone(),
    )?;

    let state = AppState::new(
        config,
        Arc::new(PgStore::new(db.pool.clone())),
        Arc::new(notifier),
        None,
    )?;

    tracing::info!("Connected to database. Starting follow-up run...");
    let run = state.followups.run(Utc::now()).await?;

    tracing::info!(
        "Follow-up run complete: followup1={} followup2={} failed={} agreements_retried={}",
        run.followup1_sent,
        run.followup2_sent,
        run.failed,
        run.agreements_retried
    );

    if run.failed > 0 {
        anyhow::bail!("{} follow-up email(s) failed; they will be retried next run", run.failed);
    }

    Ok(())
}
