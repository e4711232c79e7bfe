use chrono::Local;
use tracing::Instrument;
use updater::{bootstrap::build_sync, config::AppConfig, telemetry};
use uuid::Uuid;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;

    let config = AppConfig::from_env()?;
    let sync = build_sync(&config)?;

    // 每次執行一個 run_id，方便在日誌中串起同一批請求
    let run_id = Uuid::new_v4();
    let snapshot_date = Local::now().date_naive();
    let summary = sync
        .run(snapshot_date)
        .instrument(tracing::info_span!("sync_run", %run_id, %snapshot_date))
        .await?;

    tracing::info!(
        nav_eur = summary.nav_eur,
        positions = summary.positions,
        skipped = summary.skipped,
        "portfolio update finished"
    );
    println!("{summary}");
    Ok(())
}
