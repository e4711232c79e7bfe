use std::env;

use anyhow::Context;
use chrono::Local;
use flex_client::{FlexClient, StatementSource};
use updater::{config::FlexConfig, services::build_positions, telemetry};

/// Prints what a run would write, without touching the store.
///
/// Usage: `cargo run -p updater --bin preview_statement -- [statement.xml]`
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;

    // 有給檔案路徑就讀本地 XML，否則向 Flex 即時抓取
    let xml = match env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read statement file {path}"))?,
        None => {
            let config = FlexConfig::from_env()?;
            let client = FlexClient::new(config.token, config.query_id, config.settings)?;
            client.fetch_statement().await?
        }
    };

    let snapshot_date = Local::now().date_naive();
    let extracted = build_positions(&xml, snapshot_date)?;

    for position in &extracted.positions {
        let weight = position
            .weight
            .map(|w| format!("{:.2}%", w * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<4} {:>16.2} {:>8}",
            position.label(),
            position.currency.as_deref().unwrap_or(""),
            position.market_value_eur,
            weight
        );
    }
    println!(
        "date={} nav_eur={:.2} positions={} skipped={}",
        snapshot_date,
        extracted.nav_eur,
        extracted.positions.len(),
        extracted.skipped
    );

    Ok(())
}
