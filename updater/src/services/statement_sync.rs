use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use domain::{PortfolioSnapshot, SyncSummary};
use flex_client::StatementSource;
use statement::{apply_weights, extract_positions, ExtractedStatement, StatementError};
use tracing::{info, warn};

use crate::repositories::{PositionRepository, SnapshotRepository};

/// Fetch, extract, weight and persist one statement. Every step runs to completion before the
/// next starts and any failure ends the run.
#[derive(Clone)]
pub struct StatementSync {
    source: Arc<dyn StatementSource>,
    positions: Arc<dyn PositionRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
}

impl StatementSync {
    pub fn new(
        source: Arc<dyn StatementSource>,
        positions: Arc<dyn PositionRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
    ) -> Self {
        Self {
            source,
            positions,
            snapshots,
        }
    }

    pub async fn run(&self, snapshot_date: NaiveDate) -> Result<SyncSummary> {
        let xml = self.source.fetch_statement().await?;
        let extracted = build_positions(&xml, snapshot_date)?;
        if extracted.skipped > 0 {
            warn!(
                skipped = extracted.skipped,
                "open positions without a market value were left out"
            );
        }

        if !extracted.positions.is_empty() {
            self.positions.upsert_positions(&extracted.positions).await?;
            info!(rows = extracted.positions.len(), "positions upserted");
        }

        let snapshot = PortfolioSnapshot::new(snapshot_date, extracted.nav_eur);
        self.snapshots
            .upsert_snapshots(std::slice::from_ref(&snapshot))
            .await?;
        info!(nav_eur = snapshot.nav_eur, "portfolio snapshot upserted");

        Ok(SyncSummary {
            snapshot_date,
            nav_eur: extracted.nav_eur,
            positions: extracted.positions.len(),
            skipped: extracted.skipped,
        })
    }
}

/// Extracts positions and back-fills their weights.
pub fn build_positions(
    xml: &str,
    snapshot_date: NaiveDate,
) -> Result<ExtractedStatement, StatementError> {
    let mut extracted = extract_positions(xml, snapshot_date)?;
    apply_weights(&mut extracted.positions, extracted.nav_eur);
    Ok(extracted)
}
