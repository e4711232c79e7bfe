use std::sync::Arc;

use anyhow::Result;
use flex_client::FlexClient;

use crate::{
    config::AppConfig,
    repositories::{SupabasePositionRepository, SupabaseSnapshotRepository},
    services::StatementSync,
    supabase::SupabaseClient,
};

pub fn build_sync(config: &AppConfig) -> Result<StatementSync> {
    let flex = FlexClient::new(
        config.flex.token.clone(),
        config.flex.query_id.clone(),
        config.flex.settings.clone(),
    )?;
    let supabase = SupabaseClient::new(&config.supabase)?;

    let position_repo = Arc::new(SupabasePositionRepository::new(
        supabase.clone(),
        config.supabase.positions_table.clone(),
    ));
    let snapshot_repo = Arc::new(SupabaseSnapshotRepository::new(
        supabase,
        config.supabase.snapshots_table.clone(),
    ));

    Ok(StatementSync::new(
        Arc::new(flex),
        position_repo,
        snapshot_repo,
    ))
}
