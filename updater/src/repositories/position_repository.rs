use anyhow::Result;
use async_trait::async_trait;
use domain::PositionRecord;

use crate::supabase::SupabaseClient;

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn upsert_positions(&self, positions: &[PositionRecord]) -> Result<()>;
}

#[derive(Clone)]
pub struct SupabasePositionRepository {
    client: SupabaseClient,
    table: String,
}

impl SupabasePositionRepository {
    pub fn new(client: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl PositionRepository for SupabasePositionRepository {
    async fn upsert_positions(&self, positions: &[PositionRecord]) -> Result<()> {
        self.client
            .table(&self.table)
            .upsert(positions)?
            .execute()
            .await
    }
}
