use anyhow::Result;
use async_trait::async_trait;
use domain::PortfolioSnapshot;

use crate::supabase::SupabaseClient;

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn upsert_snapshots(&self, snapshots: &[PortfolioSnapshot]) -> Result<()>;
}

#[derive(Clone)]
pub struct SupabaseSnapshotRepository {
    client: SupabaseClient,
    table: String,
}

impl SupabaseSnapshotRepository {
    pub fn new(client: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl SnapshotRepository for SupabaseSnapshotRepository {
    async fn upsert_snapshots(&self, snapshots: &[PortfolioSnapshot]) -> Result<()> {
        self.client
            .table(&self.table)
            .upsert(snapshots)?
            .execute()
            .await
    }
}
