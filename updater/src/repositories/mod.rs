pub mod position_repository;
pub mod snapshot_repository;

pub use position_repository::{PositionRepository, SupabasePositionRepository};
pub use snapshot_repository::{SnapshotRepository, SupabaseSnapshotRepository};
