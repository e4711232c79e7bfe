pub mod statement_sync;

pub use statement_sync::{build_positions, StatementSync};
