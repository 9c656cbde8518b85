mod balances;
mod checkpoint;
mod error;
mod explorer;
mod scanner;

pub use balances::{BalanceRecord, BalanceResolver, BalanceStore};
pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, PgCheckpointStore};
pub use error::IngestError;
pub use explorer::{BlockExplorer, ExplorerConfig};
pub use scanner::{Scanner, ScannerConfig};
