//! Scan checkpoint persistence: the next block to process for the tracked contract.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::db::{DbError, DbOperation, DbPool, DbValue};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `None` when nothing was ever saved.
    async fn load(&self) -> Result<Option<u64>, DbError>;

    async fn save(&self, next_block: u64) -> Result<(), DbError>;
}

/// Lives for the duration of the process only.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    next_block: Mutex<Option<u64>>,
}

impl MemoryCheckpointStore {
    #[cfg(test)]
    pub fn starting_at(next_block: u64) -> Self {
        Self {
            next_block: Mutex::new(Some(next_block)),
        }
    }

    fn current(&self) -> Option<u64> {
        self.next_block.lock().ok().and_then(|guard| *guard)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<u64>, DbError> {
        Ok(self.current())
    }

    async fn save(&self, next_block: u64) -> Result<(), DbError> {
        if let Ok(mut guard) = self.next_block.lock() {
            *guard = Some(next_block);
        }
        Ok(())
    }
}

/// One row per tracked contract in `_ingest_checkpoint`.
pub struct PgCheckpointStore {
    pool: Arc<DbPool>,
    contract_address: String,
}

impl PgCheckpointStore {
    pub fn new(pool: Arc<DbPool>, contract: Address) -> Self {
        Self {
            pool,
            contract_address: contract.to_checksum(None),
        }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self) -> Result<Option<u64>, DbError> {
        let rows = self
            .pool
            .select_all(
                "checkpoint load",
                "SELECT next_block FROM _ingest_checkpoint WHERE contract_address = $1",
                &[DbValue::Text(self.contract_address.clone())],
            )
            .await?;

        Ok(rows.first().map(|row| row.get::<_, i64>(0) as u64))
    }

    async fn save(&self, next_block: u64) -> Result<(), DbError> {
        self.pool
            .execute(checkpoint_upsert(&self.contract_address, next_block))
            .await?;
        Ok(())
    }
}

/// `updated_at` is refreshed by the `_ingest_checkpoint` update trigger.
fn checkpoint_upsert(contract_address: &str, next_block: u64) -> DbOperation {
    DbOperation::upsert(
        "_ingest_checkpoint",
        vec![
            ("contract_address", DbValue::Text(contract_address.to_string())),
            ("next_block", DbValue::Int64(next_block as i64)),
        ],
        &["contract_address"],
    )
    .updating(&["next_block"])
}

/// Tracks the lowest block not yet completed. Blocks may finish in any order;
/// the watermark only moves over a contiguous run of completed blocks.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    watermark: u64,
    done: BTreeSet<u64>,
}

impl CompletionTracker {
    pub fn new(start: u64) -> Self {
        Self {
            watermark: start,
            done: BTreeSet::new(),
        }
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Returns the new watermark when it moved.
    pub fn complete(&mut self, block: u64) -> Option<u64> {
        if block < self.watermark {
            return None;
        }
        self.done.insert(block);

        let before = self.watermark;
        while self.done.remove(&self.watermark) {
            self.watermark += 1;
        }

        (self.watermark != before).then_some(self.watermark)
    }
}
