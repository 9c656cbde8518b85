use std::time::Duration;

use alloy::primitives::B256;
use thiserror::Error;

use crate::contract::ContractError;
use crate::db::DbError;
use crate::rpc::RpcError;

/// Failure while processing a single block.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Contract call failed: {0}")]
    Contract(#[from] ContractError),

    #[error("Block {0} not found")]
    MissingBlock(u64),

    #[error("Receipt for transaction {0} not found")]
    MissingReceipt(B256),
}

/// Reasons the scan loop stops with an error.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Block #{block} failed: {source}")]
    BlockFailed {
        block: u64,
        #[source]
        source: IngestError,
    },

    #[error("Block #{block} did not finish within {timeout:?}")]
    BlockTimedOut { block: u64, timeout: Duration },

    #[error("Block #{block} task panicked: {message}")]
    TaskPanicked { block: u64, message: String },

    #[error("Block task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] DbError),
}

impl ScanError {
    /// The block this error is attributed to, if any.
    pub fn block(&self) -> Option<u64> {
        match self {
            ScanError::BlockFailed { block, .. }
            | ScanError::BlockTimedOut { block, .. }
            | ScanError::TaskPanicked { block, .. } => Some(*block),
            _ => None,
        }
    }
}
