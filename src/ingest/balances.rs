//! Turns decoded Transfer events into `user_balance` rows.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::BlockId;
use async_trait::async_trait;

use super::error::IngestError;
use crate::contract::TokenContract;
use crate::db::{DbError, DbOperation, DbPool, DbValue};
use crate::decoding::DecodedEvent;
use crate::rpc::NodeSupervisor;

const TRANSFER_EVENT: &str = "Transfer";

/// Unique key of `user_balance`, backed by `user_balance_address_tx_idx`.
const BALANCE_KEY: [&str; 2] = ["address", "transaction_hash"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    pub balance: U256,
    pub address: Address,
    pub transaction_hash: B256,
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Inserts unless a row for `(address, transaction_hash)` exists.
    /// Returns whether a row was written.
    async fn insert_if_absent(&self, record: &BalanceRecord) -> Result<bool, DbError>;
}

#[async_trait]
impl BalanceStore for DbPool {
    async fn insert_if_absent(&self, record: &BalanceRecord) -> Result<bool, DbError> {
        let affected = self.execute(balance_upsert(record)).await?;
        Ok(affected > 0)
    }
}

fn balance_upsert(record: &BalanceRecord) -> DbOperation {
    DbOperation::upsert(
        "user_balance",
        vec![
            ("balance", DbValue::Numeric(record.balance.to_string())),
            ("address", DbValue::Text(record.address.to_checksum(None))),
            ("transaction_hash", DbValue::Text(record.transaction_hash.to_string())),
        ],
        &BALANCE_KEY,
    )
}

pub struct BalanceResolver {
    supervisor: Arc<NodeSupervisor>,
    token: TokenContract,
    store: Arc<dyn BalanceStore>,
    pin_to_block: bool,
}

impl BalanceResolver {
    pub fn new(
        supervisor: Arc<NodeSupervisor>,
        token: TokenContract,
        store: Arc<dyn BalanceStore>,
        pin_to_block: bool,
    ) -> Self {
        Self {
            supervisor,
            token,
            store,
            pin_to_block,
        }
    }

    /// Stores the balances of both parties of every Transfer. Returns rows inserted.
    pub async fn handle_events(
        &self,
        events: &[DecodedEvent],
        tx_hash: B256,
        block: u64,
    ) -> Result<usize, IngestError> {
        let mut inserted = 0;

        for event in events.iter().filter(|e| e.name == TRANSFER_EVENT) {
            let parties = (
                event.field(0).and_then(|v| v.as_address()),
                event.field(1).and_then(|v| v.as_address()),
            );
            let (Some(from), Some(to)) = parties else {
                tracing::warn!(
                    "Skipping Transfer in tx {} without addresses at positions 0 and 1: {:?}",
                    tx_hash,
                    event.data
                );
                continue;
            };

            for holder in [from, to] {
                if self.resolve_and_store(holder, tx_hash, block).await? {
                    inserted += 1;
                }
            }
        }

        Ok(inserted)
    }

    /// Reads the holder's current balance and records it against the transaction.
    pub async fn resolve_and_store(
        &self,
        holder: Address,
        tx_hash: B256,
        block: u64,
    ) -> Result<bool, IngestError> {
        let at = if self.pin_to_block {
            BlockId::number(block)
        } else {
            BlockId::latest()
        };

        let node = self.supervisor.provider().await?;
        let balance = self.token.balance_of(node.as_ref(), holder, at).await?;

        let record = BalanceRecord {
            balance,
            address: holder,
            transaction_hash: tx_hash,
        };
        let inserted = self.store.insert_if_absent(&record).await?;

        if inserted {
            tracing::debug!(
                "New record inserted: {} holds {} after tx {}",
                holder,
                balance,
                tx_hash
            );
        }

        Ok(inserted)
    }
}
