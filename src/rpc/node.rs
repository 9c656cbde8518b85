//! The node operations the ingester relies on, independent of transport.

use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::{BlockId, BlockNumberOrTag, Log, TransactionReceipt};
use async_trait::async_trait;

use super::rpc::{RpcClient, RpcError};

/// Transaction hashes of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub number: u64,
    pub transactions: Vec<B256>,
}

/// One emitted log, still undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// The parts of a transaction receipt used for relevance filtering and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptData {
    pub transaction_hash: B256,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub logs: Vec<RawLog>,
}

/// A connection to a ledger node. Implementations must tolerate concurrent use,
/// a single handle is shared by every block worker.
#[async_trait]
pub trait LedgerNode: Send + Sync + std::fmt::Debug {
    /// Cheap round trip telling whether the endpoint answers at all.
    async fn is_live(&self) -> bool;

    async fn block_number(&self) -> Result<u64, RpcError>;

    async fn block(&self, number: u64) -> Result<Option<RawBlock>, RpcError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>, RpcError>;

    async fn call(&self, to: Address, input: Bytes, block: BlockId) -> Result<Bytes, RpcError>;
}

#[async_trait]
impl LedgerNode for RpcClient {
    async fn is_live(&self) -> bool {
        match self.ping().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Liveness probe failed: {}", e);
                false
            }
        }
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.get_block_number().await
    }

    async fn block(&self, number: u64) -> Result<Option<RawBlock>, RpcError> {
        let block = self
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await?;

        Ok(block.map(|block| RawBlock {
            number,
            transactions: block.transactions.hashes().collect(),
        }))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>, RpcError> {
        let receipt = self.get_transaction_receipt(hash).await?;
        Ok(receipt.map(|r| receipt_data(&r)))
    }

    async fn call(&self, to: Address, input: Bytes, block: BlockId) -> Result<Bytes, RpcError> {
        RpcClient::call(self, to, input, block).await
    }
}

fn receipt_data(receipt: &TransactionReceipt) -> ReceiptData {
    ReceiptData {
        transaction_hash: receipt.transaction_hash,
        to: receipt.to,
        contract_address: receipt.contract_address,
        logs: receipt.inner.logs().iter().map(raw_log).collect(),
    }
}

fn raw_log(log: &Log) -> RawLog {
    RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
    }
}
