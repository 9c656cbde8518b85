use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};

use super::balances::BalanceResolver;
use super::error::IngestError;
use crate::decoding::EventDecoder;
use crate::rpc::{LedgerNode, NodeSupervisor, RawBlock, RawLog, ReceiptData, RetryConfig};

/// Work done for one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockOutcome {
    pub block: u64,
    pub transactions: usize,
    pub relevant_receipts: usize,
    pub events: usize,
    pub rows_inserted: usize,
}

/// Processes one block number end to end. The scanner runs one of these per block.
#[async_trait]
pub trait BlockProcessor: Send + Sync {
    async fn process(&self, block: u64) -> Result<BlockOutcome, IngestError>;
}

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Decode only logs emitted by the tracked contract itself
    pub contract_logs_only: bool,
    /// Receipt requests in flight per block
    pub receipt_concurrency: usize,
    /// Backoff for a block the node reports as null. Load-balanced endpoints
    /// can briefly lag behind the head another backend reported.
    pub null_block_retry: RetryConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            contract_logs_only: false,
            receipt_concurrency: 4,
            null_block_retry: RetryConfig {
                max_retries: 5,
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(4),
                backoff_multiplier: 2.0,
            },
        }
    }
}

pub struct BlockExplorer {
    supervisor: Arc<NodeSupervisor>,
    decoder: Arc<EventDecoder>,
    resolver: Arc<BalanceResolver>,
    tracked: Address,
    config: ExplorerConfig,
}

impl BlockExplorer {
    pub fn new(
        supervisor: Arc<NodeSupervisor>,
        decoder: Arc<EventDecoder>,
        resolver: Arc<BalanceResolver>,
        tracked: Address,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            supervisor,
            decoder,
            resolver,
            tracked,
            config,
        }
    }

    fn logs_to_decode(&self, receipt: &ReceiptData) -> Vec<RawLog> {
        receipt
            .logs
            .iter()
            .filter(|log| !self.config.contract_logs_only || log.address == self.tracked)
            .cloned()
            .collect()
    }

    async fn fetch_block(&self, node: &dyn LedgerNode, number: u64) -> Result<RawBlock, IngestError> {
        let retry = &self.config.null_block_retry;

        for attempt in 0..=retry.max_retries {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                tracing::warn!(
                    "Block #{} not served yet, retry {}/{} in {:?}",
                    number,
                    attempt,
                    retry.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            if let Some(block) = node.block(number).await? {
                return Ok(block);
            }
        }

        Err(IngestError::MissingBlock(number))
    }
}

async fn fetch_receipt(node: &dyn LedgerNode, hash: B256) -> Result<ReceiptData, IngestError> {
    node.transaction_receipt(hash)
        .await?
        .ok_or(IngestError::MissingReceipt(hash))
}

/// A receipt matters when the transaction was sent to, or deployed, the tracked contract.
pub fn is_relevant(receipt: &ReceiptData, tracked: Address) -> bool {
    receipt.to == Some(tracked) || receipt.contract_address == Some(tracked)
}

#[async_trait]
impl BlockProcessor for BlockExplorer {
    async fn process(&self, number: u64) -> Result<BlockOutcome, IngestError> {
        let node = self.supervisor.provider().await?;
        let block = self.fetch_block(node.as_ref(), number).await?;

        let receipts: Vec<ReceiptData> = stream::iter(block.transactions.iter().copied())
            .map(|hash| fetch_receipt(node.as_ref(), hash))
            .buffered(self.config.receipt_concurrency.max(1))
            .try_collect()
            .await?;

        let mut outcome = BlockOutcome {
            block: number,
            transactions: block.transactions.len(),
            ..Default::default()
        };

        for receipt in receipts.iter().filter(|r| is_relevant(r, self.tracked)) {
            outcome.relevant_receipts += 1;

            let events = self.decoder.decode(&self.logs_to_decode(receipt));
            if events.is_empty() {
                continue;
            }
            outcome.events += events.len();
            outcome.rows_inserted += self
                .resolver
                .handle_events(&events, receipt.transaction_hash, number)
                .await?;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::TokenContract;
    use crate::decoding::ParsedEvent;
    use crate::rpc::SupervisorConfig;
    use crate::testing::{FakeChain, FakeConnector, MemoryBalanceStore};
    use alloy::primitives::{address, Bytes, U256};

    const TOKEN: Address = address!("baac2b4491727d78d2b78815144570b9f2fe8899");
    const A: Address = address!("00000000000000000000000000000000000000aa");
    const B: Address = address!("00000000000000000000000000000000000000bb");
    const TRANSFER: &str = "Transfer(address indexed from, address indexed to, uint256 value)";

    fn transfer_log(emitter: Address, from: Address, to: Address) -> RawLog {
        RawLog {
            address: emitter,
            topics: vec![
                ParsedEvent::from_signature(TRANSFER).unwrap().topic0,
                from.into_word(),
                to.into_word(),
            ],
            data: Bytes::from(U256::from(1u64).to_be_bytes::<32>().to_vec()),
        }
    }

    fn receipt(
        hash: B256,
        to: Option<Address>,
        contract_address: Option<Address>,
        logs: Vec<RawLog>,
    ) -> ReceiptData {
        ReceiptData {
            transaction_hash: hash,
            to,
            contract_address,
            logs,
        }
    }

    fn fast_retry() -> ExplorerConfig {
        ExplorerConfig {
            null_block_retry: RetryConfig {
                max_retries: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    fn explorer(
        chain: Arc<FakeChain>,
        store: Arc<MemoryBalanceStore>,
        config: ExplorerConfig,
    ) -> BlockExplorer {
        let supervisor = Arc::new(NodeSupervisor::new(
            FakeConnector::live_from(chain, 1),
            SupervisorConfig::default(),
        ));
        let token =
            TokenContract::new(TOKEN, "balanceOf(address)(uint256)", "totalSupply()(uint256)")
                .unwrap();
        let resolver = Arc::new(BalanceResolver::new(
            supervisor.clone(),
            token,
            store,
            false,
        ));
        let decoder = Arc::new(EventDecoder::from_signatures(&[TRANSFER]).unwrap());
        BlockExplorer::new(supervisor, decoder, resolver, TOKEN, config)
    }

    #[test]
    fn test_relevance_filter() {
        let hash = B256::repeat_byte(1);
        let other = Address::repeat_byte(0x77);

        assert!(is_relevant(&receipt(hash, Some(TOKEN), None, vec![]), TOKEN));
        assert!(is_relevant(&receipt(hash, None, Some(TOKEN), vec![]), TOKEN));
        assert!(!is_relevant(&receipt(hash, Some(other), None, vec![]), TOKEN));
        assert!(!is_relevant(&receipt(hash, None, Some(other), vec![]), TOKEN));
    }

    #[tokio::test]
    async fn test_transfer_to_tracked_contract_is_stored() {
        let chain = Arc::new(FakeChain::new(100));
        let tx = B256::left_padding_from(&[0x0a, 0xbc]);
        chain.add_block(100, vec![tx]);
        chain.add_receipt(receipt(tx, Some(TOKEN), None, vec![transfer_log(TOKEN, A, B)]));
        chain.set_balance(A, U256::from(5u64));
        let store = Arc::new(MemoryBalanceStore::default());

        let outcome = explorer(chain, store.clone(), fast_retry())
            .process(100)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BlockOutcome {
                block: 100,
                transactions: 1,
                relevant_receipts: 1,
                events: 1,
                rows_inserted: 2,
            }
        );
        let attempts = store.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|r| r.transaction_hash == tx));
        assert_eq!(attempts[0].address, A);
        assert_eq!(attempts[0].balance, U256::from(5u64));
        assert_eq!(attempts[1].address, B);
    }

    #[tokio::test]
    async fn test_irrelevant_receipts_are_fetched_but_not_decoded() {
        let chain = Arc::new(FakeChain::new(100));
        let other = Address::repeat_byte(0x77);
        let unrelated = B256::repeat_byte(1);
        let creation = B256::repeat_byte(2);
        chain.add_block(100, vec![unrelated, creation]);
        chain.add_receipt(receipt(
            unrelated,
            Some(other),
            None,
            vec![transfer_log(TOKEN, A, B)],
        ));
        chain.add_receipt(receipt(creation, None, Some(TOKEN), vec![]));
        let store = Arc::new(MemoryBalanceStore::default());

        let outcome = explorer(chain.clone(), store.clone(), fast_retry())
            .process(100)
            .await
            .unwrap();

        assert_eq!(outcome.transactions, 2);
        assert_eq!(outcome.relevant_receipts, 1);
        assert_eq!(outcome.events, 0);
        assert!(store.attempts().is_empty());
        assert_eq!(chain.receipt_fetches(), vec![unrelated, creation]);
    }

    #[tokio::test]
    async fn test_contract_logs_only_drops_foreign_logs() {
        let chain = Arc::new(FakeChain::new(100));
        let tx = B256::repeat_byte(3);
        let router = Address::repeat_byte(0x99);
        chain.add_block(100, vec![tx]);
        chain.add_receipt(receipt(
            tx,
            Some(TOKEN),
            None,
            vec![transfer_log(router, A, B), transfer_log(TOKEN, B, A)],
        ));

        let all_logs = Arc::new(MemoryBalanceStore::default());
        let outcome = explorer(chain.clone(), all_logs, fast_retry())
            .process(100)
            .await
            .unwrap();
        assert_eq!(outcome.events, 2);

        let own_logs = Arc::new(MemoryBalanceStore::default());
        let outcome = explorer(
            chain,
            own_logs,
            ExplorerConfig {
                contract_logs_only: true,
                ..fast_retry()
            },
        )
        .process(100)
        .await
        .unwrap();
        assert_eq!(outcome.events, 1);
    }

    #[tokio::test]
    async fn test_empty_block() {
        let chain = Arc::new(FakeChain::new(100));
        let store = Arc::new(MemoryBalanceStore::default());

        let outcome = explorer(chain, store, fast_retry())
            .process(99)
            .await
            .unwrap();

        assert_eq!(outcome.transactions, 0);
        assert_eq!(outcome.relevant_receipts, 0);
    }

    #[tokio::test]
    async fn test_missing_block_is_an_error() {
        let chain = Arc::new(FakeChain::new(100));
        let store = Arc::new(MemoryBalanceStore::default());

        let result = explorer(chain, store, fast_retry())
            .process(101)
            .await;

        assert!(matches!(result, Err(IngestError::MissingBlock(101))));
    }

    #[tokio::test]
    async fn test_lagging_block_is_retried() {
        let chain = Arc::new(FakeChain::new(100));
        let tx = B256::repeat_byte(5);
        chain.add_block(100, vec![tx]);
        chain.add_receipt(receipt(tx, Some(TOKEN), None, vec![transfer_log(TOKEN, A, B)]));
        chain.hide_block(100, 2);
        let store = Arc::new(MemoryBalanceStore::default());

        let outcome = explorer(chain.clone(), store.clone(), fast_retry())
            .process(100)
            .await
            .unwrap();

        assert_eq!(chain.block_fetches(100), 3);
        assert_eq!(outcome.rows_inserted, 2);
        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_block_null_past_retry_budget_is_an_error() {
        let chain = Arc::new(FakeChain::new(100));
        chain.hide_block(100, 10);
        let store = Arc::new(MemoryBalanceStore::default());

        let result = explorer(chain.clone(), store, fast_retry())
            .process(100)
            .await;

        assert!(matches!(result, Err(IngestError::MissingBlock(100))));
        assert_eq!(chain.block_fetches(100), 4);
    }

    #[tokio::test]
    async fn test_missing_receipt_is_an_error() {
        let chain = Arc::new(FakeChain::new(100));
        let tx = B256::repeat_byte(4);
        chain.add_block(100, vec![tx]);
        let store = Arc::new(MemoryBalanceStore::default());

        let result = explorer(chain, store, fast_retry())
            .process(100)
            .await;

        assert!(matches!(result, Err(IngestError::MissingReceipt(hash)) if hash == tx));
    }
}
