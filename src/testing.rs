//! In-memory stand-ins for the node and the stores, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::BlockId;
use async_trait::async_trait;

use crate::db::DbError;
use crate::ingest::{BalanceRecord, BalanceStore};
use crate::rpc::{Connector, LedgerNode, RawBlock, ReceiptData, RpcError};

/// Chain state shared by every fake connection.
#[derive(Debug, Default)]
pub struct FakeChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, Vec<B256>>>,
    receipts: Mutex<HashMap<B256, ReceiptData>>,
    balances: Mutex<HashMap<Address, U256>>,
    total_supply: Mutex<U256>,
    receipt_fetches: Mutex<Vec<B256>>,
    hidden_blocks: Mutex<HashMap<u64, usize>>,
    block_fetches: Mutex<HashMap<u64, usize>>,
    calls: Mutex<Vec<(Address, Bytes, BlockId)>>,
    connections: AtomicUsize,
    severed: AtomicUsize,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            ..Default::default()
        }
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Blocks at or below head that were never added are empty.
    pub fn add_block(&self, number: u64, transactions: Vec<B256>) {
        self.blocks.lock().unwrap().insert(number, transactions);
    }

    /// The next `times` fetches of `number` answer null, as a lagging backend would.
    pub fn hide_block(&self, number: u64, times: usize) {
        self.hidden_blocks.lock().unwrap().insert(number, times);
    }

    pub fn block_fetches(&self, number: u64) -> usize {
        self.block_fetches
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .unwrap_or_default()
    }

    pub fn add_receipt(&self, receipt: ReceiptData) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn set_balance(&self, holder: Address, balance: U256) {
        self.balances.lock().unwrap().insert(holder, balance);
    }

    pub fn set_total_supply(&self, supply: U256) {
        *self.total_supply.lock().unwrap() = supply;
    }

    pub fn receipt_fetches(&self) -> Vec<B256> {
        self.receipt_fetches.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(Address, Bytes, BlockId)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every connection opened so far stops answering.
    pub fn sever_connections(&self) {
        self.severed
            .store(self.connections.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct FakeNode {
    chain: Arc<FakeChain>,
    index: usize,
    reachable: bool,
}

impl FakeNode {
    pub fn connect(chain: Arc<FakeChain>) -> Self {
        Self::open(chain, |_| true)
    }

    fn open(chain: Arc<FakeChain>, reachable: impl Fn(usize) -> bool) -> Self {
        let index = chain.connections.fetch_add(1, Ordering::SeqCst) + 1;
        Self {
            reachable: reachable(index),
            chain,
            index,
        }
    }

    fn check(&self) -> Result<&FakeChain, RpcError> {
        if self.reachable && self.index > self.chain.severed.load(Ordering::SeqCst) {
            Ok(&self.chain)
        } else {
            Err(RpcError::ProviderError(format!(
                "connection {} refused",
                self.index
            )))
        }
    }
}

#[async_trait]
impl LedgerNode for FakeNode {
    async fn is_live(&self) -> bool {
        self.check().is_ok()
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.check()?.head.load(Ordering::SeqCst))
    }

    async fn block(&self, number: u64) -> Result<Option<RawBlock>, RpcError> {
        let chain = self.check()?;
        *chain.block_fetches.lock().unwrap().entry(number).or_default() += 1;
        if number > chain.head.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if let Some(remaining) = chain.hidden_blocks.lock().unwrap().get_mut(&number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        let transactions = chain
            .blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default();
        Ok(Some(RawBlock {
            number,
            transactions,
        }))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>, RpcError> {
        let chain = self.check()?;
        chain.receipt_fetches.lock().unwrap().push(hash);
        Ok(chain.receipts.lock().unwrap().get(&hash).cloned())
    }

    /// Answers `totalSupply()` for bare selectors and `balanceOf(address)` otherwise.
    async fn call(&self, to: Address, input: Bytes, block: BlockId) -> Result<Bytes, RpcError> {
        let chain = self.check()?;
        chain.calls.lock().unwrap().push((to, input.clone(), block));

        let value = match input.len() {
            4 => *chain.total_supply.lock().unwrap(),
            36 => {
                let holder = Address::from_slice(&input[16..36]);
                chain
                    .balances
                    .lock()
                    .unwrap()
                    .get(&holder)
                    .copied()
                    .unwrap_or_default()
            }
            n => {
                return Err(RpcError::ProviderError(format!(
                    "execution reverted: unexpected calldata length {}",
                    n
                )))
            }
        };

        Ok(Bytes::from(value.to_be_bytes::<32>().to_vec()))
    }
}

/// Opens fake connections; the n-th connection (1-based) is reachable iff n >= `live_from`.
pub struct FakeConnector {
    chain: Arc<FakeChain>,
    live_from: usize,
}

impl FakeConnector {
    pub fn live_from(chain: Arc<FakeChain>, live_from: usize) -> Self {
        Self { chain, live_from }
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> Result<Arc<dyn LedgerNode>, RpcError> {
        let live_from = self.live_from;
        Ok(Arc::new(FakeNode::open(self.chain.clone(), move |n| {
            n >= live_from
        })))
    }
}

/// Keeps rows in memory with the same uniqueness rule as `user_balance`.
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    rows: Mutex<Vec<BalanceRecord>>,
    attempts: Mutex<Vec<BalanceRecord>>,
}

impl MemoryBalanceStore {
    pub fn rows(&self) -> Vec<BalanceRecord> {
        self.rows.lock().unwrap().clone()
    }

    /// Every insert requested, including ones that hit an existing row.
    pub fn attempts(&self) -> Vec<BalanceRecord> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn insert_if_absent(&self, record: &BalanceRecord) -> Result<bool, DbError> {
        self.attempts.lock().unwrap().push(record.clone());

        let mut rows = self.rows.lock().unwrap();
        let exists = rows.iter().any(|r| {
            r.address == record.address && r.transaction_hash == record.transaction_hash
        });
        if exists {
            return Ok(false);
        }
        rows.push(record.clone());
        Ok(true)
    }
}
