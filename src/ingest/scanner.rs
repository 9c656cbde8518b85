//! Follows the chain head and runs one block task per block, at most
//! `max_concurrent_blocks` at a time.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::checkpoint::{CheckpointStore, CompletionTracker};
use super::error::ScanError;
use super::explorer::{BlockOutcome, BlockProcessor};
use crate::rpc::NodeSupervisor;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub max_concurrent_blocks: usize,
    /// How often the chain head is polled while waiting for new blocks
    pub poll_interval: Duration,
    /// Upper bound on a single block task
    pub block_timeout: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_blocks: 8,
            poll_interval: Duration::from_secs(1),
            block_timeout: Duration::from_secs(300),
        }
    }
}

type BlockResult = Result<BlockOutcome, ScanError>;

pub struct Scanner {
    supervisor: Arc<NodeSupervisor>,
    processor: Arc<dyn BlockProcessor>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: ScannerConfig,
}

/// Per-run scan state: the dispatch cursor, the completion watermark and the
/// tasks still in flight.
struct ScanState {
    next_dispatch: u64,
    completed: CompletionTracker,
    tasks: JoinSet<BlockResult>,
}

impl Scanner {
    pub fn new(
        supervisor: Arc<NodeSupervisor>,
        processor: Arc<dyn BlockProcessor>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            supervisor,
            processor,
            checkpoints,
            config,
        }
    }

    /// Scans until cancelled or until a block task fails.
    ///
    /// Without a stored checkpoint the scan starts at the current head; no
    /// history is backfilled. The stored checkpoint only ever moves past blocks
    /// whose tasks completed, so a restart after a failure replays from the
    /// lowest unfinished block.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ScanError> {
        let start = match self.checkpoints.load().await? {
            Some(next) => {
                tracing::info!("Resuming from checkpoint #{}", next);
                next
            }
            None => {
                let head = self.chain_head().await?;
                tracing::info!("No checkpoint stored, starting at chain head #{}", head);
                head
            }
        };

        let mut state = ScanState {
            next_dispatch: start,
            completed: CompletionTracker::new(start),
            tasks: JoinSet::new(),
        };
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_blocks.max(1)));

        let result = self.scan(&mut state, &permits, &cancel).await;

        state.tasks.shutdown().await;
        match &result {
            Ok(()) => tracing::info!(
                "Scanner stopped, every block below #{} is complete",
                state.completed.watermark()
            ),
            Err(e) => tracing::error!(
                "Scanner failed with every block below #{} complete: {}",
                state.completed.watermark(),
                e
            ),
        }
        result
    }

    async fn scan(
        &self,
        state: &mut ScanState,
        permits: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> Result<(), ScanError> {
        loop {
            let head = self.chain_head().await?;

            if state.next_dispatch <= head {
                tracing::info!("Scanning from #{} to #{}", state.next_dispatch, head);
            }

            while state.next_dispatch <= head {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Ok(()),
                    },
                };
                self.reap_finished(state).await?;

                let block = state.next_dispatch;
                let processor = self.processor.clone();
                let timeout = self.config.block_timeout;
                state.tasks.spawn(async move {
                    let _permit = permit;
                    run_block(processor, block, timeout).await
                });
                state.next_dispatch += 1;
            }

            if !self.wait_for_blocks(state, cancel).await? {
                return Ok(());
            }
        }
    }

    /// Reaps finished tasks until the head reaches the dispatch cursor.
    /// Returns false when cancelled.
    async fn wait_for_blocks(
        &self,
        state: &mut ScanState,
        cancel: &CancellationToken,
    ) -> Result<bool, ScanError> {
        let mut announced = false;

        loop {
            let deadline = Instant::now() + self.config.poll_interval;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(false),
                    Some(joined) = state.tasks.join_next() => self.record(state, joined).await?,
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }

            let head = self.chain_head().await?;
            if head >= state.next_dispatch {
                return Ok(true);
            }
            if !announced {
                tracing::info!(
                    "Waiting for new blocks (head #{}, next #{})",
                    head,
                    state.next_dispatch
                );
                announced = true;
            }
        }
    }

    async fn reap_finished(&self, state: &mut ScanState) -> Result<(), ScanError> {
        while let Some(joined) = state.tasks.try_join_next() {
            self.record(state, joined).await?;
        }
        Ok(())
    }

    async fn record(
        &self,
        state: &mut ScanState,
        joined: Result<BlockResult, JoinError>,
    ) -> Result<(), ScanError> {
        let outcome = joined??;

        tracing::debug!(
            "Block #{}: {} transactions, {} relevant, {} events, {} rows inserted",
            outcome.block,
            outcome.transactions,
            outcome.relevant_receipts,
            outcome.events,
            outcome.rows_inserted
        );

        if let Some(watermark) = state.completed.complete(outcome.block) {
            self.checkpoints.save(watermark).await?;
        }
        Ok(())
    }

    async fn chain_head(&self) -> Result<u64, ScanError> {
        let node = self.supervisor.provider().await?;
        Ok(node.block_number().await?)
    }
}

async fn run_block(
    processor: Arc<dyn BlockProcessor>,
    block: u64,
    timeout: Duration,
) -> BlockResult {
    let guarded = AssertUnwindSafe(tokio::time::timeout(timeout, processor.process(block)));

    let result = match guarded.catch_unwind().await {
        Ok(Ok(Ok(outcome))) => Ok(outcome),
        Ok(Ok(Err(source))) => Err(ScanError::BlockFailed { block, source }),
        Ok(Err(_elapsed)) => Err(ScanError::BlockTimedOut { block, timeout }),
        Err(panic) => Err(ScanError::TaskPanicked {
            block,
            message: panic_message(panic.as_ref()),
        }),
    };

    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
