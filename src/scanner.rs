//! Block scanner
//!
//! Single task that advances strictly height by height and transaction by transaction:
//! fork check, scheduled maintenance, then decode / verify / apply for every inscription in the
//! block, each chain transaction inside its own database transaction. The height is recorded
//! only after all of its transactions were handled.

use crate::address::derived_id;
use crate::chain::{first_input_address, BlockDetail, ChainReader, RawTransaction};
use crate::config::IndexerConfig;
use crate::decoder::Decoder;
use crate::error::{IndexerError, IndexerResult};
use crate::fork::{self, SyncState};
use crate::ledger::{Ledger, TxContext};
use crate::protocol::{HandlerRegistry, OperationMeta};
use crate::pump::{self, engine as pump_engine};
use crate::sale;
use crate::store::blocks::{self, BlockRecord};
use crate::store::operations::{self, OrderStatus};
use crate::store::Store;
use rusqlite::Connection;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Maintenance run once per height, before that height's transactions
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns how many items were acted on
    fn run(&self, conn: &Connection, block: &BlockRecord) -> IndexerResult<usize>;
}

/// Graduates bonding curves whose reserves crossed the threshold without an inline trigger
#[derive(Debug, Default)]
pub struct PumpGraduationSweep;

impl ScheduledTask for PumpGraduationSweep {
    fn name(&self) -> &'static str {
        "pump-graduation-sweep"
    }

    fn run(&self, conn: &Connection, block: &BlockRecord) -> IndexerResult<usize> {
        let mut graduated = 0;
        for pool in pump::all_pools(conn)? {
            if !pump_engine::ready_to_graduate(conn, &pool)? {
                continue;
            }
            let pair_id = derived_id(&format!("graduate{}", pool.tick_id));
            let ledger = Ledger::new(
                conn,
                TxContext {
                    tx_hash: pair_id.clone(),
                    block_number: block.block_number,
                    block_time: block.block_time,
                },
            );
            pump_engine::graduate(&ledger, &pool, &pair_id)?;
            graduated += 1;
        }
        Ok(graduated)
    }
}

/// Closes launch boxes whose closing height has come
#[derive(Debug, Default)]
pub struct BoxSettlement;

impl ScheduledTask for BoxSettlement {
    fn name(&self) -> &'static str {
        "box-settlement"
    }

    fn run(&self, conn: &Connection, block: &BlockRecord) -> IndexerResult<usize> {
        let due = sale::due_at(conn, block.block_number)?;
        for launch in &due {
            let ledger = Ledger::new(
                conn,
                TxContext {
                    tx_hash: derived_id(&format!("box{}", launch.tick0)),
                    block_number: block.block_number,
                    block_time: block.block_time,
                },
            );
            sale::settle(&ledger, launch)?;
        }
        Ok(due.len())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub blocks: u64,
    pub applied: u64,
    pub failed: u64,
    pub rollbacks: u64,
}

impl TickReport {
    fn absorb(&mut self, other: TickReport) {
        self.blocks += other.blocks;
        self.applied += other.applied;
        self.failed += other.failed;
        self.rollbacks += other.rollbacks;
    }
}

pub struct Scanner {
    store: Arc<Store>,
    reader: Arc<dyn ChainReader>,
    decoder: Box<dyn Decoder>,
    registry: HandlerRegistry,
    config: IndexerConfig,
    state: SyncState,
    tasks: Vec<Box<dyn ScheduledTask>>,
}

impl Scanner {
    pub fn new(
        store: Arc<Store>,
        reader: Arc<dyn ChainReader>,
        decoder: Box<dyn Decoder>,
        registry: HandlerRegistry,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            reader,
            decoder,
            registry,
            config,
            state: SyncState::Synced,
            tasks: vec![Box::new(PumpGraduationSweep), Box::new(BoxSettlement)],
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// First height not yet recorded
    pub fn next_height(&self) -> IndexerResult<u64> {
        let latest = self.store.read(blocks::latest_height)?;
        Ok(latest.map_or(self.config.start_height, |h| h + 1))
    }

    /// Scan on the configured interval until `shutdown` resolves
    ///
    /// A tick in progress always runs to completion; shutdown is only observed between ticks.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut timer = interval(Duration::from_millis(self.config.scan_interval_ms));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        log::info!("🚀 Scanner started");
        log::info!("   ├─ Interval: {}ms", self.config.scan_interval_ms);
        log::info!("   ├─ Max blocks per tick: {}", self.config.max_blocks_per_tick);
        log::info!("   └─ Protocols: {}", self.registry.tags().join(", "));

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("🛑 Shutdown requested, scanner stopping");
                    break;
                }

                _ = timer.tick() => {
                    match self.tick().await {
                        Ok(report) if report.blocks > 0 || report.rollbacks > 0 => {
                            log::info!(
                                "📊 Tick: {} blocks, {} applied, {} rejected, {} rollbacks",
                                report.blocks,
                                report.applied,
                                report.failed,
                                report.rollbacks
                            );
                        }
                        Ok(_) => {}
                        Err(e) if e.is_transient() => {
                            log::warn!("⚠️  Tick aborted, retrying next interval: {}", e);
                        }
                        Err(e) => {
                            log::error!("❌ Tick failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    /// Process up to `max_blocks_per_tick` heights
    pub async fn tick(&mut self) -> IndexerResult<TickReport> {
        let tip = self.reader.block_count().await?;
        let mut report = TickReport::default();
        let mut height = self.next_height()?;

        while height <= tip && report.blocks < self.config.max_blocks_per_tick {
            let hash = self.reader.block_hash(height).await?;
            let block = self.reader.block(&hash).await?;

            if self.store.read(|conn| fork::diverges(conn, &block))? {
                let ancestor = self.reconcile(height).await?;
                report.rollbacks += 1;
                height = ancestor + 1;
                continue;
            }

            report.absorb(self.process_block(&block).await?);
            height += 1;
        }

        Ok(report)
    }

    async fn reconcile(&mut self, height: u64) -> IndexerResult<u64> {
        self.state = SyncState::Reconciling;
        log::warn!("🔄 Fork detected at height {}, reconciling", height);

        let ancestor =
            fork::find_common_ancestor(self.reader.as_ref(), &self.store, height.saturating_sub(1))
                .await?;
        let rollback = self.store.write(|tx| fork::rollback_to(tx, ancestor))?;

        log::info!("✅ Rolled back to height {}", rollback.ancestor);
        log::info!("   ├─ Events undone: {}", rollback.events_undone);
        log::info!("   ├─ Operations removed: {}", rollback.operations_removed);
        log::info!("   └─ Blocks removed: {}", rollback.blocks_removed);

        self.state = SyncState::Synced;
        Ok(ancestor)
    }

    async fn process_block(&self, block: &BlockDetail) -> IndexerResult<TickReport> {
        let record = BlockRecord {
            block_number: block.height,
            block_hash: block.hash.clone(),
            block_time: block.time,
        };
        let mut report = TickReport {
            blocks: 1,
            ..TickReport::default()
        };

        self.run_scheduled(&record)?;

        for (index, txid) in block.txids.iter().enumerate() {
            let status = self.store.read(|conn| operations::status_of(conn, txid))?;
            if status.is_some_and(OrderStatus::is_final) {
                continue;
            }

            let raw = self.reader.raw_transaction(txid).await?;
            match self.process_transaction(block, index, raw).await? {
                Some(true) => report.applied += 1,
                Some(false) => report.failed += 1,
                None => {}
            }
        }

        self.store.write(|tx| blocks::save(tx, &record))?;
        log::debug!(
            "✅ Height {} ({} txs) recorded",
            block.height,
            block.txids.len()
        );
        Ok(report)
    }

    /// A failing task aborts the height; it is retried with the block on the next tick
    fn run_scheduled(&self, record: &BlockRecord) -> IndexerResult<()> {
        for task in &self.tasks {
            let acted = self.store.write(|tx| task.run(tx, record)).map_err(|e| {
                log::error!(
                    "❌ {} failed at height {}: {}",
                    task.name(),
                    record.block_number,
                    e
                );
                e
            })?;
            if acted > 0 {
                log::info!(
                    "⏰ {} acted on {} item(s) at height {}",
                    task.name(),
                    acted,
                    record.block_number
                );
            }
        }
        Ok(())
    }

    /// `None` when the transaction carries nothing for us, otherwise whether it was applied
    async fn process_transaction(
        &self,
        block: &BlockDetail,
        index: usize,
        raw: RawTransaction,
    ) -> IndexerResult<Option<bool>> {
        let inscription = match self.decoder.decode(&raw) {
            Ok(inscription) => inscription,
            Err(IndexerError::Decode(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if self.registry.get(&inscription.protocol).is_none() {
            log::debug!("   └─ {}: unknown protocol {:?}", raw.txid, inscription.protocol);
            return Ok(None);
        }
        let Some(holder) = raw.holder().map(str::to_string) else {
            return Ok(None);
        };

        let sender = first_input_address(self.reader.as_ref(), &raw).await?;
        let outputs = raw
            .vout
            .iter()
            .filter_map(|out| out.address().map(|addr| (addr.to_string(), out.amount())))
            .collect();

        let meta = OperationMeta {
            tx_hash: raw.txid.clone(),
            tx_index: index as u32,
            block_number: block.height,
            block_hash: block.hash.clone(),
            block_time: block.time,
            holder,
            sender,
            outputs,
        };

        let Some(handler) = self.registry.get(&inscription.protocol) else {
            return Ok(None);
        };
        let op = match handler.decode(&inscription, meta) {
            Ok(op) => op,
            Err(e) => {
                log::debug!("   └─ {}: undecodable {} payload: {}", raw.txid, inscription.protocol, e);
                return Ok(None);
            }
        };
        let record = op.record()?;

        let applied = self.store.write(|tx| {
            operations::insert_pending(tx, &record)?;
            handler.verify(tx, &op)?;
            let ledger = Ledger::new(tx, op.meta.ctx());
            let outputs = handler.apply(&ledger, &op)?;
            operations::mark_applied(tx, &op.meta.tx_hash, &outputs)?;
            Ok(())
        });

        match applied {
            Ok(()) => {
                log::debug!("✅ {} {} {}", op.protocol, op.op, op.meta.tx_hash);
                Ok(Some(true))
            }
            Err(e) if e.is_rejection() => {
                log::debug!("❌ {} {} {}: {}", op.protocol, op.op, op.meta.tx_hash, e);
                let reason = e.to_string();
                self.store.write(|tx| {
                    operations::insert_pending(tx, &record)?;
                    operations::mark_failed(tx, &record.tx_hash, &reason)
                })?;
                Ok(Some(false))
            }
            Err(e) => Err(e),
        }
    }
}
