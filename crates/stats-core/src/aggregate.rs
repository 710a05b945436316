use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::counters::{CounterBlock, MergeOutcome, OperationCounters, Protocol, ProtocolCounters};
use crate::error::StatsError;
use crate::urls::{UrlStats, UrlTable};
use crate::worker::WorkerCounters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnapshotKind {
    Interval,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolPair {
    pub protocol: Protocol,
    pub delta: ProtocolCounters,
    pub total: ProtocolCounters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRow {
    pub url: String,
    pub short_name: String,
    pub stats: UrlStats,
}

/// One consistent view of the run, produced by a tick or by finalization.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub timestamp_ms: u64,
    /// Time since the aggregator was created.
    pub elapsed_ms: u64,
    /// Time covered by the deltas; never zero.
    pub period_ms: u64,
    pub active_clients: u64,
    pub protocols: Vec<ProtocolPair>,
    pub operations_delta: OperationCounters,
    pub operations_total: OperationCounters,
    pub urls: Vec<UrlRow>,
}

impl Snapshot {
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_ms / 1000
    }

    pub fn protocol(&self, protocol: Protocol) -> Option<&ProtocolPair> {
        self.protocols.iter().find(|p| p.protocol == protocol)
    }

    /// Totals of every protocol family folded together.
    pub fn combined_total(&self) -> ProtocolCounters {
        let mut combined = ProtocolCounters::new();
        for pair in &self.protocols {
            combined.merge(&pair.total);
        }
        combined
    }
}

/// Owner of the process-wide delta and total counters.
///
/// Lifecycle is `new`, any number of [`tick`](Self::tick) calls, then
/// [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct Aggregator {
    start_ms: u64,
    last_tick_ms: u64,
    urls: Arc<UrlTable>,
    workers: Vec<Arc<WorkerCounters>>,
    protocol_delta: [ProtocolCounters; 2],
    protocol_total: [ProtocolCounters; 2],
    operations_delta: OperationCounters,
    operations_total: OperationCounters,
    ticks: u64,
    finalized: bool,
}

impl Aggregator {
    pub fn new(start_ms: u64, urls: Arc<UrlTable>) -> Result<Self, StatsError> {
        let slots = urls.len();
        Ok(Self {
            start_ms,
            last_tick_ms: start_ms,
            urls,
            workers: Vec::new(),
            protocol_delta: Default::default(),
            protocol_total: Default::default(),
            operations_delta: OperationCounters::new(slots)?,
            operations_total: OperationCounters::new(slots)?,
            ticks: 0,
            finalized: false,
        })
    }

    /// Create counters for a new worker, sized to the URL table, and register them.
    pub fn add_worker(&mut self) -> Result<Arc<WorkerCounters>, StatsError> {
        let worker = Arc::new(WorkerCounters::new(self.workers.len(), self.urls.len())?);
        self.workers.push(worker.clone());
        Ok(worker)
    }

    /// Register counters built elsewhere.
    pub fn register(&mut self, worker: Arc<WorkerCounters>) {
        self.workers.push(worker);
    }

    pub fn workers(&self) -> &[Arc<WorkerCounters>] {
        &self.workers
    }

    pub fn urls(&self) -> &Arc<UrlTable> {
        &self.urls
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn last_tick_ms(&self) -> u64 {
        self.last_tick_ms
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn total(&self, protocol: Protocol) -> &ProtocolCounters {
        &self.protocol_total[protocol.index()]
    }

    pub fn operations_total(&self) -> &OperationCounters {
        &self.operations_total
    }

    /// Drain all workers, advance the totals and snapshot the result.
    pub fn tick(&mut self, now_ms: u64, active_clients: u64) -> Snapshot {
        self.ticks += 1;
        self.collect(now_ms, active_clients, SnapshotKind::Interval)
    }

    /// Final drain, run regardless of how little time passed since the last tick.
    pub fn finalize(&mut self, now_ms: u64, active_clients: u64) -> Snapshot {
        self.finalized = true;
        self.collect(now_ms, active_clients, SnapshotKind::Final)
    }

    fn collect(&mut self, now_ms: u64, active_clients: u64, kind: SnapshotKind) -> Snapshot {
        let period_ms = now_ms.saturating_sub(self.last_tick_ms).max(1);

        self.collect_operations();
        for protocol in Protocol::ALL {
            self.collect_protocol(protocol);
        }

        self.last_tick_ms = now_ms;

        let snapshot = Snapshot {
            kind,
            timestamp_ms: now_ms,
            elapsed_ms: now_ms.saturating_sub(self.start_ms),
            period_ms,
            active_clients,
            protocols: Protocol::ALL
                .iter()
                .map(|&protocol| ProtocolPair {
                    protocol,
                    delta: self.protocol_delta[protocol.index()].clone(),
                    total: self.protocol_total[protocol.index()].clone(),
                })
                .collect(),
            operations_delta: self.operations_delta.clone(),
            operations_total: self.operations_total.clone(),
            urls: self
                .urls
                .iter()
                .map(|entry| UrlRow {
                    url: entry.url.clone(),
                    short_name: entry.short_name.clone(),
                    stats: entry.latency.stats(),
                })
                .collect(),
        };

        self.operations_delta.reset();
        for delta in &mut self.protocol_delta {
            delta.reset();
        }

        debug!(
            kind = ?snapshot.kind,
            period_ms,
            elapsed_ms = snapshot.elapsed_ms,
            "collected statistics snapshot"
        );
        snapshot
    }

    fn collect_operations(&mut self) {
        for worker in &self.workers {
            let drained = worker.drain_operations();
            let outcome = self.operations_delta.merge(&drained);
            if let MergeOutcome::SlotMismatch { left, right } = outcome {
                warn!(
                    worker = worker.id(),
                    expected = left,
                    got = right,
                    "dropping operation counters built for a different URL table"
                );
            }
        }
        self.operations_total.merge(&self.operations_delta);
    }

    fn collect_protocol(&mut self, protocol: Protocol) {
        let delta = &mut self.protocol_delta[protocol.index()];
        for worker in &self.workers {
            delta.merge(&worker.drain_protocol(protocol));
        }
        self.protocol_total[protocol.index()].merge(delta);
    }
}
