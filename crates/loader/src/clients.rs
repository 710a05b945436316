use stats_core::{ClientDumper, Protocol, ResponseClass, StopFlag, UrlTable, WorkerCounters};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::probe::{Probe, ProbeOutcome, ProbeResult};

#[derive(Debug, Default)]
struct ClientSlot {
    worker: AtomicU64,
    cycles: AtomicU64,
    requests: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    last_status: AtomicU64,
    last_latency_ms: AtomicU64,
}

/// Per-virtual-client bookkeeping, dumped to `<batch>.ctx` at shutdown.
#[derive(Debug, Clone)]
pub struct ClientTable {
    slots: Arc<Vec<ClientSlot>>,
}

impl ClientTable {
    pub fn new(clients: usize) -> Self {
        Self {
            slots: Arc::new((0..clients).map(|_| ClientSlot::default()).collect()),
        }
    }

    fn record(&self, slot: usize, result: &ProbeResult) {
        let Some(s) = self.slots.get(slot) else {
            return;
        };
        s.requests.fetch_add(1, Ordering::Relaxed);
        s.last_latency_ms.store(result.latency_ms, Ordering::Relaxed);
        match result.outcome {
            ProbeOutcome::Status(code) => {
                s.last_status.store(code as u64, Ordering::Relaxed);
                if code >= 400 {
                    s.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            ProbeOutcome::Timeout => {
                s.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            ProbeOutcome::Failed => {
                s.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl ClientDumper for ClientTable {
    fn client_slots(&self) -> usize {
        self.slots.len()
    }

    fn dump_client(&self, slot: usize, out: &mut dyn Write) -> io::Result<()> {
        let Some(s) = self.slots.get(slot) else {
            return Ok(());
        };
        let load = |cell: &AtomicU64| cell.load(Ordering::Relaxed);
        writeln!(
            out,
            "{} worker:{} cycles:{} req:{} failed:{} timed-out:{} last-status:{} last-delay:{}ms",
            slot,
            load(&s.worker),
            load(&s.cycles),
            load(&s.requests),
            load(&s.failed),
            load(&s.timed_out),
            load(&s.last_status),
            load(&s.last_latency_ms),
        )
    }
}

/// Clients assigned to `worker_idx` when `total` are spread over `workers`
pub fn split_clients(total: u64, workers: usize, worker_idx: usize) -> u64 {
    if workers == 0 {
        return 0;
    }
    let base = total / workers as u64;
    let rem = total % workers as u64;
    if (worker_idx as u64) < rem {
        base.saturating_add(1)
    } else {
        base
    }
}

fn protocol_of(url: &str) -> Protocol {
    if url.starts_with("https://") {
        Protocol::Https
    } else {
        Protocol::Http
    }
}

/// Everything a virtual client needs, shared across the clients of one worker
#[derive(Clone)]
pub struct ClientContext {
    pub worker: Arc<WorkerCounters>,
    pub urls: Arc<UrlTable>,
    pub probe: Arc<dyn Probe>,
    pub stop: Arc<StopFlag>,
    pub clients: ClientTable,
    pub active: Arc<AtomicU64>,
}

/// Drive one virtual client through the URL table until the stop flag is raised.
pub async fn run_client(slot: usize, ctx: ClientContext) {
    ctx.active.fetch_add(1, Ordering::Relaxed);
    if let Some(s) = ctx.clients.slots.get(slot) {
        s.worker.store(ctx.worker.id() as u64, Ordering::Relaxed);
    }
    ctx.worker.record_session_started();

    'cycle: while !ctx.stop.is_set() {
        for (idx, entry) in ctx.urls.iter().enumerate() {
            if ctx.stop.is_set() {
                break 'cycle;
            }

            let protocol = protocol_of(&entry.url);
            let result = ctx.probe.fetch(&entry.url).await;

            ctx.worker
                .record_bytes(protocol, result.bytes_in, result.bytes_out);
            entry.latency.record_bytes(result.bytes_in, result.bytes_out);

            match result.outcome {
                ProbeOutcome::Status(code) => match ResponseClass::from_status(code) {
                    Some(class) => {
                        ctx.worker.record_response(protocol, class, result.latency_ms);
                        entry.latency.record_response(class, result.latency_ms);
                        match class {
                            ResponseClass::ClientError | ResponseClass::ServerError => {
                                ctx.worker.record_url_failed(idx)
                            }
                            _ => ctx.worker.record_url_ok(idx),
                        }
                    }
                    None => {
                        ctx.worker.record_error(protocol);
                        ctx.worker.record_url_failed(idx);
                    }
                },
                ProbeOutcome::Timeout => {
                    ctx.worker.record_timeout(protocol);
                    ctx.worker.record_url_timeout(idx);
                }
                ProbeOutcome::Failed => {
                    ctx.worker.record_error(protocol);
                    ctx.worker.record_url_failed(idx);
                }
            }

            ctx.clients.record(slot, &result);
        }

        if let Some(s) = ctx.clients.slots.get(slot) {
            s.cycles.fetch_add(1, Ordering::Relaxed);
        }
    }

    ctx.active.fetch_sub(1, Ordering::Relaxed);
    debug!(slot, worker = ctx.worker.id(), "virtual client stopped");
}
