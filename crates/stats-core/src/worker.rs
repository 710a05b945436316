use std::sync::atomic::{AtomicU64, Ordering};

use crate::counters::{OperationCounters, Protocol, ProtocolCounters, ResponseClass};
use crate::error::StatsError;

#[derive(Debug, Default)]
struct ProtocolCells {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    requests: AtomicU64,
    resp_1xx: AtomicU64,
    resp_2xx: AtomicU64,
    resp_3xx: AtomicU64,
    resp_4xx: AtomicU64,
    resp_5xx: AtomicU64,
    other_errors: AtomicU64,
    timeout_errors: AtomicU64,
    delay_sum_ms: AtomicU64,
    delay_samples: AtomicU64,
    delay_2xx_sum_ms: AtomicU64,
    delay_2xx_samples: AtomicU64,
}

impl ProtocolCells {
    fn drain(&self) -> ProtocolCounters {
        let take = |cell: &AtomicU64| cell.swap(0, Ordering::Relaxed);

        let delay_sum = take(&self.delay_sum_ms);
        let delay_samples = take(&self.delay_samples);
        let delay_2xx_sum = take(&self.delay_2xx_sum_ms);
        let delay_2xx_samples = take(&self.delay_2xx_samples);

        ProtocolCounters {
            bytes_in: take(&self.bytes_in),
            bytes_out: take(&self.bytes_out),
            requests: take(&self.requests),
            resp_1xx: take(&self.resp_1xx),
            resp_2xx: take(&self.resp_2xx),
            resp_3xx: take(&self.resp_3xx),
            resp_4xx: take(&self.resp_4xx),
            resp_5xx: take(&self.resp_5xx),
            other_errors: take(&self.other_errors),
            timeout_errors: take(&self.timeout_errors),
            app_delay_avg: average(delay_sum, delay_samples),
            app_delay_samples: delay_samples,
            app_delay_2xx_avg: average(delay_2xx_sum, delay_2xx_samples),
            app_delay_2xx_samples: delay_2xx_samples,
        }
    }
}

fn average(sum: u64, samples: u64) -> f64 {
    if samples == 0 {
        0.0
    } else {
        sum as f64 / samples as f64
    }
}

#[derive(Debug)]
struct OperationCells {
    url_ok: Vec<AtomicU64>,
    url_failed: Vec<AtomicU64>,
    url_timed_out: Vec<AtomicU64>,
    sessions_started: AtomicU64,
}

impl OperationCells {
    fn new(url_count: usize) -> Result<Self, StatsError> {
        Ok(Self {
            url_ok: atomic_slots(url_count)?,
            url_failed: atomic_slots(url_count)?,
            url_timed_out: atomic_slots(url_count)?,
            sessions_started: AtomicU64::new(0),
        })
    }

    fn drain(&self) -> OperationCounters {
        OperationCounters {
            url_ok: take_all(&self.url_ok),
            url_failed: take_all(&self.url_failed),
            url_timed_out: take_all(&self.url_timed_out),
            sessions_started: self.sessions_started.swap(0, Ordering::Relaxed),
        }
    }
}

fn take_all(cells: &[AtomicU64]) -> Vec<u64> {
    cells.iter().map(|c| c.swap(0, Ordering::Relaxed)).collect()
}

fn atomic_slots(count: usize) -> Result<Vec<AtomicU64>, StatsError> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(count)
        .map_err(|_| StatsError::Allocation { slots: count })?;
    slots.extend((0..count).map(|_| AtomicU64::new(0)));
    Ok(slots)
}

/// Delta counters of one worker since the coordinator last drained them.
///
/// The owning worker is the only writer; `drain_*` swaps every cell with zero.
#[derive(Debug)]
pub struct WorkerCounters {
    id: usize,
    protocols: [ProtocolCells; 2],
    operations: OperationCells,
}

impl WorkerCounters {
    pub fn new(id: usize, url_count: usize) -> Result<Self, StatsError> {
        Ok(Self {
            id,
            protocols: Default::default(),
            operations: OperationCells::new(url_count)?,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn url_slots(&self) -> usize {
        self.operations.url_ok.len()
    }

    fn cells(&self, protocol: Protocol) -> &ProtocolCells {
        &self.protocols[protocol.index()]
    }

    /// Count a request that completed with an HTTP status.
    pub fn record_response(&self, protocol: Protocol, class: ResponseClass, latency_ms: u64) {
        let cells = self.cells(protocol);
        cells.requests.fetch_add(1, Ordering::Relaxed);

        let counter = match class {
            ResponseClass::Informational => &cells.resp_1xx,
            ResponseClass::Success => &cells.resp_2xx,
            ResponseClass::Redirect => &cells.resp_3xx,
            ResponseClass::ClientError => &cells.resp_4xx,
            ResponseClass::ServerError => &cells.resp_5xx,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        cells.delay_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        cells.delay_samples.fetch_add(1, Ordering::Relaxed);
        if class == ResponseClass::Success {
            cells.delay_2xx_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
            cells.delay_2xx_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a request that failed without an HTTP status.
    pub fn record_error(&self, protocol: Protocol) {
        let cells = self.cells(protocol);
        cells.requests.fetch_add(1, Ordering::Relaxed);
        cells.other_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self, protocol: Protocol) {
        let cells = self.cells(protocol);
        cells.requests.fetch_add(1, Ordering::Relaxed);
        cells.timeout_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, protocol: Protocol, bytes_in: u64, bytes_out: u64) {
        let cells = self.cells(protocol);
        cells.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        cells.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
    }

    // Out-of-range slots are dropped, like every other counter fault.

    pub fn record_url_ok(&self, slot: usize) {
        if let Some(cell) = self.operations.url_ok.get(slot) {
            cell.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_url_failed(&self, slot: usize) {
        if let Some(cell) = self.operations.url_failed.get(slot) {
            cell.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_url_timeout(&self, slot: usize) {
        if let Some(cell) = self.operations.url_timed_out.get(slot) {
            cell.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_session_started(&self) {
        self.operations
            .sessions_started
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Take this worker's protocol delta, leaving zeros behind.
    pub fn drain_protocol(&self, protocol: Protocol) -> ProtocolCounters {
        self.cells(protocol).drain()
    }

    /// Take this worker's operation delta, leaving zeros behind.
    pub fn drain_operations(&self) -> OperationCounters {
        self.operations.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_drain() {
        let worker = WorkerCounters::new(3, 2).unwrap();
        assert_eq!(worker.id(), 3);

        worker.record_response(Protocol::Http, ResponseClass::Success, 10);
        worker.record_response(Protocol::Http, ResponseClass::Success, 20);
        worker.record_response(Protocol::Http, ResponseClass::ServerError, 90);
        worker.record_error(Protocol::Http);
        worker.record_timeout(Protocol::Https);
        worker.record_bytes(Protocol::Http, 1000, 200);

        let http = worker.drain_protocol(Protocol::Http);
        assert_eq!(http.requests, 4);
        assert_eq!(http.resp_2xx, 2);
        assert_eq!(http.resp_5xx, 1);
        assert_eq!(http.other_errors, 1);
        assert_eq!(http.bytes_in, 1000);
        assert_eq!(http.bytes_out, 200);
        assert_eq!(http.app_delay_samples, 3);
        assert_eq!(http.app_delay_avg, 40.0);
        assert_eq!(http.app_delay_2xx_samples, 2);
        assert_eq!(http.app_delay_2xx_avg, 15.0);

        let https = worker.drain_protocol(Protocol::Https);
        assert_eq!(https.requests, 1);
        assert_eq!(https.timeout_errors, 1);
        assert_eq!(https.app_delay_avg, 0.0);

        assert!(worker.drain_protocol(Protocol::Http).is_empty());
    }

    #[test]
    fn test_operation_slots() {
        let worker = WorkerCounters::new(0, 2).unwrap();
        worker.record_url_ok(0);
        worker.record_url_ok(0);
        worker.record_url_failed(1);
        worker.record_url_timeout(1);
        worker.record_url_ok(7);
        worker.record_session_started();

        let ops = worker.drain_operations();
        assert_eq!(ops.url_ok, vec![2, 0]);
        assert_eq!(ops.url_failed, vec![0, 1]);
        assert_eq!(ops.url_timed_out, vec![0, 1]);
        assert_eq!(ops.sessions_started, 1);

        let ops = worker.drain_operations();
        assert_eq!(ops.slots(), 2);
        assert_eq!(ops.url_ok, vec![0, 0]);
        assert_eq!(ops.sessions_started, 0);
    }

    #[test]
    fn test_concurrent_recording_is_not_lost() {
        let worker = std::sync::Arc::new(WorkerCounters::new(0, 1).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let worker = worker.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        worker.record_response(Protocol::Https, ResponseClass::Success, 5);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let https = worker.drain_protocol(Protocol::Https);
        assert_eq!(https.requests, 4000);
        assert_eq!(https.app_delay_avg, 5.0);
    }
}
