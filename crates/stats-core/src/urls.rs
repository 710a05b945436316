use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::counters::ResponseClass;

/// Since-start latency and outcome statistics of one URL, as reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlStats {
    pub requests: u64,
    pub resp_1xx: u64,
    pub resp_2xx: u64,
    pub resp_3xx: u64,
    pub resp_4xx: u64,
    pub resp_5xx: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub last_ms: u64,
    pub avg_ms: u64,
    pub min_2xx_ms: u64,
    pub max_2xx_ms: u64,
    pub last_2xx_ms: u64,
    pub avg_2xx_ms: u64,
}

#[derive(Debug)]
struct LatencyCells {
    min: AtomicU64,
    max: AtomicU64,
    last: AtomicU64,
    sum: AtomicU64,
    samples: AtomicU64,
}

impl Default for LatencyCells {
    fn default() -> Self {
        Self {
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            last: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }
}

impl LatencyCells {
    fn record(&self, latency_ms: u64) {
        self.min.fetch_min(latency_ms, Ordering::Relaxed);
        self.max.fetch_max(latency_ms, Ordering::Relaxed);
        self.last.store(latency_ms, Ordering::Relaxed);
        self.sum.fetch_add(latency_ms, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// (min, max, last, avg); all zero before the first sample.
    fn read(&self) -> (u64, u64, u64, u64) {
        let samples = self.samples.load(Ordering::Relaxed);
        if samples == 0 {
            return (0, 0, 0, 0);
        }
        (
            self.min.load(Ordering::Relaxed),
            self.max.load(Ordering::Relaxed),
            self.last.load(Ordering::Relaxed),
            self.sum.load(Ordering::Relaxed) / samples,
        )
    }
}

/// Lock-free per-URL statistics shared by every worker.
#[derive(Debug, Default)]
pub struct UrlLatency {
    requests: AtomicU64,
    classes: [AtomicU64; 5],
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    all: LatencyCells,
    ok_2xx: LatencyCells,
}

impl UrlLatency {
    pub fn record_response(&self, class: ResponseClass, latency_ms: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let idx = match class {
            ResponseClass::Informational => 0,
            ResponseClass::Success => 1,
            ResponseClass::Redirect => 2,
            ResponseClass::ClientError => 3,
            ResponseClass::ServerError => 4,
        };
        self.classes[idx].fetch_add(1, Ordering::Relaxed);
        self.all.record(latency_ms);
        if class == ResponseClass::Success {
            self.ok_2xx.record(latency_ms);
        }
    }

    pub fn record_bytes(&self, bytes_in: u64, bytes_out: u64) {
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
    }

    pub fn stats(&self) -> UrlStats {
        let class = |i: usize| self.classes[i].load(Ordering::Relaxed);
        let (min_ms, max_ms, last_ms, avg_ms) = self.all.read();
        let (min_2xx_ms, max_2xx_ms, last_2xx_ms, avg_2xx_ms) = self.ok_2xx.read();

        UrlStats {
            requests: self.requests.load(Ordering::Relaxed),
            resp_1xx: class(0),
            resp_2xx: class(1),
            resp_3xx: class(2),
            resp_4xx: class(3),
            resp_5xx: class(4),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            min_ms,
            max_ms,
            last_ms,
            avg_ms,
            min_2xx_ms,
            max_2xx_ms,
            last_2xx_ms,
            avg_2xx_ms,
        }
    }
}

#[derive(Debug)]
pub struct UrlEntry {
    pub url: String,
    pub short_name: String,
    pub latency: UrlLatency,
}

/// Configured URLs in slot order. Operation counter slot `i` belongs to entry `i`.
#[derive(Debug, Default)]
pub struct UrlTable {
    entries: Vec<UrlEntry>,
}

impl UrlTable {
    pub fn new<I, U, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = (U, S)>,
        U: Into<String>,
        S: Into<String>,
    {
        let entries = urls
            .into_iter()
            .map(|(url, short_name)| UrlEntry {
                url: url.into(),
                short_name: short_name.into(),
                latency: UrlLatency::default(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&UrlEntry> {
        self.entries.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UrlEntry> {
        self.entries.iter()
    }
}
