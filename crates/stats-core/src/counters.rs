use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Protocol family a request was sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Every family, in reporting order.
    pub const ALL: [Protocol; 2] = [Protocol::Http, Protocol::Https];

    /// Fixed-width tag used in console lines and statistics file rows.
    pub fn label(self) -> &'static str {
        match self {
            Protocol::Http => "H/F   ",
            Protocol::Https => "H/F/S ",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Protocol::Http => 0,
            Protocol::Https => 1,
        }
    }
}

/// HTTP response class of a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl ResponseClass {
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            100..=199 => Some(Self::Informational),
            200..=299 => Some(Self::Success),
            300..=399 => Some(Self::Redirect),
            400..=499 => Some(Self::ClientError),
            500..=599 => Some(Self::ServerError),
            _ => None,
        }
    }
}

/// Result of merging one counter block into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// Operation blocks built for different URL tables; `left` was left untouched.
    SlotMismatch { left: usize, right: usize },
    /// One side of the merge was missing.
    Absent,
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged)
    }
}

/// A block of counters that can be folded into another of its kind and zeroed.
pub trait CounterBlock {
    /// Fold `other` into `self`.
    fn merge(&mut self, other: &Self) -> MergeOutcome;

    /// Zero every counter, keeping fixed capacity.
    fn reset(&mut self);
}

/// Merge where either side may be missing. A missing side is a no-op.
pub fn merge_optional<C: CounterBlock>(left: Option<&mut C>, right: Option<&C>) -> MergeOutcome {
    match (left, right) {
        (Some(left), Some(right)) => left.merge(right),
        _ => MergeOutcome::Absent,
    }
}

pub fn reset_optional<C: CounterBlock>(block: Option<&mut C>) {
    if let Some(block) = block {
        block.reset();
    }
}

/// Combine two running averages by their sample counts. Zero samples give zero.
pub fn weighted_average(
    left_avg: f64,
    left_samples: u64,
    right_avg: f64,
    right_samples: u64,
) -> f64 {
    let samples = left_samples as f64 + right_samples as f64;
    if samples == 0.0 {
        return 0.0;
    }
    (left_avg * left_samples as f64 + right_avg * right_samples as f64) / samples
}

/// Request, response-class, byte and latency counters for one protocol family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolCounters {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub requests: u64,
    pub resp_1xx: u64,
    pub resp_2xx: u64,
    pub resp_3xx: u64,
    pub resp_4xx: u64,
    pub resp_5xx: u64,
    pub other_errors: u64,
    pub timeout_errors: u64,
    /// Mean application delay in milliseconds, unrounded.
    pub app_delay_avg: f64,
    pub app_delay_samples: u64,
    pub app_delay_2xx_avg: f64,
    pub app_delay_2xx_samples: u64,
}

impl ProtocolCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Mean delay in whole milliseconds, as reported.
    pub fn delay_ms(&self) -> u64 {
        self.app_delay_avg as u64
    }

    pub fn delay_2xx_ms(&self) -> u64 {
        self.app_delay_2xx_avg as u64
    }
}

impl CounterBlock for ProtocolCounters {
    fn merge(&mut self, other: &Self) -> MergeOutcome {
        self.bytes_in += other.bytes_in;
        self.bytes_out += other.bytes_out;
        self.requests += other.requests;
        self.resp_1xx += other.resp_1xx;
        self.resp_2xx += other.resp_2xx;
        self.resp_3xx += other.resp_3xx;
        self.resp_4xx += other.resp_4xx;
        self.resp_5xx += other.resp_5xx;
        self.other_errors += other.other_errors;
        self.timeout_errors += other.timeout_errors;

        self.app_delay_avg = weighted_average(
            self.app_delay_avg,
            self.app_delay_samples,
            other.app_delay_avg,
            other.app_delay_samples,
        );
        self.app_delay_samples += other.app_delay_samples;

        self.app_delay_2xx_avg = weighted_average(
            self.app_delay_2xx_avg,
            self.app_delay_2xx_samples,
            other.app_delay_2xx_avg,
            other.app_delay_2xx_samples,
        );
        self.app_delay_2xx_samples += other.app_delay_2xx_samples;

        MergeOutcome::Merged
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-URL outcome counters plus the session-start count.
///
/// Slot `i` refers to entry `i` of the URL table the block was built for. The slot
/// count never changes after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounters {
    pub url_ok: Vec<u64>,
    pub url_failed: Vec<u64>,
    pub url_timed_out: Vec<u64>,
    pub sessions_started: u64,
}

impl OperationCounters {
    pub fn new(url_count: usize) -> Result<Self, StatsError> {
        Ok(Self {
            url_ok: zeroed_slots(url_count)?,
            url_failed: zeroed_slots(url_count)?,
            url_timed_out: zeroed_slots(url_count)?,
            sessions_started: 0,
        })
    }

    pub fn slots(&self) -> usize {
        self.url_ok.len()
    }
}

fn zeroed_slots(count: usize) -> Result<Vec<u64>, StatsError> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(count)
        .map_err(|_| StatsError::Allocation { slots: count })?;
    slots.resize(count, 0);
    Ok(slots)
}

impl CounterBlock for OperationCounters {
    fn merge(&mut self, other: &Self) -> MergeOutcome {
        if self.slots() != other.slots() {
            return MergeOutcome::SlotMismatch {
                left: self.slots(),
                right: other.slots(),
            };
        }

        for (dst, src) in self.url_ok.iter_mut().zip(&other.url_ok) {
            *dst += src;
        }
        for (dst, src) in self.url_failed.iter_mut().zip(&other.url_failed) {
            *dst += src;
        }
        for (dst, src) in self.url_timed_out.iter_mut().zip(&other.url_timed_out) {
            *dst += src;
        }
        self.sessions_started += other.sessions_started;

        MergeOutcome::Merged
    }

    fn reset(&mut self) {
        self.url_ok.fill(0);
        self.url_failed.fill(0);
        self.url_timed_out.fill(0);
        self.sessions_started = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(requests: u64, avg: u64, samples: u64) -> ProtocolCounters {
        ProtocolCounters {
            bytes_in: requests * 100,
            bytes_out: requests * 10,
            requests,
            resp_1xx: 1,
            resp_2xx: requests.saturating_sub(3),
            resp_3xx: 1,
            resp_4xx: 1,
            resp_5xx: 0,
            other_errors: 2,
            timeout_errors: 1,
            app_delay_avg: avg as f64,
            app_delay_samples: samples,
            app_delay_2xx_avg: (avg / 2) as f64,
            app_delay_2xx_samples: samples / 2,
        }
    }

    #[test]
    fn test_merge_sums_counters() {
        let a = block(10, 100, 10);
        let b = block(7, 40, 5);
        let mut merged = a.clone();
        assert_eq!(merged.merge(&b), MergeOutcome::Merged);

        assert_eq!(merged.requests, a.requests + b.requests);
        assert_eq!(merged.bytes_in, a.bytes_in + b.bytes_in);
        assert_eq!(merged.bytes_out, a.bytes_out + b.bytes_out);
        assert_eq!(merged.resp_1xx, a.resp_1xx + b.resp_1xx);
        assert_eq!(merged.resp_2xx, a.resp_2xx + b.resp_2xx);
        assert_eq!(merged.resp_3xx, a.resp_3xx + b.resp_3xx);
        assert_eq!(merged.resp_4xx, a.resp_4xx + b.resp_4xx);
        assert_eq!(merged.resp_5xx, a.resp_5xx + b.resp_5xx);
        assert_eq!(merged.other_errors, a.other_errors + b.other_errors);
        assert_eq!(merged.timeout_errors, a.timeout_errors + b.timeout_errors);
    }

    #[test]
    fn test_merge_weights_averages() {
        let mut a = block(10, 100, 10);
        let b = block(10, 40, 30);
        a.merge(&b);

        assert_eq!(a.app_delay_samples, 40);
        assert_eq!(a.app_delay_avg, 55.0);
        assert_eq!(a.app_delay_2xx_samples, 5 + 15);
        assert_eq!(a.app_delay_2xx_avg, 27.5);
        assert_eq!(a.delay_2xx_ms(), 27);
    }

    #[test]
    fn test_merge_zero_samples_forces_zero_average() {
        let mut a = ProtocolCounters {
            app_delay_avg: 77.0,
            app_delay_2xx_avg: 33.0,
            ..Default::default()
        };
        a.merge(&ProtocolCounters::default());
        assert_eq!(a.app_delay_avg, 0.0);
        assert_eq!(a.app_delay_2xx_avg, 0.0);
    }

    #[test]
    fn test_merge_is_associative() {
        let a = block(10, 100, 10);
        let b = block(4, 250, 3);
        let c = block(9, 10, 7);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        assert_eq!(left.requests, right.requests);
        assert_eq!(left.bytes_in, right.bytes_in);
        assert_eq!(left.app_delay_samples, right.app_delay_samples);
        assert!((left.app_delay_avg - right.app_delay_avg).abs() < 1e-9);
        assert!((left.app_delay_2xx_avg - right.app_delay_2xx_avg).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_average_large_values() {
        let avg = weighted_average(250.0, u64::MAX / 2, 250.0, u64::MAX / 2);
        assert!((avg - 250.0).abs() < 1e-9);
        assert_eq!(weighted_average(0.0, 0, 0.0, 0), 0.0);
        assert_eq!(weighted_average(10.0, 1, 0.0, 0), 10.0);
    }

    #[test]
    fn test_repeated_folds_keep_raw_mean() {
        let mut total = ProtocolCounters::new();
        let mut raw_sum = 0u64;
        let mut raw_samples = 0u64;

        for tick in 0..2_000u64 {
            let latencies: Vec<u64> = (0..7).map(|i| (tick * 7 + i) * 7919 % 1000 + 1).collect();
            let sum: u64 = latencies.iter().sum();
            let delta = ProtocolCounters {
                requests: 7,
                app_delay_avg: sum as f64 / 7.0,
                app_delay_samples: 7,
                ..Default::default()
            };
            total.merge(&delta);
            raw_sum += sum;
            raw_samples += 7;
        }

        assert_eq!(total.app_delay_samples, raw_samples);
        assert!(total.delay_ms().abs_diff(raw_sum / raw_samples) <= 1);
    }

    #[test]
    fn test_protocol_reset() {
        let mut a = block(10, 100, 10);
        a.reset();
        assert!(a.is_empty());
    }

    #[test]
    fn test_operation_merge_and_reset() {
        let mut left = OperationCounters::new(3).unwrap();
        let mut right = OperationCounters::new(3).unwrap();
        right.url_ok = vec![1, 2, 3];
        right.url_failed = vec![0, 1, 0];
        right.url_timed_out = vec![0, 0, 4];
        right.sessions_started = 5;

        assert!(left.merge(&right).is_merged());
        assert!(left.merge(&right).is_merged());
        assert_eq!(left.url_ok, vec![2, 4, 6]);
        assert_eq!(left.url_failed, vec![0, 2, 0]);
        assert_eq!(left.url_timed_out, vec![0, 0, 8]);
        assert_eq!(left.sessions_started, 10);

        left.reset();
        assert_eq!(left.slots(), 3);
        assert_eq!(left.url_ok, vec![0, 0, 0]);
        assert_eq!(left.sessions_started, 0);
    }

    #[test]
    fn test_operation_merge_slot_mismatch_is_noop() {
        let mut left = OperationCounters::new(2).unwrap();
        left.url_ok = vec![1, 1];
        let before = left.clone();

        let mut right = OperationCounters::new(3).unwrap();
        right.url_ok = vec![5, 5, 5];
        right.sessions_started = 9;

        assert_eq!(
            left.merge(&right),
            MergeOutcome::SlotMismatch { left: 2, right: 3 }
        );
        assert_eq!(left, before);
    }

    #[test]
    fn test_merge_optional_absent() {
        let mut left = ProtocolCounters::new();
        let right = block(3, 1, 1);
        assert_eq!(merge_optional(Some(&mut left), None), MergeOutcome::Absent);
        assert_eq!(merge_optional::<ProtocolCounters>(None, Some(&right)), MergeOutcome::Absent);
        assert!(left.is_empty());

        reset_optional::<ProtocolCounters>(None);
    }

    #[test]
    fn test_response_class_from_status() {
        assert_eq!(ResponseClass::from_status(204), Some(ResponseClass::Success));
        assert_eq!(ResponseClass::from_status(503), Some(ResponseClass::ServerError));
        assert_eq!(ResponseClass::from_status(99), None);
        assert_eq!(ResponseClass::from_status(600), None);
    }
}
