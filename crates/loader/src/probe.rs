use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server answered with this HTTP status
    Status(u16),
    Timeout,
    /// Connection, TLS or protocol failure without a status
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub latency_ms: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Trait for request adapters used by virtual clients
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + 'a>>;
}

/// Mock probe for dry runs: answers after a jittered delay with a fixed outcome mix
pub struct MockProbe {
    delay_ms: u64,
}

impl MockProbe {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Probe for MockProbe {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + 'a>> {
        Box::pin(async move {
            // ThreadRng is not Send, so draw everything before the first await
            let (outcome, latency_ms, body) = {
                let mut rng = rand::thread_rng();
                let roll: u32 = rng.gen_range(0..100);
                let outcome = match roll {
                    0..=89 => ProbeOutcome::Status(200),
                    90..=94 => ProbeOutcome::Status(404),
                    95..=97 => ProbeOutcome::Status(503),
                    98 => ProbeOutcome::Timeout,
                    _ => ProbeOutcome::Failed,
                };
                let jitter = rng.gen_range(0..=self.delay_ms / 2 + 1);
                (outcome, self.delay_ms + jitter, rng.gen_range(512..4096))
            };

            sleep(Duration::from_millis(latency_ms)).await;

            let bytes_in = match outcome {
                ProbeOutcome::Status(_) => body,
                _ => 0,
            };
            ProbeResult {
                outcome,
                latency_ms,
                bytes_in,
                bytes_out: request_size(url),
            }
        })
    }
}

/// Approximate size of a bare GET request line and Host header
fn request_size(url: &str) -> u64 {
    (url.len() + 32) as u64
}

/// HTTP(S) probe issuing plain GET requests
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self { client })
    }
}

impl Probe for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = ProbeResult> + Send + 'a>> {
        Box::pin(async move {
            let start = Instant::now();
            let bytes_out = request_size(url);

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    // Delay is measured to the full body, like an application would see it
                    let bytes_in = match response.bytes().await {
                        Ok(body) => body.len() as u64,
                        Err(_) => 0,
                    };
                    ProbeResult {
                        outcome: ProbeOutcome::Status(status),
                        latency_ms: start.elapsed().as_millis() as u64,
                        bytes_in,
                        bytes_out,
                    }
                }
                Err(e) => ProbeResult {
                    outcome: if e.is_timeout() {
                        ProbeOutcome::Timeout
                    } else {
                        ProbeOutcome::Failed
                    },
                    latency_ms: start.elapsed().as_millis() as u64,
                    bytes_in: 0,
                    bytes_out,
                },
            }
        })
    }
}
