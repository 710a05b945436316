use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::aggregate::Aggregator;
use crate::clock::Clock;
use crate::error::StatsError;
use crate::report::{ClientDumper, Reporter};

/// Cooperative stop signal shared by workers, signal handlers and the tick loop.
#[derive(Debug, Default)]
pub struct StopFlag {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Source of the current number of active virtual clients.
pub trait ClientGauge: Send + Sync {
    fn active_clients(&self) -> u64;
}

impl ClientGauge for AtomicU64 {
    fn active_clients(&self) -> u64 {
        self.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Finalizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The stop flag ended the run after the final report.
    Stopped,
}

/// Drives ticks until the stop flag is seen, then runs the final cycle once.
pub struct TickLoop {
    aggregator: Aggregator,
    reporter: Reporter,
    clock: Arc<dyn Clock>,
    stop: Arc<StopFlag>,
    clients: Arc<dyn ClientGauge>,
    dumper: Box<dyn ClientDumper + Send>,
    interval: Duration,
    state: LoopState,
}

impl TickLoop {
    pub fn new(
        aggregator: Aggregator,
        reporter: Reporter,
        clock: Arc<dyn Clock>,
        stop: Arc<StopFlag>,
        clients: Arc<dyn ClientGauge>,
        dumper: Box<dyn ClientDumper + Send>,
        interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            reporter,
            clock,
            stop,
            clients,
            dumper,
            interval,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Run one tick boundary: either a regular report or the final one.
    pub fn step(&mut self) -> Result<LoopState, StatsError> {
        if self.state == LoopState::Finalizing {
            return Ok(LoopState::Finalizing);
        }

        let now = self.clock.now_ms()?;
        let clients = self.clients.active_clients();

        if self.stop.is_set() {
            info!("stop requested, writing final statistics");
            self.state = LoopState::Finalizing;
            let snapshot = self.aggregator.finalize(now, clients);
            self.reporter.finish(&snapshot, self.dumper.as_ref());
        } else {
            let snapshot = self.aggregator.tick(now, clients);
            self.reporter.report(&snapshot);
        }

        Ok(self.state)
    }

    /// Tick every interval until the stop flag is raised.
    pub async fn run(mut self) -> Result<LoopExit, StatsError> {
        let stop = self.stop.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a tokio interval fires immediately
        ticker.tick().await;

        info!(interval_ms = self.interval.as_millis() as u64, "statistics loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.wait() => {}
            }

            if self.step()? == LoopState::Finalizing {
                return Ok(LoopExit::Stopped);
            }
        }
    }
}
