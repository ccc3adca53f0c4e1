//! Periodic update passes over every registered source.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::service::SourceService;

/// Configuration for the poll scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    /// Whether the scheduler runs at all; pokes still work when it doesn't.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Interval between passes.
    #[serde(default = "default_interval", with = "fontwatch_core::serde_secs")]
    pub interval: Duration,

    /// Consecutive failed rounds before backing off.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_backoff", with = "fontwatch_core::serde_secs")]
    pub max_backoff: Duration,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_max_failures() -> u32 {
    3
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(4 * 60 * 60)
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval: default_interval(),
            max_failures: default_max_failures(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// Stops the scheduler when dropped.
pub struct PollHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl PollHandle {
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pokes every source on an interval, backing off while rounds fail.
pub struct PollScheduler {
    service: SourceService,
    config: PollConfig,
    failures: u32,
    current: Duration,
}

impl PollScheduler {
    pub fn new(service: SourceService, mut config: PollConfig) -> Self {
        // tokio intervals must be non-zero.
        config.interval = config.interval.max(Duration::from_secs(1));
        Self {
            service,
            current: config.interval,
            config,
            failures: 0,
        }
    }

    /// Spawns the loop; the first round runs immediately.
    pub fn start(self) -> PollHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(self.run(shutdown_rx));
        PollHandle { shutdown_tx }
    }

    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut timer = interval(self.current);
        info!(interval = ?self.current, "poll scheduler started");

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.round().await;
                    if self.current != timer.period() {
                        timer = interval(self.current);
                        // A fresh interval ticks at once; skip that tick.
                        timer.tick().await;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("poll scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Runs one round over all sources. Returns whether every pass succeeded.
    pub async fn round(&mut self) -> bool {
        debug!("poll round started");
        let ok = match self.service.poke("", false) {
            Ok(pending) => SourceService::settle(pending).await.iter().all(|r| r.is_ok()),
            Err(e) => {
                warn!(error = %e, "can't schedule poll round");
                false
            },
        };
        self.record(ok);
        ok
    }

    fn record(&mut self, ok: bool) {
        if ok {
            self.failures = 0;
            self.current = self.config.interval;
            return;
        }

        self.failures += 1;
        if self.failures >= self.config.max_failures {
            let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.config.backoff_multiplier);
            self.current = next.min(self.config.max_backoff);
            warn!(failures = self.failures, next = ?self.current, "poll rounds failing, backing off");
        }
    }

    /// Interval until the next round.
    pub fn current_interval(&self) -> Duration {
        self.current
    }
}
