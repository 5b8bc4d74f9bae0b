//! Resource Supervisor
//!
//! Polls CPU/RAM usage on a fixed interval, classifies it into a throttling
//! level and publishes the result to the state store.

use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use crate::agent::context::ComponentContext;
use crate::agent::metrics::MetricsSource;
use crate::agent::state::StateUpdate;
use crate::agent::throttle::{classify, ThrottleLevel, ThrottleThresholds};

/// Default polling interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub struct ResourceSupervisor<M: MetricsSource> {
    ctx: ComponentContext,
    metrics: M,
    thresholds: ThrottleThresholds,
    interval: Duration,
    level: ThrottleLevel,
}

impl<M: MetricsSource> ResourceSupervisor<M> {
    pub fn new(ctx: ComponentContext, metrics: M, thresholds: ThrottleThresholds) -> Self {
        let level = ctx.state().throttling_level();
        Self {
            ctx,
            metrics,
            thresholds,
            interval: DEFAULT_CHECK_INTERVAL,
            level,
        }
    }

    /// Set the polling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn thresholds(&self) -> &ThrottleThresholds {
        &self.thresholds
    }

    /// Last level published by this supervisor
    pub fn level(&self) -> ThrottleLevel {
        self.level
    }

    /// Run until the shutdown token is cancelled
    pub async fn run(mut self) {
        let span = self.ctx.span();
        async move {
            info!(
                interval_ms = self.interval.as_millis() as u64,
                cpu_limit = self.thresholds.cpu.base,
                ram_limit = self.thresholds.ram.base,
                "Resource supervisor started"
            );

            let shutdown = self.ctx.shutdown().clone();
            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                self.poll_once();

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }

            info!("Resource supervisor stopped");
        }
        .instrument(span)
        .await
    }

    /// One sample → classify → publish cycle.
    /// Returns the published level, or `None` when the metrics read failed.
    pub fn poll_once(&mut self) -> Option<ThrottleLevel> {
        let sample = match self.metrics.sample() {
            Ok(sample) => sample,
            Err(e) => {
                self.ctx
                    .record_error(format!("failed to read system metrics: {}", e));
                return None;
            }
        };

        let level = classify(&sample, &self.thresholds);
        self.ctx.state().publish([
            StateUpdate::CpuUsage(sample.cpu_percent),
            StateUpdate::RamUsage(sample.ram_percent),
            StateUpdate::ThrottlingLevel(level),
        ]);

        if level != self.level {
            warn!(
                from = %self.level,
                to = %level,
                level = level.as_u8(),
                cpu = sample.cpu_percent,
                ram = sample.ram_percent,
                "Throttling level changed"
            );
            self.level = level;
        } else {
            debug!(
                level = level.as_u8(),
                cpu = sample.cpu_percent,
                ram = sample.ram_percent,
                "Resource sample"
            );
        }

        Some(level)
    }
}
