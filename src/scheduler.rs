use crate::pipeline::{Pipeline, PipelineKind, RunReport};
use chrono::Utc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{error, info};

pub const FULL_PERIOD: Duration = Duration::from_secs(20 * 60);
pub const FREQUENT_PERIOD: Duration = Duration::from_secs(60);

/// First multiple of `period_secs` at or after `now_secs`.
///
/// Paris is a whole number of hours away from UTC, so minute and
/// twenty-minute boundaries are the same in both.
pub fn next_boundary(now_secs: u64, period_secs: u64) -> u64 {
    now_secs.div_ceil(period_secs) * period_secs
}

fn aligned_interval(period: Duration) -> Interval {
    let now_secs = Utc::now().timestamp().max(0) as u64;
    let wait = next_boundary(now_secs, period.as_secs()) - now_secs;

    let mut interval = interval_at(Instant::now() + Duration::from_secs(wait), period);
    // a run longer than a period drops the ticks it overlapped
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Runs the full pipeline every twenty minutes and the frequent one every
/// minute, one run at a time, until ctrl-c.
pub struct Scheduler {
    pipeline: Pipeline,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline) -> Self {
        Scheduler { pipeline }
    }

    pub async fn run(&self) {
        let mut full = aligned_interval(FULL_PERIOD);
        let mut frequent = aligned_interval(FREQUENT_PERIOD);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            "Scheduler started: full run every {:?}, frequent run every {:?}",
            FULL_PERIOD, FREQUENT_PERIOD
        );

        loop {
            tokio::select! {
                biased;

                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutting down scheduler");
                    break;
                }
                _ = full.tick() => {
                    self.run_once(PipelineKind::Full).await;
                }
                _ = frequent.tick() => {
                    self.run_once(PipelineKind::Frequent).await;
                }
            }
        }
    }

    /// A failed run is logged and the next tick proceeds as usual.
    pub async fn run_once(&self, kind: PipelineKind) -> RunReport {
        let report = self.pipeline.run(kind).await;
        report.log();
        report
    }
}
