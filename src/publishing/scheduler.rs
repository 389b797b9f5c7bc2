use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::db::{Claim, Repository};
use crate::error::{AppError, Result};

use super::publisher::{PublishOutcome, Publisher};

/// What one discovery pass found and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub claimed: usize,
    /// Lost to a concurrent claim, or gone by the time we got to it.
    pub skipped: usize,
    /// Left scheduled because every publish slot was busy.
    pub deferred: usize,
}

/// A claim untouched for this many publish timeouts has no live owner.
const STALE_CLAIM_FACTOR: u32 = 2;

struct SchedulerCore {
    repository: Arc<Repository>,
    publisher: Arc<Publisher>,
    slots: Arc<Semaphore>,
    stale_after: Duration,
}

impl SchedulerCore {
    /// Fails claims whose owner must be gone. Fresh claims may belong to
    /// another process sharing the database and are left alone.
    async fn fail_stale_claims(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = chrono::Duration::from_std(self.stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let failed = self.repository.fail_interrupted_claims(cutoff).await?;
        if failed > 0 {
            warn!(count = failed, "stale publish claims marked failed");
        }
        Ok(failed)
    }

    /// Claims every post due at a single snapshot time and starts a publish
    /// task for each one. Posts are only claimed while a slot is free, so a
    /// claimed post is always actively being published.
    async fn tick(&self, in_flight: &mut JoinSet<PublishOutcome>) -> Result<CycleReport> {
        let snapshot = Utc::now();
        self.fail_stale_claims(snapshot).await?;
        let due = self.repository.due_post_ids(snapshot).await?;
        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };

        for post_id in due {
            let Ok(slot) = self.slots.clone().try_acquire_owned() else {
                report.deferred += 1;
                continue;
            };

            match self.repository.claim_due(post_id, snapshot).await {
                Ok(Claim::Claimed(post)) => {
                    report.claimed += 1;
                    let publisher = self.publisher.clone();
                    in_flight.spawn(async move {
                        let _slot = slot;
                        publisher.publish_claimed(post).await
                    });
                }
                Ok(Claim::Unavailable(status)) => {
                    debug!(post_id, %status, "post claimed elsewhere, skipping");
                    report.skipped += 1;
                }
                Err(AppError::NotFound { .. }) => {
                    debug!(post_id, "post deleted before it could be claimed");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(post_id, error = %e, "claiming due post failed");
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Polls for due posts on a fixed interval and publishes them.
///
/// Owned by whoever starts it; nothing runs until [`Scheduler::start`] and
/// [`Scheduler::stop`] waits for in-flight publishes before returning.
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    interval: Duration,
    running: Option<Running>,
}

impl Scheduler {
    pub fn new(
        repository: Arc<Repository>,
        publisher: Arc<Publisher>,
        interval: Duration,
        max_in_flight: usize,
    ) -> Self {
        let stale_after = publisher.timeout() * STALE_CLAIM_FACTOR;
        Self {
            core: Arc::new(SchedulerCore {
                repository,
                publisher,
                slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
                stale_after,
            }),
            interval,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("scheduler already running");
            return Ok(());
        }

        self.core.fail_stale_claims(Utc::now()).await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(self.core.clone(), self.interval, shutdown_rx));
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            error!(error = %e, "scheduler task ended abnormally");
        }
    }

    /// One discovery pass, waiting for every publish it starts.
    pub async fn run_cycle(&self) -> Result<(CycleReport, Vec<PublishOutcome>)> {
        let mut in_flight = JoinSet::new();
        let report = self.core.tick(&mut in_flight).await?;
        let mut outcomes = Vec::with_capacity(report.claimed);
        while let Some(joined) = in_flight.join_next().await {
            if let Some(outcome) = settled(joined) {
                outcomes.push(outcome);
            }
        }
        Ok((report, outcomes))
    }
}

async fn run(core: Arc<SchedulerCore>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(interval_secs = period.as_secs_f64(), "scheduler started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match core.tick(&mut in_flight).await {
                    Ok(report) if report.due > 0 => info!(
                        due = report.due,
                        claimed = report.claimed,
                        skipped = report.skipped,
                        deferred = report.deferred,
                        "scheduler cycle"
                    ),
                    Ok(_) => debug!("no posts due"),
                    Err(e) => error!(error = %e, "scheduler cycle failed"),
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                settled(joined);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(in_flight = in_flight.len(), "scheduler stopping");
    while let Some(joined) = in_flight.join_next().await {
        settled(joined);
    }
    info!("scheduler stopped");
}

fn settled(joined: std::result::Result<PublishOutcome, JoinError>) -> Option<PublishOutcome> {
    match joined {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "publish task panicked");
            None
        }
    }
}
