//! Orchestrator for the sync service.
//!
//! Pulls job batches from the job source, runs each job through the
//! dispatcher, applies the retry policy to failures and acknowledges the jobs
//! back to the source. Retries that are not due yet are parked on a timer and
//! acknowledged once they have run; the loop keeps dispatching meanwhile. Also
//! drives the periodic reconciliation schedule.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use search_sync_shared::{EntityType, SyncJob};

use crate::dispatcher::JobDispatcher;
use crate::errors::QueueError;
use crate::queue::{
    JobSource, Offsets, QueuedJob, RetryDecision, RetryPolicy, SearchSyncClient, StreamMessage,
};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the message channel buffer.
    pub channel_buffer_size: usize,
    /// How often to enqueue reconciliation jobs; `None` disables it.
    pub reconciliation_interval: Option<Duration>,
    /// How often to log throughput.
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            reconciliation_interval: None,
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Job counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_dead: u64,
    /// Retries parked because they arrived before their `not_before`.
    pub jobs_deferred: u64,
    /// Unique jobs dropped because an identical one came earlier in the batch.
    pub jobs_deduplicated: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dead: AtomicU64,
    deferred: AtomicU64,
    deduplicated: AtomicU64,
}

pub struct Orchestrator {
    source: Arc<dyn JobSource>,
    dispatcher: JobDispatcher,
    client: SearchSyncClient,
    retry_policy: RetryPolicy,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    counters: Arc<Counters>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn JobSource>,
        dispatcher: JobDispatcher,
        client: SearchSyncClient,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self::with_config(
            source,
            dispatcher,
            client,
            retry_policy,
            OrchestratorConfig::default(),
        )
    }

    pub fn with_config(
        source: Arc<dyn JobSource>,
        dispatcher: JobDispatcher,
        client: SearchSyncClient,
        retry_policy: RetryPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            source,
            dispatcher,
            client,
            retry_policy,
            config,
            shutdown_tx,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            jobs_processed: self.counters.processed.load(Ordering::Relaxed),
            jobs_failed: self.counters.failed.load(Ordering::Relaxed),
            jobs_retried: self.counters.retried.load(Ordering::Relaxed),
            jobs_dead: self.counters.dead.load(Ordering::Relaxed),
            jobs_deferred: self.counters.deferred.load(Ordering::Relaxed),
            jobs_deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
        }
    }

    /// Run until the job source ends or a shutdown signal arrives.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<(), QueueError> {
        info!("Starting search sync orchestrator");

        self.source.subscribe()?;

        let (job_transmitter, mut job_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);
        let (ack_transmitter, ack_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);
        let (due_transmitter, mut due_receiver) =
            mpsc::channel::<QueuedJob>(self.config.channel_buffer_size);

        let source = Arc::clone(&self.source);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let source_handle = tokio::spawn(async move {
            if let Err(e) = source.run(job_transmitter, ack_receiver, shutdown_rx).await {
                error!(error = %e, "Job source error");
            }
        });

        info!("Ready to process sync jobs");

        let mut reconciliation_timer = self.config.reconciliation_interval.map(|period| {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        if let Some(timer) = reconciliation_timer.as_mut() {
            timer.tick().await;
        }

        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut prev_processed: u64 = 0;
        let mut prev_failed: u64 = 0;
        let mut prev_time = std::time::Instant::now();

        loop {
            tokio::select! {
                msg = job_receiver.recv() => {
                    match msg {
                        Some(StreamMessage::Jobs(jobs)) => {
                            debug!(job_count = jobs.len(), "Received jobs");
                            let offsets: Offsets = jobs.iter().map(|queued| queued.offset.clone()).collect();
                            let ack = match self.process_jobs(jobs).await {
                                Ok(deferred) => {
                                    let parked: HashSet<_> = deferred.iter().map(|queued| queued.offset.clone()).collect();
                                    for queued in deferred {
                                        self.park(queued, due_transmitter.clone());
                                    }
                                    StreamMessage::Acknowledgment {
                                        offsets: offsets.into_iter().filter(|offset| !parked.contains(offset)).collect(),
                                        success: true,
                                        error: None,
                                    }
                                }
                                Err(e) => {
                                    error!(error = %e, "Failed to process jobs. Sending NACK to broker");
                                    StreamMessage::Acknowledgment {
                                        offsets,
                                        success: false,
                                        error: Some(e.to_string()),
                                    }
                                }
                            };
                            send_ack(&ack_transmitter, ack).await;
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Received error from job source");
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Job stream ended");
                            break;
                        }
                        Some(StreamMessage::Acknowledgment { .. }) => {
                            warn!("Received acknowledgment on job channel (should be on ack channel)");
                        }
                    }
                }
                Some(queued) = due_receiver.recv() => {
                    debug!(job_id = %queued.job.job_id, "Parked job is due");
                    let ack = match self.execute(queued.job).await {
                        Ok(()) => StreamMessage::Acknowledgment {
                            offsets: vec![queued.offset],
                            success: true,
                            error: None,
                        },
                        Err(e) => {
                            error!(error = %e, "Failed to process parked job. Sending NACK to broker");
                            StreamMessage::Acknowledgment {
                                offsets: vec![queued.offset],
                                success: false,
                                error: Some(e.to_string()),
                            }
                        }
                    };
                    send_ack(&ack_transmitter, ack).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = tick_or_pending(&mut reconciliation_timer) => {
                    self.schedule_reconciliation().await;
                }
                _ = progress_timer.tick() => {
                    let stats = self.stats();
                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();

                    let rate = |current: u64, previous: u64| {
                        if elapsed_secs > 0.0 {
                            (current.saturating_sub(previous) as f64) / elapsed_secs
                        } else {
                            0.0
                        }
                    };

                    info!(
                        jobs_processed = stats.jobs_processed,
                        jobs_failed = stats.jobs_failed,
                        jobs_retried = stats.jobs_retried,
                        jobs_dead = stats.jobs_dead,
                        jobs_per_sec = format!("{:.2}", rate(stats.jobs_processed, prev_processed)),
                        failures_per_sec = format!("{:.2}", rate(stats.jobs_failed, prev_failed)),
                        "Processing progress"
                    );

                    prev_processed = stats.jobs_processed;
                    prev_failed = stats.jobs_failed;
                    prev_time = now;
                }
            }
        }

        // Parked jobs still waiting are left unacknowledged and are read again
        // after a restart.
        let _ = self.shutdown_tx.send(());
        // Dropping the ack channel lets the source stop once it drains.
        drop(ack_transmitter);
        let _ = source_handle.await;

        let stats = self.stats();
        info!(
            total_jobs_processed = stats.jobs_processed,
            total_jobs_failed = stats.jobs_failed,
            total_jobs_retried = stats.jobs_retried,
            total_jobs_dead = stats.jobs_dead,
            total_jobs_deferred = stats.jobs_deferred,
            total_jobs_deduplicated = stats.jobs_deduplicated,
            "Orchestrator shutdown complete"
        );
        Ok(())
    }

    /// Handle every job in a batch and return the ones that are not due yet.
    ///
    /// A unique job identical to one earlier in the batch is dropped: the
    /// earlier one runs after both were published and reads the same record.
    /// Returns an error only when a failed job could not be handed back to the
    /// queue; the batch is then not acknowledged and will be redelivered.
    pub async fn process_jobs(&self, jobs: Vec<QueuedJob>) -> Result<Vec<QueuedJob>, QueueError> {
        let mut seen = HashSet::new();
        let mut deferred = Vec::new();

        for queued in jobs {
            if queued.job.unique && !seen.insert(queued.job.dedup_key()) {
                self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(
                    job_id = %queued.job.job_id,
                    key = %queued.job.dedup_key(),
                    "Dropping duplicate job from batch"
                );
                continue;
            }
            if self.time_until_due(&queued.job).is_some() {
                self.counters.deferred.fetch_add(1, Ordering::Relaxed);
                deferred.push(queued);
                continue;
            }
            self.execute(queued.job).await?;
        }
        Ok(deferred)
    }

    async fn execute(&self, job: SyncJob) -> Result<(), QueueError> {
        // Execution starts now; a new enqueue of the same work must not be dropped.
        if job.unique {
            if let Some(locks) = self.client.locks() {
                locks.release(&job.dedup_key());
            }
        }

        match self.dispatcher.dispatch(&job).await {
            Ok(outcome) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    job_id = %job.job_id,
                    job_type = job.payload.job_type(),
                    outcome = ?outcome,
                    "Job complete"
                );
                Ok(())
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let options = self.dispatcher.options_for(&job);

                match self.retry_policy.decide(&job, &e, options) {
                    RetryDecision::Retry(next) => {
                        warn!(
                            job_id = %job.job_id,
                            job_type = job.payload.job_type(),
                            entity_type = job.payload.entity_type(),
                            attempt = next.attempt,
                            not_before = ?next.not_before,
                            error = %e,
                            "Job failed, scheduling retry"
                        );
                        self.client.requeue(&next).await?;
                        self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    }
                    RetryDecision::Dead { reason } => {
                        error!(
                            job_id = %job.job_id,
                            job_type = job.payload.job_type(),
                            entity_type = job.payload.entity_type(),
                            attempt = job.attempt,
                            error = %e,
                            reason = %reason,
                            "Job is dead"
                        );
                        self.counters.dead.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(())
            }
        }
    }

    /// Time left before `job` may run, capped at the maximum backoff; `None`
    /// when it is due.
    fn time_until_due(&self, job: &SyncJob) -> Option<Duration> {
        let not_before = job.not_before?;
        let delay = (not_before - Utc::now()).to_std().ok()?;
        if delay.is_zero() {
            return None;
        }
        Some(delay.min(self.retry_policy.max_backoff()))
    }

    /// Hand `queued` back on `due` once it is due, unless shutdown comes first.
    fn park(&self, queued: QueuedJob, due: mpsc::Sender<QueuedJob>) {
        let delay = self.time_until_due(&queued.job).unwrap_or(Duration::ZERO);
        debug!(
            job_id = %queued.job.job_id,
            attempt = queued.job.attempt,
            delay_ms = delay.as_millis() as u64,
            "Parking job until its retry delay passes"
        );

        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = due.send(queued).await;
                }
                _ = shutdown.recv() => {}
            }
        });
    }

    async fn schedule_reconciliation(&self) {
        for entity_type in EntityType::ALL {
            if let Err(e) = self.client.reconcile(entity_type).await {
                error!(entity_type = %entity_type, error = %e, "Failed to enqueue reconciliation");
            }
        }
        info!("Scheduled reconciliation for every entity type");
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn send_ack(ack_transmitter: &mpsc::Sender<StreamMessage>, ack: StreamMessage) {
    if matches!(&ack, StreamMessage::Acknowledgment { offsets, .. } if offsets.is_empty()) {
        return;
    }
    let _ = ack_transmitter.send(ack).await;
}

async fn tick_or_pending(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
