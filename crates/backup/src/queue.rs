//! Redis-backed backup job queue.
//!
//! Ready jobs sit in a list (`LPUSH` / `BRPOP`). Retries wait in a sorted set
//! scored by their due time (unix millis) and are moved back onto the list
//! once due. Each entry is a small JSON envelope carrying the job id and the
//! attempt number.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keeper_common::config::AppConfig;
use keeper_common::error::AppError;

use crate::error::BackupError;
use crate::orchestrator::{BackupOrchestrator, HandleOutcome};

pub const QUEUE_KEY: &str = "backups:queue";
pub const DELAYED_KEY: &str = "backups:delayed";

/// How long a single `BRPOP` blocks before the loop promotes delayed jobs again.
const POP_WAIT: Duration = Duration::from_secs(5);

/// Accepts job ids for asynchronous execution.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), AppError>;
}

/// Consumer side of the queue, as driven by [`QueueWorker`].
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Block up to `wait` for the next ready envelope.
    async fn pop(&self, wait: Duration) -> Result<Option<JobEnvelope>, AppError>;

    /// Park an envelope until `now + delay`.
    async fn schedule(
        &self,
        envelope: &JobEnvelope,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Make every parked envelope due at `now` ready again.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: Uuid,
    /// 1-based
    pub attempt: u32,
}

impl JobEnvelope {
    pub fn first(job_id: Uuid) -> Self {
        Self { job_id, attempt: 1 }
    }
}

/// What to do after an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff[n - 1]`; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// Upper bound on one attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![Duration::from_secs(60), Duration::from_secs(300)],
            timeout: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.backup_max_attempts.max(1),
            timeout: Duration::from_secs(config.backup_job_timeout_secs),
            ..Self::default()
        }
    }

    /// Decide the follow-up for a failed `attempt`.
    pub fn next_step(&self, attempt: u32) -> NextStep {
        if attempt >= self.max_attempts {
            return NextStep::GiveUp;
        }
        let index = (attempt.max(1) - 1) as usize;
        let delay = self
            .backoff
            .get(index)
            .or(self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO);
        NextStep::Retry {
            attempt: attempt + 1,
            delay,
        }
    }
}

#[derive(Clone)]
pub struct BackupQueue {
    redis: ConnectionManager,
}

impl BackupQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn push(&self, envelope: &JobEnvelope) -> Result<(), AppError> {
        let payload = encode(envelope)?;
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(QUEUE_KEY)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Park an envelope until `now + delay`.
    pub async fn schedule(
        &self,
        envelope: &JobEnvelope,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let payload = encode(envelope)?;
        let due = now.timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(DELAYED_KEY)
            .arg(due)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Move every delayed envelope due at `now` onto the ready list.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut conn = self.redis.clone();
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(DELAYED_KEY)
            .arg("-inf")
            .arg(now.timestamp_millis())
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for payload in due {
            // Only the worker that removes the entry pushes it
            let removed: i64 = redis::cmd("ZREM")
                .arg(DELAYED_KEY)
                .arg(&payload)
                .query_async(&mut conn)
                .await?;
            if removed == 1 {
                let _: i64 = redis::cmd("LPUSH")
                    .arg(QUEUE_KEY)
                    .arg(&payload)
                    .query_async(&mut conn)
                    .await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Block up to `wait` for the next ready envelope.
    pub async fn pop(&self, wait: Duration) -> Result<Option<JobEnvelope>, AppError> {
        let mut conn = self.redis.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(QUEUE_KEY)
            .arg(wait.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                tracing::warn!(payload = %payload, error = %e, "Dropping malformed queue entry");
                Ok(None)
            }
        }
    }

    /// Ready and delayed entry counts.
    pub async fn depth(&self) -> Result<(i64, i64), AppError> {
        let mut conn = self.redis.clone();
        let ready: i64 = redis::cmd("LLEN")
            .arg(QUEUE_KEY)
            .query_async(&mut conn)
            .await?;
        let delayed: i64 = redis::cmd("ZCARD")
            .arg(DELAYED_KEY)
            .query_async(&mut conn)
            .await?;
        Ok((ready, delayed))
    }
}

#[async_trait]
impl JobQueue for BackupQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), AppError> {
        self.push(&JobEnvelope::first(job_id)).await?;
        tracing::info!(backup_id = %job_id, "Backup job queued");
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for BackupQueue {
    async fn pop(&self, wait: Duration) -> Result<Option<JobEnvelope>, AppError> {
        BackupQueue::pop(self, wait).await
    }

    async fn schedule(
        &self,
        envelope: &JobEnvelope,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        BackupQueue::schedule(self, envelope, delay, now).await
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        BackupQueue::promote_due(self, now).await
    }
}

fn encode(envelope: &JobEnvelope) -> Result<String, AppError> {
    serde_json::to_string(envelope)
        .map_err(|e| AppError::Internal(format!("Failed to encode queue entry: {}", e)))
}

/// Consumes the queue and drives jobs through the orchestrator.
pub struct QueueWorker {
    queue: Arc<dyn WorkQueue>,
    orchestrator: Arc<BackupOrchestrator>,
    policy: RetryPolicy,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        orchestrator: Arc<BackupOrchestrator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            policy,
        }
    }

    /// Run until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            max_attempts = self.policy.max_attempts,
            timeout_secs = self.policy.timeout.as_secs(),
            "Backup queue worker started"
        );

        loop {
            if let Err(e) = self.queue.promote_due(Utc::now()).await {
                tracing::warn!(error = %e, "Failed to promote delayed backup jobs");
            }

            match self.queue.pop(POP_WAIT).await {
                Ok(Some(envelope)) => self.process(envelope).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Backup queue unavailable, backing off");
                    tokio::time::sleep(POP_WAIT).await;
                }
            }
        }
    }

    async fn process(&self, envelope: JobEnvelope) {
        tracing::info!(
            backup_id = %envelope.job_id,
            attempt = envelope.attempt,
            "Processing backup job"
        );

        let result = tokio::time::timeout(
            self.policy.timeout,
            self.orchestrator.handle(envelope.job_id),
        )
        .await;

        match result {
            Ok(Ok(HandleOutcome::Completed(_))) => {}
            Ok(Ok(HandleOutcome::Skipped { .. })) => {}
            Ok(Err(BackupError::NotFound(id))) => {
                tracing::warn!(backup_id = %id, "Queued backup no longer exists, dropping");
            }
            Ok(Err(e)) if e.is_infrastructure() => {
                self.after_failure(envelope, &e.to_string()).await
            }
            Ok(Err(e)) => {
                // Already recorded as failed, another attempt would be skipped
                tracing::warn!(
                    backup_id = %envelope.job_id,
                    attempt = envelope.attempt,
                    error = %e,
                    "Backup run failed, not retrying"
                );
            }
            Err(_) => {
                // The job was already claimed, a new attempt would be a no-op
                let error = BackupError::TimedOut(self.policy.timeout.as_secs()).to_string();
                self.give_up(envelope.job_id, &error).await;
            }
        }
    }

    async fn after_failure(&self, envelope: JobEnvelope, error: &str) {
        match self.policy.next_step(envelope.attempt) {
            NextStep::Retry { attempt, delay } => {
                let retry = JobEnvelope {
                    job_id: envelope.job_id,
                    attempt,
                };
                match self.queue.schedule(&retry, delay, Utc::now()).await {
                    Ok(()) => tracing::warn!(
                        backup_id = %envelope.job_id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "Backup attempt failed, retry scheduled"
                    ),
                    Err(e) => {
                        tracing::error!(backup_id = %envelope.job_id, error = %e, "Could not schedule retry");
                        self.give_up(envelope.job_id, error).await;
                    }
                }
            }
            NextStep::GiveUp => self.give_up(envelope.job_id, error).await,
        }
    }

    async fn give_up(&self, job_id: Uuid, error: &str) {
        if let Err(e) = self.orchestrator.fail_permanently(job_id, error).await {
            tracing::error!(backup_id = %job_id, error = %e, "Failure callback failed");
        }
    }
}
