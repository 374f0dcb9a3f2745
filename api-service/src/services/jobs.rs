//! Background job enqueue boundary. Execution lives in a separate worker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, Client};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use super::ServiceError;
use crate::config::RedisConfig;

pub const EMAIL_VERIFICATION_JOB: &str = "email_verification";
pub const ORGANIZATION_INVITATION_EMAIL_JOB: &str = "organization_invitation_email";
pub const STRIPE_SNAPSHOT_WEBHOOK_JOB: &str = "stripe_snapshot_webhook";
pub const STRIPE_THIN_WEBHOOK_JOB: &str = "stripe_thin_webhook";

/// A named unit of work with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new<T: Serialize>(name: &str, payload: &T) -> Result<Self, ServiceError> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            payload: serde_json::to_value(payload)?,
            enqueued_at: Utc::now(),
        })
    }
}

/// `Ok` means the job is durably queued, not that it ran.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), ServiceError>;
    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// Pushes JSON-encoded jobs onto a Redis list consumed by the worker.
#[derive(Clone)]
pub struct RedisJobQueue {
    manager: ConnectionManager,
    queue_key: String,
}

impl RedisJobQueue {
    pub async fn new(config: &RedisConfig) -> Result<Self, ServiceError> {
        tracing::info!(queue = %config.queue_key, "Connecting to Redis job queue");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects on its own
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            ServiceError::Redis(e)
        })?;

        tracing::info!("Connected to Redis job queue");

        Ok(Self {
            manager,
            queue_key: config.queue_key.clone(),
        })
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let encoded = serde_json::to_string(&job)?;

        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(encoded)
            .query_async(&mut conn)
            .await?;

        tracing::info!(job_id = %job.id, job = %job.name, "Job enqueued");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Keeps enqueued jobs in memory for inspection.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn jobs_named(&self, name: &str) -> Vec<Job> {
        self.jobs().into_iter().filter(|j| j.name == name).collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), ServiceError> {
        self.jobs
            .lock()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("job queue lock poisoned")))?
            .push(job);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Rejects every job, for exercising enqueue-failure paths.
#[derive(Default)]
pub struct FailingJobQueue;

#[async_trait]
impl JobQueue for FailingJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), ServiceError> {
        Err(ServiceError::Internal(anyhow::anyhow!(
            "queue unavailable, dropped {}",
            job.name
        )))
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Err(ServiceError::Internal(anyhow::anyhow!("queue unavailable")))
    }
}
