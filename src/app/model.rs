use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::DocumentId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Structure,
    Detailed,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Structure => "structure",
            JobType::Detailed => "detailed",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued unit of work. Deleted on success, moved to the failed store once
/// its retry budget is spent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: uuid::Uuid,
    pub job_type: JobType,
    pub document_id: DocumentId,
    pub queue: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl GenerationJob {
    pub const DEFAULT_QUEUE: &'static str = "generation";

    pub fn new(job_type: JobType, document_id: DocumentId) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            job_type,
            document_id,
            queue: Self::DEFAULT_QUEUE.to_owned(),
            attempts: 0,
            created_at: now,
            available_at: now,
            reserved_at: None,
            last_error: None,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>, reservation_ttl: Duration) -> bool {
        if self.available_at > now {
            return false;
        }
        match self.reserved_at {
            None => true,
            Some(reserved_at) => {
                let Ok(ttl) = chrono::Duration::from_std(reservation_ttl) else {
                    return false;
                };
                reserved_at
                    .checked_add_signed(ttl)
                    .is_some_and(|expires_at| expires_at <= now)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub job: GenerationJob,
    pub exception: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub tries: u32,
    pub backoff: Vec<Duration>,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            backoff: vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(120),
            ],
            timeout: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `attempts` have failed, or `None`
    /// once the budget is exhausted.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.tries {
            return None;
        }
        let idx = (attempts.max(1) - 1) as usize;
        let delay = self
            .backoff
            .get(idx)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default();
        Some(delay)
    }
}
