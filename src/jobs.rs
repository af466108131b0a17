//! In-memory job store for background conversions.
//!
//! A [`JobStore`] is a cloneable handle to one shared map. Background tasks
//! never hold a [`Job`]; they hold its [`JobId`] and mutate the record through
//! [`JobStore::update`], which enforces the lifecycle:
//!
//! ```text
//! queued ──Start──▶ processing ──Complete──▶ done
//!    │                  │
//!    └──────Fail────────┴──────Fail────────▶ error
//! ```
//!
//! `result` is only ever set together with `done`, `error` only together
//! with `error`, and progress never goes backwards. Records whose last update
//! is older than the store's TTL are evicted by [`JobStore::sweep`] whatever
//! their status; since every page refreshes `updated_at`, only a job stalled
//! for the whole window is lost that way.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub type JobId = Uuid;

/// Progress reported when a job leaves the queue.
pub const START_PERCENT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// 0–100, never decreasing.
    pub progress: u8,
    pub message: String,
    /// Name of the uploaded file.
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Serialised workbook; `Some` iff `status == Done`.
    pub result: Option<Bytes>,
    /// Failure message; `Some` iff `status == Error`.
    pub error: Option<String>,
}

impl Job {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            error: self.error.clone(),
        }
    }
}

/// The client-visible part of a job, as sent on the progress stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
}

/// A state change requested by the job runner.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// queued → processing.
    Start { message: String },
    /// Progress within `processing`. Lower percentages than the current one
    /// keep the current value.
    Progress { percent: u8, message: String },
    /// processing → done.
    Complete { workbook: Bytes, message: String },
    /// queued/processing → error.
    Fail { error: String, message: String },
}

/// What [`JobStore::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// No such job (never created, or already evicted).
    Missing,
    /// The update is not valid in the job's current state.
    Rejected,
}

/// Shared, cloneable handle to the job map.
#[derive(Debug, Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    ttl: Duration,
}

impl JobStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a new queued job and return a copy of it.
    pub fn create(&self, filename: impl Into<String>, message: impl Into<String>) -> Job {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            progress: 0,
            message: message.into(),
            filename: filename.into(),
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        };
        self.write().insert(job.id, job.clone());
        debug!("Job {} created for '{}'", job.id, job.filename);
        job
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.read().get(id).cloned()
    }

    /// Client-visible state without cloning the workbook.
    pub fn snapshot(&self, id: &JobId) -> Option<ProgressSnapshot> {
        self.read().get(id).map(Job::snapshot)
    }

    pub fn update(&self, id: &JobId, update: JobUpdate) -> UpdateOutcome {
        let mut jobs = self.write();
        let Some(job) = jobs.get_mut(id) else {
            return UpdateOutcome::Missing;
        };

        match (job.status, update) {
            (JobStatus::Queued, JobUpdate::Start { message }) => {
                job.status = JobStatus::Processing;
                job.progress = job.progress.max(START_PERCENT);
                job.message = message;
            }
            (JobStatus::Processing, JobUpdate::Progress { percent, message }) => {
                job.progress = job.progress.max(percent.min(100));
                job.message = message;
            }
            (JobStatus::Processing, JobUpdate::Complete { workbook, message }) => {
                job.status = JobStatus::Done;
                job.progress = 100;
                job.message = message;
                job.result = Some(workbook);
            }
            (JobStatus::Queued | JobStatus::Processing, JobUpdate::Fail { error, message }) => {
                job.status = JobStatus::Error;
                job.progress = 100;
                job.message = message;
                job.error = Some(error);
            }
            (status, update) => {
                debug!("Job {}: rejected {:?} while {}", id, kind(&update), status);
                return UpdateOutcome::Rejected;
            }
        }
        job.updated_at = Utc::now();
        UpdateOutcome::Applied
    }

    /// Evict jobs not updated within the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep_map(&self.jobs, self.ttl, Utc::now())
    }

    /// [`sweep`](Self::sweep) against an explicit clock.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        sweep_map(&self.jobs, self.ttl, now)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current runtime.
    ///
    /// The task holds only a weak reference and exits on the first tick after
    /// the last store handle is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let jobs: Weak<RwLock<HashMap<JobId, Job>>> = Arc::downgrade(&self.jobs);
        let ttl = self.ttl;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(jobs) = jobs.upgrade() else {
                    debug!("Job store dropped; sweeper exiting");
                    break;
                };
                let evicted = sweep_map(&jobs, ttl, Utc::now());
                if evicted > 0 {
                    info!("Evicted {} expired jobs", evicted);
                }
            }
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sweep_map(jobs: &RwLock<HashMap<JobId, Job>>, ttl: Duration, now: DateTime<Utc>) -> usize {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
    let mut jobs = jobs.write().unwrap_or_else(PoisonError::into_inner);
    let before = jobs.len();
    jobs.retain(|id, job| {
        let keep = now - job.updated_at <= ttl;
        if !keep {
            debug!("Evicting job {} ({}, last update {})", id, job.status, job.updated_at);
        }
        keep
    });
    before - jobs.len()
}

fn kind(update: &JobUpdate) -> &'static str {
    match update {
        JobUpdate::Start { .. } => "Start",
        JobUpdate::Progress { .. } => "Progress",
        JobUpdate::Complete { .. } => "Complete",
        JobUpdate::Fail { .. } => "Fail",
    }
}
