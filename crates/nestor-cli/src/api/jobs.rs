//! Background job queue
//!
//! A bounded channel feeds a fixed number of worker tasks. Submitting to a
//! full queue fails right away instead of waiting. Every job keeps an
//! observable record; only the most recent finished records are retained.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

pub type JobId = u64;

type JobTask = Pin<Box<dyn Future<Output = Result<JsonValue, String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Build,
    Advance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,

    pub error: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("job queue is full ({capacity} pending jobs)")]
    Full { capacity: usize },

    #[error("job queue is closed")]
    Closed,
}

struct Job {
    id: JobId,
    task: JobTask,
}

/// Job records by id, with finished jobs evicted oldest first
struct JobStore {
    records: HashMap<JobId, JobRecord>,
    finished: VecDeque<JobId>,
    history: usize,
}

impl JobStore {
    fn new(history: usize) -> Self {
        Self {
            records: HashMap::new(),
            finished: VecDeque::new(),
            history,
        }
    }

    fn finish(&mut self, id: JobId) {
        self.finished.push_back(id);
        while self.finished.len() > self.history {
            if let Some(oldest) = self.finished.pop_front() {
                self.records.remove(&oldest);
                tracing::debug!(job = oldest, "job record evicted");
            }
        }
    }
}

type Records = Arc<Mutex<JobStore>>;

fn lock(records: &Records) -> MutexGuard<'_, JobStore> {
    records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    records: Records,
    next_id: AtomicU64,
    capacity: usize,
}

impl JobQueue {
    /// Spawn `workers` tasks consuming a queue of `capacity` pending jobs,
    /// keeping the records of the last `history` finished jobs
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(workers: usize, capacity: usize, history: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let records: Records = Arc::new(Mutex::new(JobStore::new(history)));

        for worker in 0..workers.max(1) {
            let receiver = receiver.clone();
            let records = records.clone();
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    match next {
                        Some(job) => run_job(worker, job, &records).await,
                        None => break,
                    }
                }
                tracing::debug!(worker = worker, "job worker stopped");
            });
        }

        Self {
            sender,
            records,
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Queue `task`, returning the id to poll
    pub fn submit<F>(&self, kind: JobKind, task: F) -> Result<JobId, QueueError>
    where
        F: Future<Output = Result<JsonValue, String>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.records).records.insert(
            id,
            JobRecord {
                id,
                kind,
                status: JobStatus::Queued,
                result: None,
                error: None,
            },
        );

        let job = Job {
            id,
            task: Box::pin(task),
        };
        match self.sender.try_send(job) {
            Ok(()) => {
                tracing::debug!(job = id, kind = ?kind, "job queued");
                Ok(id)
            }
            Err(err) => {
                lock(&self.records).records.remove(&id);
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        tracing::warn!(kind = ?kind, capacity = self.capacity, "job queue is full, job rejected");
                        Err(QueueError::Full {
                            capacity: self.capacity,
                        })
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(QueueError::Closed),
                }
            }
        }
    }

    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        lock(&self.records).records.get(&id).cloned()
    }
}

fn set_status(records: &Records, id: JobId, status: JobStatus, outcome: Option<Result<JsonValue, String>>) {
    let mut store = lock(records);
    let Some(record) = store.records.get_mut(&id) else {
        return;
    };
    record.status = status;
    match outcome {
        Some(Ok(result)) => record.result = Some(result),
        Some(Err(error)) => record.error = Some(error),
        None => return,
    }
    store.finish(id);
}

async fn run_job(worker: usize, job: Job, records: &Records) {
    set_status(records, job.id, JobStatus::Running, None);
    tracing::debug!(worker = worker, job = job.id, "job started");

    match job.task.await {
        Ok(result) => {
            tracing::info!(job = job.id, "job succeeded");
            set_status(records, job.id, JobStatus::Succeeded, Some(Ok(result)));
        }
        Err(err) => {
            tracing::error!(job = job.id, err = %err, "job failed");
            set_status(records, job.id, JobStatus::Failed, Some(Err(err)));
        }
    }
}
