use chrono::Utc;
use log::{info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::jobs::progress::{CancelFlag, ProgressTracker};
use crate::jobs::results::JobResultRegistry;
use crate::logic::errors::CoreError;
use crate::model::{generate_id, Id, JobEvent, RemoteJob, RemoteJobState};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capabilities handed to a scheduled job body: progress reporting wired to
/// the job record, and the cooperative cancellation flag it should poll
pub struct JobContext {
    pub progress: Arc<ProgressTracker>,
    pub cancel: Arc<CancelFlag>,
}

struct JobEntry {
    job: RemoteJob,
    cancel: Arc<CancelFlag>,
}

/// In-process scheduler for trackable, cancellable background jobs.
///
/// Every job mutation funnels through [`JobScheduler::update_job`], which
/// holds the table lock for the update and emits exactly one `Changed` event
/// per call, so observers never see torn job records. Finished jobs are kept
/// for inspection up to a cap; beyond it the oldest-finished are evicted
/// together with their stored results.
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    jobs: RwLock<HashMap<Id, JobEntry>>,
    events: broadcast::Sender<JobEvent>,
    results: JobResultRegistry,
    max_finished: usize,
    closed: AtomicBool,
}

impl JobScheduler {
    pub fn new(max_finished: usize, max_results: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: RwLock::new(HashMap::new()),
                events,
                results: JobResultRegistry::new(max_results),
                max_finished: max_finished.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Schedules `work` on a fresh task and returns the job id immediately.
    /// The job body receives a [`JobContext`]; an `Ok` payload is stored in
    /// the result registry, `Err(Canceled)` ends the job as canceled and any
    /// other error as failed.
    pub fn schedule<F, Fut>(
        &self,
        description: impl Into<String>,
        user: impl Into<String>,
        work: F,
    ) -> Result<Id, CoreError>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CoreError::bad_request(
                "The job scheduler is shutting down and accepts no new jobs",
            ));
        }

        let job = RemoteJob::new(generate_id(), description, user);
        let job_id = job.id.clone();
        let cancel = Arc::new(CancelFlag::new());
        self.inner.jobs.write().insert(
            job_id.clone(),
            JobEntry {
                job: job.clone(),
                cancel: Arc::clone(&cancel),
            },
        );
        let _ = self.inner.events.send(JobEvent::Scheduled(job));
        info!("Scheduled job {}", job_id);

        let inner = Arc::clone(&self.inner);
        let id = job_id.clone();
        tokio::spawn(async move {
            inner.update_job(&id, |job| {
                // a cancel request may land before the worker starts
                if job.state == RemoteJobState::Pending {
                    job.state = RemoteJobState::Running;
                }
                job.started_at = Some(Utc::now().to_rfc3339());
            });

            let progress_inner = Arc::downgrade(&inner);
            let progress_id = id.clone();
            let progress = Arc::new(ProgressTracker::new(Box::new(move |level| {
                if let Some(inner) = progress_inner.upgrade() {
                    inner.update_job(&progress_id, |job| {
                        if level > job.completion_level {
                            job.completion_level = level;
                        }
                    });
                }
            })));

            let outcome = work(JobContext {
                progress,
                cancel: Arc::clone(&cancel),
            })
            .await;
            inner.finish(&id, outcome);
        });

        Ok(job_id)
    }

    /// Applies `mutate` to the job record under the table lock and emits one
    /// `Changed` event with the resulting snapshot
    pub fn update_job(
        &self,
        job_id: &str,
        mutate: impl FnOnce(&mut RemoteJob),
    ) -> Option<RemoteJob> {
        self.inner.update_job(job_id, mutate)
    }

    pub fn get_job(&self, job_id: &str) -> Option<RemoteJob> {
        self.inner
            .jobs
            .read()
            .get(job_id)
            .map(|entry| entry.job.clone())
    }

    /// All known jobs, oldest scheduled first
    pub fn list_jobs(&self) -> Vec<RemoteJob> {
        let mut jobs: Vec<RemoteJob> = self
            .inner
            .jobs
            .read()
            .values()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        jobs
    }

    pub fn get_result(&self, job_id: &str) -> Option<Value> {
        self.inner.results.get(job_id)
    }

    /// Requests cooperative cancellation. A still-running job is flipped to
    /// `cancel_requested` and keeps running until it observes the flag; a
    /// job that already finished is removed immediately instead.
    pub fn request_cancel(&self, job_id: &str) -> Result<(), CoreError> {
        let state = {
            let jobs = self.inner.jobs.read();
            let entry = jobs
                .get(job_id)
                .ok_or_else(|| CoreError::not_found(format!("Job '{}' not found", job_id)))?;
            if !entry.job.is_done() {
                entry.cancel.request();
            }
            entry.job.state
        };
        if state.is_done() {
            self.inner.remove_job(job_id);
            return Ok(());
        }
        // a repeated cancel request must not re-stamp the finish time or
        // emit another event
        if state.is_cancel_requested() {
            return Ok(());
        }
        self.inner.update_job(job_id, |job| {
            if !job.state.is_done() && !job.state.is_cancel_requested() {
                job.state = RemoteJobState::CancelRequested;
                job.finished_at = Some(Utc::now().to_rfc3339());
            }
        });
        info!("Cancellation requested for job {}", job_id);
        Ok(())
    }

    /// Removes a job record and its stored result, emitting `Removed`
    pub fn remove_job(&self, job_id: &str) -> bool {
        self.inner.remove_job(job_id)
    }

    /// Stops accepting new jobs and asks every live job to cancel. Running
    /// jobs wind down cooperatively; none are aborted.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let jobs = self.inner.jobs.read();
        for entry in jobs.values() {
            if !entry.job.is_done() {
                entry.cancel.request();
            }
        }
    }
}

impl SchedulerInner {
    fn update_job(&self, job_id: &str, mutate: impl FnOnce(&mut RemoteJob)) -> Option<RemoteJob> {
        let updated = {
            let mut jobs = self.jobs.write();
            let entry = jobs.get_mut(job_id)?;
            mutate(&mut entry.job);
            entry.job.clone()
        };
        let _ = self.events.send(JobEvent::Changed(updated.clone()));
        Some(updated)
    }

    fn remove_job(&self, job_id: &str) -> bool {
        let removed = self.jobs.write().remove(job_id).is_some();
        if removed {
            self.results.remove(job_id);
            let _ = self.events.send(JobEvent::Removed(job_id.to_string()));
        }
        removed
    }

    fn finish(&self, job_id: &str, outcome: Result<Value, CoreError>) {
        let canceled = self
            .jobs
            .read()
            .get(job_id)
            .map(|entry| entry.job.state.is_cancel_requested())
            .unwrap_or(false);
        let finished_at = Utc::now().to_rfc3339();

        match outcome {
            Ok(result) if !canceled => {
                self.results.put(job_id, result);
                self.update_job(job_id, |job| {
                    job.state = RemoteJobState::Finished;
                    job.completion_level = 100;
                    job.finished_at = Some(finished_at);
                });
            }
            Ok(_) | Err(CoreError::Canceled) => {
                self.update_job(job_id, |job| {
                    job.state = RemoteJobState::Canceled;
                    // the cancel request already stamped a finish time
                    if job.finished_at.is_none() {
                        job.finished_at = Some(finished_at);
                    }
                });
                info!("Job {} canceled", job_id);
            }
            Err(error) => {
                warn!("Job {} failed: {}", job_id, error);
                self.update_job(job_id, |job| {
                    job.state = RemoteJobState::Failed;
                    job.error = Some(error.to_string());
                    job.finished_at = Some(finished_at);
                });
            }
        }
        self.evict_finished();
    }

    /// Keeps at most `max_finished` terminal jobs, dropping the oldest by
    /// finish time first. Live jobs are never evicted.
    fn evict_finished(&self) {
        let mut done: Vec<(Id, String)> = self
            .jobs
            .read()
            .values()
            .filter(|entry| entry.job.is_done())
            .map(|entry| {
                (
                    entry.job.id.clone(),
                    entry.job.finished_at.clone().unwrap_or_default(),
                )
            })
            .collect();
        if done.len() <= self.max_finished {
            return;
        }
        done.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        let excess = done.len() - self.max_finished;
        for (job_id, _) in done.into_iter().take(excess) {
            info!("Evicting finished job {}", job_id);
            self.remove_job(&job_id);
        }
    }
}
