//! Background worker for long scans.
//!
//! RULE: the worker owns its own connection on its own thread. Callers
//! hand it jobs over a channel and read outcomes back in submission order;
//! the interactive connection is never blocked by a validation pass or a
//! snapshot recompute.

use crate::{
    config::RotaConfig,
    error::{ErrorClass, RotaError, RotaResult},
    snapshot::{RecomputeSummary, SnapshotRecompute},
    store::RotaStore,
    types::ScheduleId,
    validation::{ValidationReport, Validator},
};
use serde::Serialize;
use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    Validate {
        schedule_id: ScheduleId,
        auto_fix: bool,
    },
    Recompute {
        schedule_id: ScheduleId,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Validated(ValidationReport),
    Recomputed(RecomputeSummary),
    Failed {
        job: Job,
        class: ErrorClass,
        message: String,
    },
}

fn run_job(store: &RotaStore, config: &RotaConfig, job: Job) -> JobOutcome {
    let result = match job {
        Job::Validate {
            schedule_id,
            auto_fix,
        } => Validator::new(store, config)
            .run(schedule_id, auto_fix)
            .map(JobOutcome::Validated),
        Job::Recompute { schedule_id } => SnapshotRecompute::new(store)
            .recompute(schedule_id)
            .map(JobOutcome::Recomputed),
    };
    result.unwrap_or_else(|e| {
        log::warn!("Background job {job:?} failed: {e}");
        JobOutcome::Failed {
            job,
            class: e.class(),
            message: e.to_string(),
        }
    })
}

pub struct BackgroundWorker {
    jobs: Option<Sender<Job>>,
    outcomes: Receiver<JobOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Open a connection to `db_path` and start the worker thread.
    pub fn spawn(db_path: &str, config: RotaConfig) -> RotaResult<Self> {
        let store = RotaStore::open(db_path)?;
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (out_tx, out_rx) = mpsc::channel::<JobOutcome>();

        let handle = thread::Builder::new()
            .name("rota-worker".into())
            .spawn(move || {
                for job in job_rx {
                    log::debug!("Worker picked up {job:?}");
                    if out_tx.send(run_job(&store, &config, job)).is_err() {
                        break;
                    }
                }
                log::debug!("Worker stopped");
            })
            .map_err(|e| anyhow::anyhow!("cannot start worker thread: {e}"))?;

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: out_rx,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, job: Job) -> RotaResult<()> {
        self.jobs
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("worker is shut down"))?
            .send(job)
            .map_err(|_| RotaError::Other(anyhow::anyhow!("worker thread has exited")))
    }

    /// Next outcome, blocking. None once the worker is gone.
    pub fn recv(&self) -> Option<JobOutcome> {
        self.outcomes.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Finish queued jobs and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Worker thread panicked");
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
