//! Job Pool
//!
//! Runs independently built jobs with bounded concurrency. `limit` lanes are
//! spawned; each lane pulls the next unstarted job until the queue is empty.
//! A failing job never cancels its siblings, and results stay addressable by
//! submission index whatever order the jobs complete in.

use crate::error::{InventoryError, JobErrors, JobFailure, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Deferred work producing a partial result list
pub type JobFuture<T> = BoxFuture<'static, Result<Vec<T>>>;

type JobTask<T> = Box<dyn FnOnce() -> JobFuture<T> + Send>;

/// A unit of deferred work, executed at most once
pub struct Job<T> {
    task: Option<JobTask<T>>,
    preset_error: Option<InventoryError>,
}

impl<T> Job<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        Self {
            task: Some(Box::new(move || f().boxed())),
            preset_error: None,
        }
    }

    /// A job that is already failed and will not be executed
    pub fn failed(err: InventoryError) -> Self {
        Self {
            task: None,
            preset_error: Some(err),
        }
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("runnable", &self.task.is_some())
            .field("preset_error", &self.preset_error)
            .finish()
    }
}

type Outcome<T> = Option<Result<Vec<T>>>;

/// Bounded-concurrency executor
pub struct JobPool<T> {
    jobs: Vec<Job<T>>,
    limit: usize,
    outcomes: Vec<Outcome<T>>,
    ran: bool,
}

impl<T: Send + 'static> JobPool<T> {
    /// Create a pool; a zero limit is treated as one
    pub fn new(jobs: Vec<Job<T>>, limit: usize) -> Self {
        Self {
            jobs,
            limit: limit.max(1),
            outcomes: Vec::new(),
            ran: false,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len().max(self.outcomes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute every job to completion
    pub async fn run(&mut self) {
        let jobs = std::mem::take(&mut self.jobs);
        let total = jobs.len();
        let slots: Arc<Mutex<Vec<Outcome<T>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));

        let mut queue = VecDeque::new();
        {
            let mut guard = slots.lock().unwrap_or_else(PoisonError::into_inner);
            for (index, job) in jobs.into_iter().enumerate() {
                match (job.preset_error, job.task) {
                    (Some(err), _) => guard[index] = Some(Err(err)),
                    (None, Some(task)) => queue.push_back((index, task)),
                    (None, None) => guard[index] = Some(Ok(Vec::new())),
                }
            }
        }

        let lanes = self.limit.min(queue.len());
        tracing::debug!("job pool: {} jobs on {} lanes", total, lanes);

        let queue = Arc::new(Mutex::new(queue));
        let mut set = JoinSet::new();
        for lane in 0..lanes {
            let queue = queue.clone();
            let slots = slots.clone();
            set.spawn(async move {
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, task)) = next else {
                        break;
                    };
                    tracing::trace!(lane, job = index, "job started");
                    // A panic is confined to its own job; the lane keeps pulling
                    let outcome = AssertUnwindSafe(async move { task().await })
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| {
                            let reason = panic_message(payload.as_ref());
                            tracing::error!(lane, job = index, "{}", reason);
                            Err(InventoryError::JobAborted { index, reason })
                        });
                    slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(outcome);
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined {
                tracing::error!("job pool lane terminated abnormally: {}", err);
            }
        }

        let mut outcomes = std::mem::take(&mut *slots.lock().unwrap_or_else(PoisonError::into_inner));
        for (index, outcome) in outcomes.iter_mut().enumerate() {
            if outcome.is_none() {
                *outcome = Some(Err(InventoryError::JobAborted {
                    index,
                    reason: "lane terminated before the job reported".to_string(),
                }));
            }
        }
        self.outcomes = outcomes;
        self.ran = true;
    }

    /// Whether every job has reported
    pub fn completed(&self) -> bool {
        self.ran && self.outcomes.iter().all(Option::is_some)
    }

    /// True iff any job produced an error
    pub fn has_errors(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, Some(Err(_))))
    }

    /// Result of the job submitted at `index`
    pub fn result(&self, index: usize) -> Option<&[T]> {
        match self.outcomes.get(index) {
            Some(Some(Ok(items))) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Error of the job submitted at `index`
    pub fn error(&self, index: usize) -> Option<&InventoryError> {
        match self.outcomes.get(index) {
            Some(Some(Err(err))) => Some(err),
            _ => None,
        }
    }

    pub fn errors(&self) -> Vec<&InventoryError> {
        (0..self.outcomes.len()).filter_map(|i| self.error(i)).collect()
    }

    /// Per-job results in submission order, or every failure combined
    pub fn into_results(self) -> Result<Vec<Vec<T>>> {
        let mut results = Vec::with_capacity(self.outcomes.len());
        let mut errors = JobErrors::default();

        for (index, outcome) in self.outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(items)) => results.push(items),
                Some(Err(error)) => errors.failures.push(JobFailure { index, error }),
                None => errors.failures.push(JobFailure {
                    index,
                    error: InventoryError::JobAborted {
                        index,
                        reason: "pool was not run".to_string(),
                    },
                }),
            }
        }

        if errors.is_empty() {
            Ok(results)
        } else {
            Err(InventoryError::Jobs(errors))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(message) => format!("job panicked: {}", message),
        None => match payload.downcast_ref::<String>() {
            Some(message) => format!("job panicked: {}", message),
            None => "job panicked".to_string(),
        },
    }
}

/// Build a pool, run it, and return per-job results
pub async fn run_jobs<T: Send + 'static>(jobs: Vec<Job<T>>, limit: usize) -> Result<Vec<Vec<T>>> {
    let mut pool = JobPool::new(jobs, limit);
    pool.run().await;
    pool.into_results()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn sleeping_job(
        value: u32,
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    ) -> Job<u32> {
        Job::new(move || async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(vec![value])
        })
    }

    #[tokio::test]
    async fn test_limit_two_bounds_concurrency_and_waits_for_all() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let jobs = vec![
            sleeping_job(1, Duration::from_millis(10), in_flight.clone(), peak.clone(), finished.clone()),
            sleeping_job(2, Duration::from_millis(1), in_flight.clone(), peak.clone(), finished.clone()),
            sleeping_job(3, Duration::from_millis(10), in_flight.clone(), peak.clone(), finished.clone()),
        ];

        let started = Instant::now();
        let mut pool = JobPool::new(jobs, 2);
        pool.run().await;
        let elapsed = started.elapsed();

        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert!(pool.completed());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        // C can only start once B frees a lane
        assert!(elapsed >= Duration::from_millis(11), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_results_keep_submission_order() {
        let jobs: Vec<Job<u64>> = (0..6u64)
            .map(|i| {
                Job::new(move || async move {
                    tokio::time::sleep(Duration::from_millis(12 - 2 * i)).await;
                    Ok(vec![i, i * 10])
                })
            })
            .collect();

        let results = run_jobs(jobs, 3).await.unwrap();
        assert_eq!(results.len(), 6);
        for (i, items) in results.iter().enumerate() {
            assert_eq!(items, &vec![i as u64, i as u64 * 10]);
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();

        let jobs: Vec<Job<u32>> = vec![
            Job::new(|| async { Err(InventoryError::InvalidInput("boom".to_string())) }),
            Job::new(move || async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![7])
            }),
        ];

        let mut pool = JobPool::new(jobs, 2);
        pool.run().await;

        assert!(pool.has_errors());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(pool.result(1), Some(&[7u32][..]));
        assert!(pool.result(0).is_none());
        assert!(matches!(pool.error(0), Some(InventoryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_combined_error_keeps_all_messages() {
        let jobs: Vec<Job<u32>> = vec![
            Job::new(|| async { Err(InventoryError::InvalidInput("first".to_string())) }),
            Job::new(|| async { Ok(vec![1]) }),
            Job::new(|| async { Err(InventoryError::InvalidInput("second".to_string())) }),
        ];

        let err = run_jobs(jobs, 1).await.unwrap_err();
        let InventoryError::Jobs(errors) = err else {
            panic!("expected aggregated job errors");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.failures[0].index, 0);
        assert_eq!(errors.failures[1].index, 2);
        let text = errors.to_string();
        assert!(text.contains("first") && text.contains("second"));
    }

    #[tokio::test]
    async fn test_preset_error_job_is_not_executed() {
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = executed.clone();

        let mut preset = Job::new(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1u32])
        });
        preset.preset_error = Some(InventoryError::Config("no regions".to_string()));

        let mut pool = JobPool::new(vec![preset, Job::failed(InventoryError::Config("x".into()))], 4);
        pool.run().await;

        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(pool.errors().len(), 2);
    }

    async fn explode() -> Result<Vec<u32>> {
        panic!("lane blew up")
    }

    #[tokio::test]
    async fn test_panicking_job_is_reported_and_queue_drains() {
        for limit in [1, 2] {
            let jobs: Vec<Job<u32>> = vec![
                Job::new(explode),
                Job::new(|| async { Ok(vec![2]) }),
                Job::new(|| async { Ok(vec![3]) }),
            ];

            let mut pool = JobPool::new(jobs, limit);
            pool.run().await;

            let Some(InventoryError::JobAborted { index, reason }) = pool.error(0) else {
                panic!("limit {}: expected job 0 to be aborted", limit);
            };
            assert_eq!(*index, 0);
            assert!(reason.contains("lane blew up"), "{}", reason);
            assert_eq!(pool.result(1), Some(&[2u32][..]), "limit {}", limit);
            assert_eq!(pool.result(2), Some(&[3u32][..]), "limit {}", limit);
            assert_eq!(pool.errors().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_panic_in_last_job_on_single_lane() {
        let jobs: Vec<Job<u32>> = vec![Job::new(|| async { Ok(vec![1]) }), Job::new(explode)];

        let err = run_jobs(jobs, 1).await.unwrap_err();
        let InventoryError::Jobs(errors) = err else {
            panic!("expected aggregated job errors");
        };
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.failures[0].error, InventoryError::JobAborted { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let results = run_jobs::<u32>(Vec::new(), 5).await.unwrap();
        assert!(results.is_empty());
    }
}
