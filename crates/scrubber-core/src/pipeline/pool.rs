//! Bounded worker pool.
//!
//! Every job gets its own tokio task, but a task only starts work after
//! taking an owned semaphore permit. The permit lives inside the task, so
//! it is released when the job finishes, returns early, or panics.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// How a pooled job ended.
#[derive(Debug)]
pub enum Completion<T> {
    /// The job ran to completion and produced a value
    Finished(T),
    /// Cancellation was observed before the job got a slot
    Cancelled,
    /// The job's task panicked or was aborted
    Panicked(String),
}

/// Runs jobs with at most `size` in flight at once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` worker slots (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Concurrency ceiling.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held by a running job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` over every job and wait for all of them.
    ///
    /// The returned vector is aligned with `jobs`: entry `i` is the
    /// completion of `jobs[i]`, whatever order the jobs finished in. A
    /// failing or panicking job never stops its siblings.
    pub async fn run<J, T, F, Fut>(
        &self,
        jobs: Vec<J>,
        cancel: &CancellationToken,
        work: F,
    ) -> Vec<Completion<T>>
    where
        J: Send + 'static,
        T: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let work = Arc::new(work);
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let permits = self.permits.clone();
            let cancel = cancel.clone();
            let work = work.clone();

            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Completion::Cancelled,
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Completion::Cancelled,
                    },
                };
                let output = work(job).await;
                drop(permit);
                Completion::Finished(output)
            }));
        }

        let mut completions = Vec::with_capacity(handles.len());
        for handle in handles {
            completions.push(match handle.await {
                Ok(completion) => completion,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    tracing::error!("Worker panicked: {message}");
                    Completion::Panicked(message)
                }
                Err(e) => {
                    tracing::error!("Worker task failed: {e}");
                    Completion::Panicked(e.to_string())
                }
            });
        }
        completions
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_size_is_clamped() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounds_concurrency() {
        let pool = WorkerPool::new(3);
        let in_flight = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let counters = (in_flight.clone(), peak.clone());
        let completions = pool
            .run((0..12).collect(), &CancellationToken::new(), move |n: u32| {
                let (in_flight, peak) = counters.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    n * 2
                }
            })
            .await;

        assert_eq!(completions.len(), 12);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "pool exceeded its ceiling: {peak}");
        assert!(peak >= 2, "jobs never overlapped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_results_follow_job_order() {
        let pool = WorkerPool::new(4);
        // Earlier jobs sleep longer, so they finish last
        let completions = pool
            .run((0..8u64).collect(), &CancellationToken::new(), |n| async move {
                tokio::time::sleep(Duration::from_millis(5 * (8 - n))).await;
                n
            })
            .await;

        let values: Vec<u64> = completions
            .into_iter()
            .map(|c| match c {
                Completion::Finished(v) => v,
                other => panic!("unexpected completion: {other:?}"),
            })
            .collect();
        assert_eq!(values, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panic_is_isolated_and_slot_released() {
        let pool = WorkerPool::new(1);
        let completions = pool
            .run((0..4u32).collect(), &CancellationToken::new(), |n| async move {
                if n == 1 {
                    panic!("boom on {n}");
                }
                n
            })
            .await;

        assert!(matches!(completions[0], Completion::Finished(0)));
        match &completions[1] {
            Completion::Panicked(message) => assert!(message.contains("boom on 1")),
            other => panic!("expected panic, got {other:?}"),
        }
        // With a single slot, the jobs after the panic still ran
        assert!(matches!(completions[2], Completion::Finished(2)));
        assert!(matches!(completions[3], Completion::Finished(3)));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_before_start() {
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ran = Arc::new(AtomicU32::new(0));
        let ran_clone = ran.clone();
        let completions = pool
            .run((0..5u32).collect(), &cancel, move |n| {
                let ran = ran_clone.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    n
                }
            })
            .await;

        assert_eq!(completions.len(), 5);
        assert!(completions
            .iter()
            .all(|c| matches!(c, Completion::Cancelled)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = WorkerPool::new(2);
        let completions = pool
            .run(Vec::<u32>::new(), &CancellationToken::new(), |n| async move { n })
            .await;
        assert!(completions.is_empty());
    }
}
