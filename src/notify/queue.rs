use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::{Notification, Notifier};

/// Identifier handed back to producers when a job is accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    fn generate() -> Self {
        Self(format!("job_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors returned when a job cannot be accepted
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("notification queue at capacity")]
    Full,
    #[error("notification queue is shut down")]
    Closed,
}

/// Exponential backoff for failed sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` failed attempts
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Job {
    id: JobId,
    notification: Notification,
}

/// Producer side of the notification worker pool
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Job>,
}

/// Worker tasks consuming a [`NotificationQueue`]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl NotificationQueue {
    /// Spawn `workers` tasks sharing one bounded channel of `capacity` jobs.
    ///
    /// Workers exit once every queue clone has been dropped and the channel
    /// is drained.
    pub fn start(
        notifier: Arc<dyn Notifier>,
        workers: usize,
        capacity: usize,
        retry: RetryPolicy,
    ) -> (Self, WorkerPool) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    rx.clone(),
                    notifier.clone(),
                    retry.clone(),
                ))
            })
            .collect();

        (Self { tx }, WorkerPool { handles })
    }

    /// Accept a notification for background delivery without waiting
    pub fn enqueue(&self, notification: Notification) -> Result<JobId, QueueError> {
        let id = JobId::generate();
        let job = Job {
            id: id.clone(),
            notification,
        };

        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;

        tracing::debug!(job = %id, "notification enqueued");
        Ok(id)
    }
}

#[cfg(test)]
impl NotificationQueue {
    /// A queue whose workers are already gone
    pub(crate) fn closed() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}

impl WorkerPool {
    /// Wait for all workers to finish
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Notification worker panicked: {}", e);
            }
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
) {
    loop {
        let job = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };

        let Some(job) = job else { break };

        deliver(worker, job, notifier.as_ref(), &retry).await;
    }
}

async fn deliver(worker: usize, job: Job, notifier: &dyn Notifier, retry: &RetryPolicy) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match notifier.send(&job.notification).await {
            Ok(message_id) => {
                tracing::info!(
                    worker,
                    job = %job.id,
                    channel = job.notification.channel(),
                    message_id = %message_id,
                    attempt,
                    "notification sent"
                );
                return;
            }
            Err(e) if attempt < retry.max_attempts => {
                let delay = retry.delay_for(attempt);
                tracing::warn!(
                    worker,
                    job = %job.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "notification send failed, retrying: {:#}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    worker,
                    job = %job.id,
                    channel = job.notification.channel(),
                    to = %job.notification.recipient(),
                    attempt,
                    "notification dropped after retries: {:#}",
                    e
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Fails the first `failures` sends, then records
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        sent: StdMutex<Vec<Notification>>,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                sent: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Notifier for Flaky {
        async fn send(&self, notification: &Notification) -> anyhow::Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                anyhow::bail!("provider unavailable");
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(format!("msg-{}", call))
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn sms(to: &str) -> Notification {
        Notification::Sms {
            to: to.to_string(),
            body: "dashboard stalled".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_jobs_delivered_by_pool() {
        let notifier = Flaky::new(0);
        let (queue, pool) = NotificationQueue::start(notifier.clone(), 3, 16, fast_retry(1));

        let a = queue.enqueue(sms("+15550100")).unwrap();
        let b = queue.enqueue(sms("+15550101")).unwrap();
        assert_ne!(a, b);

        drop(queue);
        pool.join().await;

        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_is_retried() {
        let notifier = Flaky::new(2);
        let (queue, pool) = NotificationQueue::start(notifier.clone(), 1, 4, fast_retry(3));

        queue.enqueue(sms("+15550100")).unwrap();
        drop(queue);
        pool.join().await;

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let notifier = Flaky::new(10);
        let (queue, pool) = NotificationQueue::start(notifier.clone(), 1, 4, fast_retry(2));

        queue.enqueue(sms("+15550100")).unwrap();
        drop(queue);
        pool.join().await;

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        // No workers: nothing drains the channel
        let (tx, rx) = mpsc::channel(1);
        let queue = NotificationQueue { tx };

        queue.enqueue(sms("+15550100")).unwrap();
        assert_eq!(queue.enqueue(sms("+15550101")), Err(QueueError::Full));

        drop(rx);
        assert_eq!(queue.enqueue(sms("+15550102")), Err(QueueError::Closed));
    }
}
