//! Bounded background work queue for fire-and-forget side effects.
//!
//! Outbound email and audit records never block or fail the request
//! that produced them. Jobs are pushed onto a bounded channel and run
//! on their own tasks under a timeout, at most `capacity` at a time.
//! While every slot is busy the channel fills up, and once it is full
//! new jobs are dropped. Failures are logged and dropped too. Anything
//! in flight is lost on crash.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::{debug, warn};

use crate::error::{WardenError, WardenResult};
use crate::models::audit::CreateAuditLogEntry;
use crate::outbound::{AuditSink, EmailSender};

type Job = Pin<Box<dyn Future<Output = WardenResult<()>> + Send + 'static>>;

struct Envelope {
    label: &'static str,
    job: Job,
}

/// Queue sizing and per-job time budget.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Jobs that may wait in the queue, and jobs that may run at once.
    pub capacity: usize,
    /// Time budget for a single job (default: 5 seconds).
    pub job_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            job_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`Dispatcher`]. Both sinks are required.
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    audit: Option<Arc<dyn AuditSink>>,
    mailer: Option<Arc<dyn EmailSender>>,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.mailer = Some(sender);
        self
    }

    /// Spawn the worker. Must be called from within a Tokio runtime.
    pub fn start(self) -> WardenResult<Dispatcher> {
        let audit = self
            .audit
            .ok_or_else(|| WardenError::Configuration("dispatcher requires an audit sink".into()))?;
        let mailer = self.mailer.ok_or_else(|| {
            WardenError::Configuration("dispatcher requires an email sender".into())
        })?;
        if self.config.capacity == 0 {
            return Err(WardenError::Configuration(
                "dispatcher capacity must be positive".into(),
            ));
        }

        let (tx, rx) = mpsc::channel(self.config.capacity);
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        tokio::spawn(run_worker(
            rx,
            Arc::new(Semaphore::new(self.config.capacity)),
            self.config.job_timeout,
            pending.clone(),
            idle.clone(),
        ));

        Ok(Dispatcher {
            tx,
            pending,
            idle,
            audit,
            mailer,
        })
    }
}

/// Handle for submitting background jobs. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Envelope>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    audit: Arc<dyn AuditSink>,
    mailer: Arc<dyn EmailSender>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Queue an arbitrary job. Returns `false` if it was dropped.
    pub fn submit<F>(&self, label: &'static str, job: F) -> bool
    where
        F: Future<Output = WardenResult<()>> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope {
            label,
            job: Box::pin(job),
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!(label, error = %e, "Background queue rejected job, dropping it");
                self.finish_one();
                false
            }
        }
    }

    /// Queue an activity record for the audit sink.
    pub fn audit(&self, entry: CreateAuditLogEntry) -> bool {
        let sink = self.audit.clone();
        self.submit("audit", async move { sink.log_activity(entry).await })
    }

    /// Queue an outbound email.
    pub fn email(&self, to: &str, subject: &str, html_body: String) -> bool {
        let mailer = self.mailer.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        self.submit("email", async move {
            mailer.send(&to, &subject, &html_body).await
        })
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every submitted job has finished.
    pub async fn flush(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn finish_one(&self) {
        release(&self.pending, &self.idle);
    }
}

fn release(pending: &AtomicUsize, idle: &Notify) {
    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
        idle.notify_waiters();
    }
}

/// Takes a running slot before pulling the next job, so the channel
/// backs up while every slot is busy.
async fn run_worker(
    mut rx: mpsc::Receiver<Envelope>,
    slots: Arc<Semaphore>,
    job_timeout: Duration,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
) {
    loop {
        let Ok(slot) = slots.clone().acquire_owned().await else {
            break;
        };
        let Some(Envelope { label, job }) = rx.recv().await else {
            break;
        };
        let pending = pending.clone();
        let idle = idle.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(job_timeout, job).await {
                Ok(Ok(())) => debug!(label, "Background job completed"),
                Ok(Err(e)) => warn!(label, error = %e, "Background job failed"),
                Err(_) => warn!(label, timeout = ?job_timeout, "Background job timed out"),
            }
            drop(slot);
            release(&pending, &idle);
        });
    }
    debug!("Background queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        entries: Mutex<Vec<CreateAuditLogEntry>>,
        mails: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuditSink for Recorder {
        async fn log_activity(&self, entry: CreateAuditLogEntry) -> WardenResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    #[async_trait]
    impl EmailSender for Recorder {
        async fn send(&self, to: &str, _subject: &str, _html: &str) -> WardenResult<()> {
            self.mails.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl EmailSender for FailingMailer {
        async fn send(&self, _to: &str, _subject: &str, _html: &str) -> WardenResult<()> {
            Err(WardenError::Internal("smtp down".into()))
        }
    }

    fn start(recorder: Arc<Recorder>, config: DispatcherConfig) -> Dispatcher {
        Dispatcher::builder()
            .config(config)
            .audit_sink(recorder.clone())
            .email_sender(recorder)
            .start()
            .unwrap()
    }

    #[tokio::test]
    async fn audit_and_email_are_delivered() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = start(recorder.clone(), DispatcherConfig::default());

        assert!(dispatcher.audit(CreateAuditLogEntry::new("user", Uuid::new_v4(), "create")));
        assert!(dispatcher.email("a@x.com", "hi", "<p>hi</p>".into()));
        dispatcher.flush().await;

        assert_eq!(recorder.entries.lock().unwrap().len(), 1);
        assert_eq!(recorder.mails.lock().unwrap().as_slice(), ["a@x.com"]);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn slow_jobs_time_out_without_wedging_the_queue() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = start(
            recorder,
            DispatcherConfig {
                capacity: 8,
                job_timeout: Duration::from_millis(20),
            },
        );

        dispatcher.submit("slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        tokio::time::timeout(Duration::from_secs(2), dispatcher.flush())
            .await
            .expect("flush should finish once the slow job times out");
    }

    #[tokio::test]
    async fn full_queue_rejects_new_jobs() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = start(
            recorder,
            DispatcherConfig {
                capacity: 1,
                job_timeout: Duration::from_millis(50),
            },
        );

        let accepted = (0..200)
            .filter(|_| {
                dispatcher.submit("slow", async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
            })
            .count();
        // One running, one queued, and none while the test holds the thread.
        assert!((1..=2).contains(&accepted), "accepted {accepted}");
        assert_eq!(dispatcher.in_flight(), accepted);

        tokio::time::timeout(Duration::from_secs(2), dispatcher.flush())
            .await
            .expect("queue drains once the slow jobs time out");
        assert!(dispatcher.submit("after", async { Ok(()) }));
        dispatcher.flush().await;
    }

    #[tokio::test]
    async fn running_jobs_are_capped_at_capacity() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = start(
            recorder,
            DispatcherConfig {
                capacity: 2,
                job_timeout: Duration::from_secs(5),
            },
        );
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut accepted = 0;
        for _ in 0..10 {
            let running = running.clone();
            let peak = peak.clone();
            let queued = dispatcher.submit("count", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
            if queued {
                accepted += 1;
            }
            tokio::task::yield_now().await;
        }
        dispatcher.flush().await;

        assert!(accepted >= 2);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failing_sender_is_swallowed() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::builder()
            .audit_sink(recorder)
            .email_sender(Arc::new(FailingMailer))
            .start()
            .unwrap();

        assert!(dispatcher.email("a@x.com", "hi", String::new()));
        dispatcher.flush().await;
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn builder_requires_sinks() {
        let result = Dispatcher::builder()
            .email_sender(Arc::new(FailingMailer))
            .start();
        assert!(matches!(result, Err(WardenError::Configuration(_))));
    }
}
