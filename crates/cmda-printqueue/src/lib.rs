//! Durable print delivery queue.
//!
//! Jobs survive process restarts via a JSON file rewritten atomically
//! (temp file + rename) on every mutation; a job leaves the queue only
//! when an agent acknowledges it. Dispatch lives in [`delivery`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use cmda_schemas::print::{PrintJob, PrintJobDraft};

mod delivery;

pub use delivery::{AgentHandle, AgentTransport, DeliveryReport, DispatchConfig, Dispatcher};

#[derive(Debug)]
pub enum QueueError {
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Io(e) => write!(f, "queue file I/O failed: {e}"),
            QueueError::Serde(e) => write!(f, "queue file is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<std::io::Error> for QueueError {
    fn from(e: std::io::Error) -> Self {
        QueueError::Io(e)
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serde(e)
    }
}

pub struct PrintQueue {
    path: PathBuf,
    jobs: Mutex<Vec<PrintJob>>,
    seq: AtomicU64,
}

impl PrintQueue {
    /// Open (or create) the queue backed by `path`. Pending jobs from a
    /// previous process are reloaded.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        let jobs: Vec<PrintJob> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if !jobs.is_empty() {
            info!(pending = jobs.len(), path = %path.display(), "reloaded print queue");
        }
        Ok(PrintQueue {
            path,
            jobs: Mutex::new(jobs),
            seq: AtomicU64::new(0),
        })
    }

    /// Append a job and persist. The returned job carries its assigned id.
    pub async fn enqueue(&self, draft: PrintJobDraft) -> Result<PrintJob, QueueError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let job = PrintJob {
            id: format!("pq-{}-{}", Utc::now().timestamp_millis(), seq),
            company_id: draft.company_id,
            target_store_id: draft.target_store_id,
            order_external_id: draft.order_external_id,
            payload: draft.payload,
            created_at_utc: Utc::now(),
            delivered: false,
            delivered_at_utc: None,
        };

        let mut jobs = self.jobs.lock().await;
        jobs.push(job.clone());
        self.persist(&jobs).await?;
        debug!(job_id = %job.id, company_id = %job.company_id, "print job enqueued");
        Ok(job)
    }

    pub async fn pending(&self) -> Vec<PrintJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn pending_for_company(&self, company_id: &str) -> Vec<PrintJob> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.company_id == company_id)
            .cloned()
            .collect()
    }

    /// Remove an acknowledged job. Returns the job stamped as delivered,
    /// or `None` when the id is unknown (already acknowledged elsewhere).
    pub async fn mark_delivered(&self, job_id: &str) -> Result<Option<PrintJob>, QueueError> {
        let mut jobs = self.jobs.lock().await;
        let Some(idx) = jobs.iter().position(|j| j.id == job_id) else {
            return Ok(None);
        };
        let mut job = jobs.remove(idx);
        job.delivered = true;
        job.delivered_at_utc = Some(Utc::now());
        self.persist(&jobs).await?;
        debug!(job_id, "print job acknowledged");
        Ok(Some(job))
    }

    /// Atomic rewrite: serialize to a sibling temp file, then rename over
    /// the live file so a crash never leaves a torn queue.
    async fn persist(&self, jobs: &[PrintJob]) -> Result<(), QueueError> {
        let bytes = serde_json::to_vec_pretty(jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmda_schemas::print::RenderedTicket;
    use serde_json::json;

    fn draft(company: &str, store: Option<&str>, order: &str) -> PrintJobDraft {
        PrintJobDraft {
            company_id: company.to_string(),
            target_store_id: store.map(str::to_string),
            order_external_id: order.to_string(),
            payload: RenderedTicket {
                ticket_text: format!("TICKET {order}"),
                order_summary: json!({ "externalId": order }),
            },
        }
    }

    #[tokio::test]
    async fn enqueue_assigns_distinct_ordered_ids() {
        let dir = tempfile::tempdir().unwrap();
        let q = PrintQueue::open(dir.path().join("queue.json")).await.unwrap();
        let a = q.enqueue(draft("co", None, "o1")).await.unwrap();
        let b = q.enqueue(draft("co", None, "o2")).await.unwrap();
        assert!(a.id.starts_with("pq-"));
        assert_ne!(a.id, b.id);
        assert_eq!(q.pending().await.len(), 2);
    }

    #[tokio::test]
    async fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let q = PrintQueue::open(&path).await.unwrap();
        q.enqueue(draft("co", Some("s1"), "o1")).await.unwrap();
        drop(q);

        let q = PrintQueue::open(&path).await.unwrap();
        let pending = q.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_external_id, "o1");
        assert_eq!(pending[0].target_store_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn mark_delivered_removes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let q = PrintQueue::open(&path).await.unwrap();
        let job = q.enqueue(draft("co", None, "o1")).await.unwrap();

        let acked = q.mark_delivered(&job.id).await.unwrap().unwrap();
        assert!(acked.delivered);
        assert!(acked.delivered_at_utc.is_some());
        assert!(q.pending().await.is_empty());

        // Unknown id is a no-op, not an error.
        assert!(q.mark_delivered(&job.id).await.unwrap().is_none());

        let q = PrintQueue::open(&path).await.unwrap();
        assert!(q.pending().await.is_empty());
    }

    #[tokio::test]
    async fn pending_for_company_filters() {
        let dir = tempfile::tempdir().unwrap();
        let q = PrintQueue::open(dir.path().join("queue.json")).await.unwrap();
        q.enqueue(draft("co-a", None, "o1")).await.unwrap();
        q.enqueue(draft("co-b", None, "o2")).await.unwrap();
        let a = q.pending_for_company("co-a").await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].order_external_id, "o1");
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let q = PrintQueue::open(dir.path().join("absent.json")).await.unwrap();
        assert!(q.pending().await.is_empty());
    }
}
