//! Bounded-concurrency publisher.
//!
//! Work items are queued without limit; a dispatcher task pulls them off the
//! queue and runs at most `max_parallelism` of them at once. Each item is
//! either skipped as a duplicate, published (create or update-by-id) with
//! retries on transient failures, or recorded as failed. Completion drains the
//! queue and every in-flight request before reporting.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use octofhir_core::{CoreError, FhirDateTime, now_utc, resource_id_of, resource_type_of};
use octofhir_storage::{ContentHash, DedupKey, DynDedupStore, content_hash};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::audit::AuditWriter;
use crate::client::{UpstreamResponse, UpstreamStore};
use crate::error::{ClientError, LoaderError, PublishError};
use crate::metrics::MetricsCollector;
use crate::observability::Observability;
use crate::retry::RetryPolicy;

/// One resource to publish.
#[derive(Debug, Clone)]
pub struct WorkItem {
    resource: Value,
    resource_type: String,
    id: Option<String>,
}

impl WorkItem {
    /// # Errors
    ///
    /// Returns `CoreError::InvalidResource` if `resourceType` is missing.
    pub fn from_resource(resource: Value) -> Result<Self, CoreError> {
        let resource_type = resource_type_of(&resource)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::invalid_resource("resource has no resourceType"))?
            .to_string();
        let id = resource_id_of(&resource).map(str::to_string);
        Ok(Self {
            resource,
            resource_type,
            id,
        })
    }

    /// Items with an id are sent as idempotent updates.
    pub fn has_persisted_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn resource(&self) -> &Value {
        &self.resource
    }

    fn dedup_key(&self) -> Option<DedupKey> {
        self.id
            .as_ref()
            .map(|id| DedupKey::new(&self.resource_type, id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Published,
    Skipped,
    Failed,
}

impl OutcomeKind {
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            Self::Published
        } else {
            Self::Failed
        }
    }

    /// Skips count toward run success.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Published | Self::Skipped)
    }
}

/// Immutable record of one work item's final result.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub kind: OutcomeKind,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Final upstream status; absent for skips and transport failures
    pub status: Option<u16>,
    pub attempts: u32,
    /// Backoff waits taken before the final attempt
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<Uuid>,
    pub timestamp: FhirDateTime,
}

impl PublishOutcome {
    pub fn new(
        kind: OutcomeKind,
        resource_type: impl Into<String>,
        id: Option<String>,
        status: Option<u16>,
        attempts: u32,
        artifact_id: Option<Uuid>,
    ) -> Self {
        Self {
            kind,
            resource_type: resource_type.into(),
            id,
            status,
            attempts,
            retries: 0,
            artifact_id,
            timestamp: now_utc(),
        }
    }
}

/// Totals reported once the pool has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub submitted: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Upstream requests issued, retries included
    pub requests: usize,
    /// Backoff waits taken across all items
    pub retries: usize,
}

impl PoolReport {
    pub fn succeeded(&self) -> usize {
        self.published + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.succeeded() == self.submitted
    }

    fn absorb(&mut self, joined: Result<PublishOutcome, JoinError>) {
        match joined {
            Ok(outcome) => {
                self.requests += outcome.attempts as usize;
                self.retries += outcome.retries as usize;
                match outcome.kind {
                    OutcomeKind::Published => self.published += 1,
                    OutcomeKind::Skipped => self.skipped += 1,
                    OutcomeKind::Failed => self.failed += 1,
                }
            }
            Err(e) => {
                error!(error = %e, "Publish task panicked");
                self.failed += 1;
            }
        }
    }
}

/// Shared collaborators of every worker.
#[derive(Clone)]
pub struct PublisherContext {
    pub upstream: Arc<dyn UpstreamStore>,
    pub dedup: DynDedupStore,
    pub metrics: Arc<MetricsCollector>,
    pub audit: Arc<AuditWriter>,
    pub observability: Arc<Observability>,
    pub retry: RetryPolicy,
    pub max_parallelism: usize,
}

/// Final result of one item's request loop.
struct Delivery {
    result: Result<UpstreamResponse, ClientError>,
    /// Requests issued
    attempts: u32,
    /// Backoff sleeps between them
    waits: u32,
}

struct Worker {
    ctx: PublisherContext,
    key_locks: DashMap<DedupKey, Arc<Mutex<()>>>,
}

/// Handle to a running pool.
pub struct PublishWorkerPool {
    queue: mpsc::UnboundedSender<WorkItem>,
    dispatcher: JoinHandle<PoolReport>,
}

impl PublishWorkerPool {
    pub fn start(ctx: PublisherContext) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let parallelism = ctx.max_parallelism.max(1);
        let worker = Arc::new(Worker {
            ctx,
            key_locks: DashMap::new(),
        });
        let dispatcher = tokio::spawn(dispatch(worker, rx, parallelism));
        Self { queue, dispatcher }
    }

    /// Queues an item; never waits for capacity.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::PoolClosed` if the dispatcher is gone.
    pub fn submit(&self, item: WorkItem) -> Result<(), LoaderError> {
        self.queue
            .send(item)
            .map_err(|_| LoaderError::PoolClosed("submission queue closed".into()))
    }

    /// Signals end of input and waits for all queued and in-flight work.
    pub async fn complete(self) -> Result<PoolReport, LoaderError> {
        drop(self.queue);
        self.dispatcher
            .await
            .map_err(|e| LoaderError::PoolClosed(e.to_string()))
    }
}

async fn dispatch(
    worker: Arc<Worker>,
    mut rx: mpsc::UnboundedReceiver<WorkItem>,
    parallelism: usize,
) -> PoolReport {
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let mut tasks = JoinSet::new();
    let mut report = PoolReport::default();

    while let Some(item) = rx.recv().await {
        report.submitted += 1;

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let worker = Arc::clone(&worker);
        tasks.spawn(async move {
            let _permit = permit;
            worker.process(item).await
        });

        while let Some(joined) = tasks.try_join_next() {
            report.absorb(joined);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        report.absorb(joined);
    }

    debug!(
        submitted = report.submitted,
        published = report.published,
        skipped = report.skipped,
        failed = report.failed,
        retries = report.retries,
        "Publish queue drained"
    );
    report
}

impl Worker {
    async fn process(&self, item: WorkItem) -> PublishOutcome {
        let Some(key) = item.dedup_key() else {
            return self.publish(&item, None).await;
        };

        let hash = content_hash(item.resource());
        let lock = Arc::clone(self.key_locks.entry(key.clone()).or_default().value());
        let outcome = {
            let _guard = lock.lock().await;
            match self.ctx.dedup.lookup(&key).await {
                Ok(Some(stored)) if stored == hash => self.skip(&item).await,
                Ok(_) => self.publish(&item, Some((&key, hash))).await,
                Err(e) => {
                    warn!(key = %key, error = %e, "Dedup lookup failed, publishing anyway");
                    self.publish(&item, Some((&key, hash))).await
                }
            }
        };

        drop(lock);
        self.key_locks
            .remove_if(&key, |_, l| Arc::strong_count(l) == 1);
        outcome
    }

    async fn skip(&self, item: &WorkItem) -> PublishOutcome {
        self.ctx.metrics.collect(Instant::now(), true);
        debug!(
            resource_type = %item.resource_type,
            id = item.id().unwrap_or_default(),
            "Skipping unchanged resource"
        );

        let outcome = PublishOutcome::new(
            OutcomeKind::Skipped,
            &item.resource_type,
            item.id.clone(),
            None,
            0,
            None,
        );
        self.record(&outcome).await;
        outcome
    }

    async fn publish(&self, item: &WorkItem, dedup: Option<(&DedupKey, ContentHash)>) -> PublishOutcome {
        let Delivery {
            result,
            attempts,
            waits,
        } = self.send_with_retry(item).await;
        let success = matches!(&result, Ok(resp) if resp.is_success());
        self.ctx.metrics.collect(Instant::now(), success);

        let (status, body) = match &result {
            Ok(resp) => (Some(resp.status), resp.body.clone()),
            Err(e) => (None, e.to_string()),
        };

        if !success && self.ctx.observability.verbose() {
            let diagnostics = result.as_ref().ok().and_then(UpstreamResponse::diagnostics);
            error!(
                resource_type = %item.resource_type,
                status = ?status,
                diagnostics = ?diagnostics,
                body = %body,
                "Publish error"
            );
        } else if !success {
            warn!(
                resource_type = %item.resource_type,
                id = item.id().unwrap_or_default(),
                status = ?status,
                attempts,
                "Publish failed"
            );
        }

        let artifact_id = match self.ctx.audit.write_artifact(&body).await {
            Ok((id, _)) => Some(id),
            Err(e) => {
                error!(error = %e, "Failed to write response artifact");
                None
            }
        };

        if success {
            if let Some((key, hash)) = dedup {
                if let Err(e) = self.ctx.dedup.put(key, hash).await {
                    warn!(key = %key, error = %e, "Failed to record dedup hash");
                }
            }
        }

        let kind = if success {
            OutcomeKind::Published
        } else {
            OutcomeKind::Failed
        };
        let mut outcome = PublishOutcome::new(
            kind,
            &item.resource_type,
            item.id.clone(),
            status,
            attempts,
            artifact_id,
        );
        outcome.retries = waits;
        self.record(&outcome).await;
        outcome
    }

    /// Sends the item, retrying transient failures on the jittered schedule.
    ///
    async fn send_with_retry(&self, item: &WorkItem) -> Delivery {
        let delays = self.ctx.retry.delays();
        let mut attempt: u32 = 0;
        let mut waits: u32 = 0;

        loop {
            attempt += 1;
            let result = match item.id() {
                Some(id) => {
                    self.ctx
                        .upstream
                        .update(&item.resource_type, id, &item.resource)
                        .await
                }
                None => {
                    self.ctx
                        .upstream
                        .create(&item.resource_type, &item.resource)
                        .await
                }
            };

            let transient = match &result {
                Ok(resp) if resp.is_success() => {
                    return Delivery {
                        result,
                        attempts: attempt,
                        waits,
                    };
                }
                Ok(resp) => PublishError::from_status(resp.status).is_transient(),
                Err(e) => e.is_transient(),
            };
            let Some(delay) = delays.get(attempt as usize - 1).filter(|_| transient) else {
                return Delivery {
                    result,
                    attempts: attempt,
                    waits,
                };
            };

            match &result {
                Ok(resp) => warn!(
                    status = resp.status,
                    wait = ?delay,
                    retry = attempt,
                    "Request failed. Waiting before next retry"
                ),
                Err(e) => warn!(
                    error = %e,
                    wait = ?delay,
                    retry = attempt,
                    "Request failed. Waiting before next retry"
                ),
            }
            waits += 1;
            tokio::time::sleep(*delay).await;
        }
    }

    async fn record(&self, outcome: &PublishOutcome) {
        if let Err(e) = self.ctx.audit.record(outcome).await {
            error!(error = %e, "Failed to append publish outcome");
        }
    }
}
