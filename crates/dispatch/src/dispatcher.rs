//! Distribution and failover across the credential pool
//!
//! Two strategies, chosen by the relative sizes of the batch and the pool:
//!
//! - **Small batch** (`items < credentials`): credentials are abundant, so
//!   find one that works. Credentials are tried sequentially in shuffled
//!   order; on each, every item fans out concurrently. The first quota
//!   signal abandons the credential for the whole batch (including items
//!   that succeeded under it) and moves on. A permanent failure aborts the
//!   batch outright: it is intrinsic to the request, and replaying it would
//!   only burn more quota.
//! - **Partitioned** (`items >= credentials`): work is abundant, so maximize
//!   parallelism. Items are split into contiguous chunks of
//!   `ceil(items / credentials)` and one task per (credential, chunk) runs
//!   in parallel, each chunk sequentially within its task. A quota signal
//!   returns the entire chunk for retry on the credentials that were never
//!   assigned one; a permanent failure fails only its item.
//!
//! Per-chunk state is explicit in [`ChunkOutcome`]: a chunk either completes
//! with one terminal result per item, or comes back whole for retry. The
//! join step is a barrier: dispatch returns only after every launched task
//! has resolved, and output order always matches input order.
//!
//! Tasks live in a [`JoinSet`], so dropping the dispatch future (caller
//! timeout) aborts in-flight work; a task that fails to join reports its
//! items as cancelled rather than silently dropping them.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use keypool::{
    CooldownTracker, Credential, CredentialPool, FailureKind, UpstreamError, classify,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::notify::Notifier;

/// Terminal outcome for one work item: a value or a [`TerminalFailure`].
pub type ItemResult<V> = std::result::Result<V, TerminalFailure>;

/// Why an item ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The upstream rejected the request itself; no credential would help.
    Upstream,
    /// Every usable credential hit its quota before the item completed.
    PoolExhausted,
    /// The executing task was aborted or panicked before reporting.
    Cancelled,
}

impl FailureReason {
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::Upstream => "upstream",
            FailureReason::PoolExhausted => "pool_exhausted",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

/// Final error for one work item, carrying the failure class and the text
/// of the underlying error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl TerminalFailure {
    fn upstream(error: &UpstreamError) -> Self {
        Self {
            reason: FailureReason::Upstream,
            message: error.to_string(),
        }
    }

    fn pool_exhausted(message: &str) -> Self {
        Self {
            reason: FailureReason::PoolExhausted,
            message: message.to_owned(),
        }
    }

    fn cancelled(message: String) -> Self {
        Self {
            reason: FailureReason::Cancelled,
            message,
        }
    }
}

impl fmt::Display for TerminalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason.label(), self.message)
    }
}

impl std::error::Error for TerminalFailure {}

/// Outcome of running one chunk of items on a single credential.
enum ChunkOutcome<I, V> {
    /// Every item reached a terminal state on this credential.
    Completed(Vec<(usize, ItemResult<V>)>),
    /// The credential signalled quota exhaustion. The whole chunk comes
    /// back for retry, items that had already succeeded included; the
    /// credential is untrusted for the rest of this dispatch.
    QuotaExhausted { items: Vec<(usize, I)> },
}

/// Distributes a batch of work items across the credential pool.
///
/// The pool is read-only for the lifetime of the dispatcher; every
/// `dispatch` call starts from the full pool with its own shuffled order.
/// An optional [`CooldownTracker`] moves recently exhausted credentials to
/// the back of that order.
pub struct Dispatcher {
    pool: CredentialPool,
    notifier: Arc<dyn Notifier>,
    cooldowns: Option<Arc<CooldownTracker>>,
}

impl Dispatcher {
    pub fn new(pool: CredentialPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pool,
            notifier,
            cooldowns: None,
        }
    }

    /// Remember quota-exhausted credentials across dispatch calls and try
    /// them last while they cool down.
    pub fn with_cooldowns(mut self, cooldowns: Arc<CooldownTracker>) -> Self {
        self.cooldowns = Some(cooldowns);
        self
    }

    /// Execute `items` against the pool, returning one result per item in
    /// input order.
    ///
    /// `execute` performs a single upstream call for one item with one
    /// credential; its error must carry whatever status/message the
    /// upstream gave so failures classify correctly.
    ///
    /// Returns [`Error::EmptyPool`] before any upstream call when the pool
    /// holds no credentials.
    pub async fn dispatch<I, V, E, Fut>(&self, items: Vec<I>, execute: E) -> Result<Vec<ItemResult<V>>>
    where
        I: Clone + Send + Sync + 'static,
        V: Send + 'static,
        E: Fn(I, Credential) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, UpstreamError>> + Send + 'static,
    {
        if self.pool.is_empty() {
            warn!("dispatch attempted with an empty credential pool");
            self.notifier
                .notify("dispatch aborted: credential pool is empty");
            return Err(Error::EmptyPool);
        }
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let order = self.credential_order();
        if items.len() < order.len() {
            metrics::record_batch("small_batch", items.len());
            Ok(self.run_small_batch(order, items, execute).await)
        } else {
            metrics::record_batch("partitioned", items.len());
            Ok(self.run_partitioned(order, items, execute).await)
        }
    }

    /// Shuffled credential order for one dispatch call, with cooling
    /// credentials moved to the back when a tracker is configured.
    fn credential_order(&self) -> Vec<Credential> {
        let shuffled = self.pool.shuffled();
        match &self.cooldowns {
            Some(tracker) => {
                let (cooling, available): (Vec<_>, Vec<_>) =
                    shuffled.into_iter().partition(|c| tracker.is_cooling(c));
                let mut order = available;
                order.extend(cooling);
                order
            }
            None => shuffled,
        }
    }

    /// Small-batch strategy: one credential at a time, all items at once.
    async fn run_small_batch<I, V, E, Fut>(
        &self,
        order: Vec<Credential>,
        items: Vec<I>,
        execute: E,
    ) -> Vec<ItemResult<V>>
    where
        I: Clone + Send + 'static,
        V: Send + 'static,
        E: Fn(I, Credential) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, UpstreamError>> + Send + 'static,
    {
        for credential in order {
            debug!(
                credential = credential.index(),
                items = items.len(),
                "fanning batch out on credential"
            );

            let mut set = JoinSet::new();
            let mut task_index: HashMap<tokio::task::Id, usize> = HashMap::new();
            for (idx, item) in items.iter().enumerate() {
                let execute = execute.clone();
                let item = item.clone();
                let credential = credential.clone();
                let handle = set.spawn(async move { execute(item, credential).await });
                task_index.insert(handle.id(), idx);
            }

            let mut slots: Vec<Option<ItemResult<V>>> = Vec::with_capacity(items.len());
            slots.resize_with(items.len(), || None);
            let mut quota: Option<UpstreamError> = None;
            let mut permanent: Option<UpstreamError> = None;

            while let Some(joined) = set.join_next_with_id().await {
                match joined {
                    Ok((id, Ok(value))) => {
                        slots[task_index[&id]] = Some(Ok(value));
                    }
                    Ok((id, Err(error))) => match classify(&error) {
                        FailureKind::QuotaExhausted => {
                            if quota.is_none() {
                                quota = Some(error);
                            }
                        }
                        FailureKind::Permanent => {
                            self.notifier.notify(&format!(
                                "permanent failure on credential {}: {error}",
                                credential.index()
                            ));
                            metrics::record_permanent_failure();
                            slots[task_index[&id]] = Some(Err(TerminalFailure::upstream(&error)));
                            if permanent.is_none() {
                                permanent = Some(error);
                            }
                        }
                    },
                    Err(join_error) => {
                        if let Some(idx) = task_index.get(&join_error.id()) {
                            slots[*idx] =
                                Some(Err(TerminalFailure::cancelled(join_error.to_string())));
                        }
                    }
                }
            }

            // A permanent failure is assumed independent of the credential:
            // trying further credentials would replay it. It takes precedence
            // over a concurrent quota signal for the same reason.
            if let Some(error) = permanent {
                warn!(
                    credential = credential.index(),
                    error = %error,
                    "permanent failure, aborting batch"
                );
                let failure = TerminalFailure::upstream(&error);
                return items.iter().map(|_| Err(failure.clone())).collect();
            }

            if let Some(error) = quota {
                warn!(
                    credential = credential.index(),
                    error = %error,
                    "quota exhausted, abandoning credential for this batch"
                );
                self.notifier.notify(&format!(
                    "credential {} exhausted its quota: {error}",
                    credential.index()
                ));
                metrics::record_quota_exhausted();
                if let Some(tracker) = &self.cooldowns {
                    tracker.mark(&credential);
                }
                continue;
            }

            return slots
                .into_iter()
                .map(|slot| {
                    slot.unwrap_or_else(|| {
                        Err(TerminalFailure::cancelled("result not collected".into()))
                    })
                })
                .collect();
        }

        warn!(
            credentials = self.pool.len(),
            "every credential exhausted, failing batch"
        );
        self.notifier.notify("all credentials exhausted");
        metrics::record_pool_exhausted();
        let failure = TerminalFailure::pool_exhausted("all credentials exhausted");
        items.iter().map(|_| Err(failure.clone())).collect()
    }

    /// Partitioned strategy: one parallel task per (credential, chunk).
    async fn run_partitioned<I, V, E, Fut>(
        &self,
        order: Vec<Credential>,
        items: Vec<I>,
        execute: E,
    ) -> Vec<ItemResult<V>>
    where
        I: Clone + Send + Sync + 'static,
        V: Send + 'static,
        E: Fn(I, Credential) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, UpstreamError>> + Send + 'static,
    {
        let total = items.len();
        let chunk_size = total.div_ceil(order.len());
        let indexed: Vec<(usize, I)> = items.into_iter().enumerate().collect();
        let chunks: Vec<Vec<(usize, I)>> = indexed.chunks(chunk_size).map(<[_]>::to_vec).collect();
        // Credentials past this point were never assigned work and form the
        // retry set for quota-failed chunks.
        let assigned = chunks.len();
        info!(
            items = total,
            credentials = order.len(),
            chunk_size,
            "partitioned dispatch"
        );

        let mut set = JoinSet::new();
        let mut task_items: HashMap<tokio::task::Id, Vec<usize>> = HashMap::new();
        for (chunk, credential) in chunks.into_iter().zip(order.iter()) {
            let indices: Vec<usize> = chunk.iter().map(|(idx, _)| *idx).collect();
            let handle = set.spawn(run_chunk(
                credential.clone(),
                chunk,
                execute.clone(),
                Arc::clone(&self.notifier),
                self.cooldowns.clone(),
            ));
            task_items.insert(handle.id(), indices);
        }

        let mut slots: Vec<Option<ItemResult<V>>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);
        let mut failed_chunks: Vec<Vec<(usize, I)>> = Vec::new();

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, ChunkOutcome::Completed(results))) => {
                    for (idx, result) in results {
                        slots[idx] = Some(result);
                    }
                }
                Ok((_, ChunkOutcome::QuotaExhausted { items })) => {
                    failed_chunks.push(items);
                }
                Err(join_error) => {
                    if let Some(indices) = task_items.get(&join_error.id()) {
                        for idx in indices {
                            slots[*idx] =
                                Some(Err(TerminalFailure::cancelled(join_error.to_string())));
                        }
                    }
                }
            }
        }

        if !failed_chunks.is_empty() {
            // Tasks join in completion order; retry in input order.
            failed_chunks.sort_by_key(|chunk| chunk.first().map(|(idx, _)| *idx));
            let remaining = order[assigned..].to_vec();
            if remaining.is_empty() {
                let abandoned: usize = failed_chunks.iter().map(Vec::len).sum();
                warn!(items = abandoned, "no unused credentials left for retry");
                self.notifier.notify(&format!(
                    "all credentials exhausted, abandoning {abandoned} items"
                ));
                metrics::record_pool_exhausted();
                let failure = TerminalFailure::pool_exhausted("all credentials exhausted");
                for (idx, _) in failed_chunks.iter().flatten() {
                    slots[*idx] = Some(Err(failure.clone()));
                }
            } else {
                self.retry_failed_chunks(remaining, failed_chunks, &execute, &mut slots)
                    .await;
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(TerminalFailure::cancelled("result not collected".into()))
                })
            })
            .collect()
    }

    /// Sequential retry pass over the credentials that were never assigned
    /// a chunk. One cursor is shared across chunks: a quota signal advances
    /// it for good, success leaves it in place for the next failed chunk.
    async fn retry_failed_chunks<I, V, E, Fut>(
        &self,
        remaining: Vec<Credential>,
        failed_chunks: Vec<Vec<(usize, I)>>,
        execute: &E,
        slots: &mut [Option<ItemResult<V>>],
    ) where
        I: Clone + Send + Sync + 'static,
        V: Send + 'static,
        E: Fn(I, Credential) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, UpstreamError>> + Send + 'static,
    {
        let mut cursor = 0usize;
        for mut chunk in failed_chunks {
            loop {
                let Some(credential) = remaining.get(cursor) else {
                    warn!(
                        items = chunk.len(),
                        "remaining credentials exhausted during retry"
                    );
                    self.notifier.notify(&format!(
                        "credential pool exhausted during retry, abandoning {} items",
                        chunk.len()
                    ));
                    metrics::record_pool_exhausted();
                    let failure = TerminalFailure::pool_exhausted("exhausted during retry");
                    for (idx, _) in &chunk {
                        slots[*idx] = Some(Err(failure.clone()));
                    }
                    break;
                };
                match run_chunk(
                    credential.clone(),
                    chunk,
                    execute.clone(),
                    Arc::clone(&self.notifier),
                    self.cooldowns.clone(),
                )
                .await
                {
                    ChunkOutcome::Completed(results) => {
                        for (idx, result) in results {
                            slots[idx] = Some(result);
                        }
                        break;
                    }
                    ChunkOutcome::QuotaExhausted { items } => {
                        cursor += 1;
                        chunk = items;
                    }
                }
            }
        }
    }
}

/// Run one chunk of items sequentially on one credential.
async fn run_chunk<I, V, E, Fut>(
    credential: Credential,
    chunk: Vec<(usize, I)>,
    execute: E,
    notifier: Arc<dyn Notifier>,
    cooldowns: Option<Arc<CooldownTracker>>,
) -> ChunkOutcome<I, V>
where
    I: Clone + Send + Sync + 'static,
    V: Send + 'static,
    E: Fn(I, Credential) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<V, UpstreamError>> + Send + 'static,
{
    let mut results = Vec::with_capacity(chunk.len());
    for (idx, item) in &chunk {
        match execute(item.clone(), credential.clone()).await {
            Ok(value) => results.push((*idx, Ok(value))),
            Err(error) => match classify(&error) {
                FailureKind::QuotaExhausted => {
                    warn!(
                        credential = credential.index(),
                        error = %error,
                        "quota exhausted mid-chunk, returning chunk for retry"
                    );
                    notifier.notify(&format!(
                        "credential {} exhausted its quota: {error}",
                        credential.index()
                    ));
                    metrics::record_quota_exhausted();
                    if let Some(tracker) = &cooldowns {
                        tracker.mark(&credential);
                    }
                    return ChunkOutcome::QuotaExhausted { items: chunk };
                }
                FailureKind::Permanent => {
                    warn!(
                        credential = credential.index(),
                        item = idx,
                        error = %error,
                        "permanent failure for item"
                    );
                    notifier.notify(&format!(
                        "permanent failure on credential {}: {error}",
                        credential.index()
                    ));
                    metrics::record_permanent_failure();
                    results.push((*idx, Err(TerminalFailure::upstream(&error))));
                }
            },
        }
    }
    ChunkOutcome::Completed(results)
}
