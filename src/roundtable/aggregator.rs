//! Response aggregation for parallel rounds.
//!
//! The `aggregator` module decouples "replies trickling in from many
//! concurrent agent invocations" from "one consumer that wants a single
//! combined result by a deadline". A round is registered with
//! [`ResponseAggregator::submit`], replies arrive through
//! [`ResponseAggregator::record_reply`], and the round completes exactly once:
//! either as soon as the reply threshold is reached, or when the deadline
//! elapses with whatever was collected — possibly nothing. An empty result
//! means "no one answered in time", not an error.
//!
//! **Key guarantees:**
//! - **Exactly-once delivery**: the pending entry is removed atomically under
//!   one lock, so a threshold check racing the deadline timer can never fire
//!   the completion callback twice.
//! - **Late replies are harmless**: recording a reply for a completed (or
//!   never-submitted) round is a no-op.
//! - **Last write wins**: a duplicate reply from the same agent within a
//!   pending round overwrites the earlier one.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use roundtable::ResponseAggregator;
//! use tokio::sync::oneshot;
//!
//! #[tokio::main]
//! async fn main() {
//!     let aggregator = ResponseAggregator::new();
//!     let (tx, rx) = oneshot::channel();
//!
//!     aggregator
//!         .submit(
//!             "round-1",
//!             2,
//!             Duration::from_secs(8),
//!             Box::new(move |replies| {
//!                 Box::pin(async move {
//!                     let _ = tx.send(replies);
//!                 })
//!             }),
//!         )
//!         .await
//!         .unwrap();
//!
//!     aggregator.record_reply("round-1", "agent-a", "first reply").await;
//!     aggregator.record_reply("round-1", "agent-b", "second reply").await;
//!
//!     let replies = rx.await.unwrap();
//!     assert_eq!(replies.len(), 2);
//! }
//! ```

use futures_util::future::BoxFuture;
use log::{debug, info};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One-shot callback delivered when a round completes, with the map of
/// agent id → reply collected up to that point.
///
/// The callback is invoked asynchronously on a spawned task, never inside the
/// aggregator's critical section.
pub type CompletionCallback =
    Box<dyn FnOnce(HashMap<String, String>) -> BoxFuture<'static, ()> + Send>;

/// How a round reached completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Threshold,
    Deadline,
}

/// In-flight bookkeeping for one submitted round. Exists only between
/// submission and completion; removed atomically on completion.
struct PendingRound {
    min_replies: usize,
    replies: HashMap<String, String>,
    started_at: Instant,
    on_complete: Option<CompletionCallback>,
    deadline: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct RollingStats {
    total_requests: u64,
    completed: u64,
    timed_out: u64,
    avg_response_time: f64,
}

/// Snapshot of the aggregator's running statistics, as returned by
/// [`ResponseAggregator::get_stats`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AggregatorStats {
    /// Rounds submitted since this aggregator was constructed.
    pub total_requests: u64,
    /// Rounds that completed by reaching their reply threshold.
    pub completed: u64,
    /// Rounds that completed because their deadline elapsed first.
    pub timed_out: u64,
    /// Running average latency, in seconds, of threshold completions.
    pub avg_response_time: f64,
    /// `completed / max(total_requests, 1)`.
    pub success_rate: f64,
    /// Rounds currently pending.
    pub active_rounds: usize,
}

/// Error types for aggregator operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    /// A round with this identifier is already pending. Round ids are meant to
    /// be generated uniquely by the orchestrator, so hitting this is a
    /// programmer error.
    DuplicateRound(String),
}

impl fmt::Display for AggregatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatorError::DuplicateRound(id) => {
                write!(f, "Round already pending: {}", id)
            }
        }
    }
}

impl Error for AggregatorError {}

struct Inner {
    pending: HashMap<String, PendingRound>,
    stats: RollingStats,
}

/// Collects replies to outstanding rounds and delivers each round's combined
/// result exactly once, by threshold or by deadline.
///
/// Statistics are owned by the instance; construct one aggregator per engine
/// and share it via [`Clone`] (clones see the same rounds and counters).
pub struct ResponseAggregator {
    inner: Arc<Mutex<Inner>>,
}

impl Clone for ResponseAggregator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for ResponseAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: HashMap::new(),
                stats: RollingStats::default(),
            })),
        }
    }

    /// Register a new pending round.
    ///
    /// Starts a deadline timer of `timeout` scoped to this round; the timer is
    /// cancelled if the round completes by threshold first. `on_complete`
    /// fires exactly once with whatever replies were collected.
    ///
    /// A `min_replies` of zero is trivially satisfied: the round completes
    /// immediately after registration, counted as a threshold completion.
    pub async fn submit(
        &self,
        round_id: impl Into<String>,
        min_replies: usize,
        timeout: Duration,
        on_complete: CompletionCallback,
    ) -> Result<(), AggregatorError> {
        let round_id = round_id.into();
        {
            let mut inner = self.inner.lock().await;
            if inner.pending.contains_key(&round_id) {
                return Err(AggregatorError::DuplicateRound(round_id));
            }
            inner.stats.total_requests += 1;
            inner.pending.insert(
                round_id.clone(),
                PendingRound {
                    min_replies,
                    replies: HashMap::new(),
                    started_at: Instant::now(),
                    on_complete: Some(on_complete),
                    deadline: None,
                },
            );

            let timer = tokio::spawn({
                let inner = Arc::clone(&self.inner);
                let round_id = round_id.clone();
                async move {
                    tokio::time::sleep(timeout).await;
                    Self::finish_round(&inner, &round_id, Completion::Deadline).await;
                }
            });
            // The timer task blocks on this same lock, so the entry is still
            // here and the handle lands before any completion path can run.
            if let Some(round) = inner.pending.get_mut(&round_id) {
                round.deadline = Some(timer);
            }
            debug!(
                "round {} submitted (min_replies={}, timeout={:?})",
                round_id, min_replies, timeout
            );
        }

        if min_replies == 0 {
            Self::finish_round(&self.inner, &round_id, Completion::Threshold).await;
        }
        Ok(())
    }

    /// Record one agent's reply for a pending round.
    ///
    /// If no round is pending under `round_id` — it already completed, or was
    /// never submitted — this is a no-op. A duplicate reply from the same
    /// agent overwrites the earlier one (last write wins). Replies from agent
    /// ids the aggregator has never heard of are accepted; membership is the
    /// orchestrator's concern.
    pub async fn record_reply(
        &self,
        round_id: &str,
        agent_id: impl Into<String>,
        reply: impl Into<String>,
    ) {
        let threshold_met = {
            let mut inner = self.inner.lock().await;
            match inner.pending.get_mut(round_id) {
                Some(round) => {
                    round.replies.insert(agent_id.into(), reply.into());
                    round.replies.len() >= round.min_replies
                }
                None => {
                    debug!("dropping late reply for round {}", round_id);
                    false
                }
            }
        };

        if threshold_met {
            Self::finish_round(&self.inner, round_id, Completion::Threshold).await;
        }
    }

    /// Snapshot the running statistics. Cheap; never waits on rounds.
    pub async fn get_stats(&self) -> AggregatorStats {
        let inner = self.inner.lock().await;
        AggregatorStats {
            total_requests: inner.stats.total_requests,
            completed: inner.stats.completed,
            timed_out: inner.stats.timed_out,
            avg_response_time: inner.stats.avg_response_time,
            success_rate: inner.stats.completed as f64 / inner.stats.total_requests.max(1) as f64,
            active_rounds: inner.pending.len(),
        }
    }

    /// Complete a round and remove it from the active set.
    ///
    /// Both completion paths funnel through here; whichever acquires the lock
    /// first removes the entry, and the loser finds nothing and returns. The
    /// callback runs on a spawned task, outside the lock.
    async fn finish_round(inner: &Arc<Mutex<Inner>>, round_id: &str, completion: Completion) {
        let (callback, replies) = {
            let mut guard = inner.lock().await;
            let mut round = match guard.pending.remove(round_id) {
                Some(round) => round,
                None => return,
            };
            let elapsed = round.started_at.elapsed().as_secs_f64();
            match completion {
                Completion::Threshold => {
                    if let Some(timer) = round.deadline.take() {
                        timer.abort();
                    }
                    let n = guard.stats.completed as f64;
                    guard.stats.avg_response_time =
                        (n * guard.stats.avg_response_time + elapsed) / (n + 1.0);
                    guard.stats.completed += 1;
                    info!(
                        "round {} completed with {} replies in {:.3}s",
                        round_id,
                        round.replies.len(),
                        elapsed
                    );
                }
                Completion::Deadline => {
                    guard.stats.timed_out += 1;
                    info!(
                        "round {} timed out after {:.3}s with {} replies",
                        round_id,
                        elapsed,
                        round.replies.len()
                    );
                }
            }
            (round.on_complete.take(), round.replies)
        };

        if let Some(callback) = callback {
            tokio::spawn(callback(replies));
        }
    }
}
