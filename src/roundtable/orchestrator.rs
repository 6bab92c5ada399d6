//! Conversation lifecycle and the two round strategies.
//!
//! The `orchestrator` module owns conversation state (participants, history,
//! round counter) and drives rounds against the
//! [`ModelInvoker`](crate::ModelInvoker):
//!
//! - **Parallel**: every active participant is invoked concurrently with the
//!   same user message; the [`ResponseAggregator`](crate::ResponseAggregator)
//!   gates completion by threshold or deadline, and the round returns whatever
//!   replies arrived in time. A participant that fails or stays silent simply
//!   contributes nothing — that is a normal, representable outcome, not an
//!   error.
//! - **Sequential**: active participants are invoked one at a time in
//!   conversation order, each prompted with the accumulated context
//!   `"{context}\n\n{name}: {reply}"` of everyone before it. A failing
//!   invocation aborts the rest of the chain and surfaces
//!   [`OrchestratorError::InvocationFailed`].
//!
//! Rounds on the same conversation are serialized behind a per-conversation
//! lock; rounds on different conversations run fully independently.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use roundtable::{ConversationMode, Participant, RoundOrchestrator};
//! # use async_trait::async_trait;
//! # struct EchoInvoker;
//! # #[async_trait]
//! # impl roundtable::ModelInvoker for EchoInvoker {
//! #     async fn invoke(&self, _: &str, prompt: &str) -> roundtable::InvokerResult<String> {
//! #         Ok(prompt.to_string())
//! #     }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = RoundOrchestrator::new(Arc::new(EchoInvoker))
//!     .with_round_timeout(Duration::from_secs(8));
//!
//! let conversation = orchestrator
//!     .create_conversation(
//!         vec![Participant::new("a", "Alice", "panelist", "gpt-4o", "")?],
//!         ConversationMode::Parallel,
//!     )
//!     .await?;
//!
//! let result = orchestrator.process_round(&conversation.id, "hello").await?;
//! assert_eq!(result.round, 1);
//! # Ok(())
//! # }
//! ```

use crate::roundtable::aggregator::{AggregatorError, AggregatorStats, ResponseAggregator};
use crate::roundtable::conversation::{
    Conversation, ConversationError, ConversationMode, Message, Participant,
};
use crate::roundtable::invoker::ModelInvoker;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// Default per-round deadline for the parallel strategy.
const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(8);

/// One participant's reply within a completed round.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantReply {
    pub participant_id: String,
    pub participant_name: String,
    pub content: String,
}

/// Outcome of one round: the per-participant replies, in conversation
/// participant order, plus the conversation's round number after the round.
///
/// A parallel round that timed out returns only the replies that arrived in
/// time — possibly none. The round number advances either way.
#[derive(Debug, Clone, Serialize)]
pub struct RoundResult {
    pub replies: Vec<ParticipantReply>,
    pub round: u64,
}

impl RoundResult {
    /// Look up a reply by participant id.
    pub fn reply_for(&self, participant_id: &str) -> Option<&str> {
        self.replies
            .iter()
            .find(|r| r.participant_id == participant_id)
            .map(|r| r.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

/// Error types for orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    ConversationNotFound(String),
    ConversationEnded(String),
    ParticipantNotFound(String),
    DuplicateRound(String),
    InvocationFailed {
        participant_id: String,
        reason: String,
    },
    InvalidConversation(ConversationError),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::ConversationNotFound(id) => {
                write!(f, "Conversation not found: {}", id)
            }
            OrchestratorError::ConversationEnded(id) => {
                write!(f, "Conversation has ended: {}", id)
            }
            OrchestratorError::ParticipantNotFound(id) => {
                write!(f, "Participant not found: {}", id)
            }
            OrchestratorError::DuplicateRound(id) => {
                write!(f, "Round already pending: {}", id)
            }
            OrchestratorError::InvocationFailed {
                participant_id,
                reason,
            } => {
                write!(f, "Invocation failed for {}: {}", participant_id, reason)
            }
            OrchestratorError::InvalidConversation(err) => {
                write!(f, "Invalid conversation: {}", err)
            }
        }
    }
}

impl Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OrchestratorError::InvalidConversation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConversationError> for OrchestratorError {
    fn from(err: ConversationError) -> Self {
        OrchestratorError::InvalidConversation(err)
    }
}

impl From<AggregatorError> for OrchestratorError {
    fn from(err: AggregatorError) -> Self {
        match err {
            AggregatorError::DuplicateRound(id) => OrchestratorError::DuplicateRound(id),
        }
    }
}

/// Drives rounds across conversations.
///
/// Each conversation lives behind its own lock, held for the duration of a
/// round: rounds within a conversation never overlap, while rounds on
/// different conversations proceed in parallel.
pub struct RoundOrchestrator {
    invoker: Arc<dyn ModelInvoker>,
    aggregator: ResponseAggregator,
    conversations: Mutex<HashMap<String, Arc<Mutex<Conversation>>>>,
    round_timeout: Duration,
}

impl RoundOrchestrator {
    /// Create an orchestrator over the given invocation service, with a fresh
    /// aggregator and the default 8-second round deadline.
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            invoker,
            aggregator: ResponseAggregator::new(),
            conversations: Mutex::new(HashMap::new()),
            round_timeout: DEFAULT_ROUND_TIMEOUT,
        }
    }

    /// Set the deadline applied to every parallel round.
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    /// Share an existing aggregator (and its statistics) with this
    /// orchestrator.
    pub fn with_aggregator(mut self, aggregator: ResponseAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Snapshot of the aggregator's round-completion statistics.
    pub async fn aggregator_stats(&self) -> AggregatorStats {
        self.aggregator.get_stats().await
    }

    /// Create a conversation and initialize the invocation service for every
    /// participant, before any reply can be requested.
    ///
    /// Returns a snapshot of the freshly-created conversation (round 0).
    pub async fn create_conversation(
        &self,
        participants: Vec<Participant>,
        mode: ConversationMode,
    ) -> Result<Conversation, OrchestratorError> {
        let conversation = Conversation::new(participants, mode)?;

        for participant in &conversation.participants {
            self.invoker.initialize(participant).await.map_err(|err| {
                OrchestratorError::InvocationFailed {
                    participant_id: participant.id.clone(),
                    reason: err.to_string(),
                }
            })?;
        }

        info!(
            "conversation {} created ({} participants, {} mode)",
            conversation.id,
            conversation.participants.len(),
            conversation.mode
        );

        let snapshot = conversation.clone();
        self.conversations
            .lock()
            .await
            .insert(conversation.id.clone(), Arc::new(Mutex::new(conversation)));
        Ok(snapshot)
    }

    /// Process one round using the conversation's configured mode.
    pub async fn process_round(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<RoundResult, OrchestratorError> {
        let handle = self.conversation_handle(conversation_id).await?;
        let mut conversation = handle.lock().await;
        match conversation.mode {
            ConversationMode::Parallel => self.run_parallel(&mut conversation, user_message).await,
            ConversationMode::Sequential => {
                self.run_sequential(&mut conversation, user_message).await
            }
        }
    }

    /// Process one parallel fan-out round regardless of the conversation's
    /// configured mode.
    pub async fn process_parallel_round(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<RoundResult, OrchestratorError> {
        let handle = self.conversation_handle(conversation_id).await?;
        let mut conversation = handle.lock().await;
        self.run_parallel(&mut conversation, user_message).await
    }

    /// Process one sequential chained round regardless of the conversation's
    /// configured mode.
    pub async fn process_sequential_round(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<RoundResult, OrchestratorError> {
        let handle = self.conversation_handle(conversation_id).await?;
        let mut conversation = handle.lock().await;
        self.run_sequential(&mut conversation, user_message).await
    }

    /// Snapshot lookup. `None` for unknown ids.
    pub async fn get_conversation(&self, conversation_id: &str) -> Option<Conversation> {
        let handle = {
            self.conversations
                .lock()
                .await
                .get(conversation_id)
                .cloned()
        }?;
        let conversation = handle.lock().await;
        Some(conversation.clone())
    }

    /// End a conversation. Terminal: any later round fails with
    /// [`OrchestratorError::ConversationEnded`]. Also asks the invocation
    /// service to drop its per-participant context.
    pub async fn end_conversation(&self, conversation_id: &str) -> Result<(), OrchestratorError> {
        let handle = self.conversation_handle(conversation_id).await?;
        let mut conversation = handle.lock().await;
        conversation.is_active = false;

        for participant in &conversation.participants {
            if let Err(err) = self.invoker.reset_history(&participant.id).await {
                warn!(
                    "failed to reset history for participant {}: {}",
                    participant.id, err
                );
            }
        }

        info!(
            "conversation {} ended after {} rounds",
            conversation.id, conversation.round_number
        );
        Ok(())
    }

    /// Flip a participant's active flag. The only sanctioned mutation of
    /// [`Participant::active`].
    pub async fn set_participant_active(
        &self,
        conversation_id: &str,
        participant_id: &str,
        active: bool,
    ) -> Result<(), OrchestratorError> {
        let handle = self.conversation_handle(conversation_id).await?;
        let mut conversation = handle.lock().await;
        match conversation.participant_mut(participant_id) {
            Some(participant) => {
                participant.active = active;
                Ok(())
            }
            None => Err(OrchestratorError::ParticipantNotFound(
                participant_id.to_string(),
            )),
        }
    }

    async fn conversation_handle(
        &self,
        conversation_id: &str,
    ) -> Result<Arc<Mutex<Conversation>>, OrchestratorError> {
        self.conversations
            .lock()
            .await
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ConversationNotFound(conversation_id.to_string()))
    }

    async fn run_parallel(
        &self,
        conversation: &mut Conversation,
        user_message: &str,
    ) -> Result<RoundResult, OrchestratorError> {
        if !conversation.is_active {
            return Err(OrchestratorError::ConversationEnded(
                conversation.id.clone(),
            ));
        }

        conversation.push_message(Message::user_input(user_message));

        let active: Vec<(String, String)> = conversation
            .active_participants()
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();
        let round_id = Uuid::new_v4().to_string();

        info!(
            "parallel round {} on conversation {}: fanning out to {} participants",
            round_id,
            conversation.id,
            active.len()
        );

        let (tx, rx) = oneshot::channel();
        self.aggregator
            .submit(
                round_id.clone(),
                active.len(),
                self.round_timeout,
                Box::new(move |replies| {
                    Box::pin(async move {
                        let _ = tx.send(replies);
                    })
                }),
            )
            .await?;

        for (participant_id, _) in &active {
            let invoker = Arc::clone(&self.invoker);
            let aggregator = self.aggregator.clone();
            let round_id = round_id.clone();
            let participant_id = participant_id.clone();
            let prompt = user_message.to_string();
            tokio::spawn(async move {
                match invoker.invoke(&participant_id, &prompt).await {
                    Ok(reply) => {
                        aggregator
                            .record_reply(&round_id, &participant_id, reply)
                            .await
                    }
                    Err(err) => {
                        warn!(
                            "participant {} produced no reply for round {}: {}",
                            participant_id, round_id, err
                        );
                    }
                }
            });
        }

        // The round's single suspension point: the aggregator fires the
        // callback exactly once, by threshold or by deadline.
        let collected = rx.await.unwrap_or_default();

        let mut replies = Vec::new();
        for (participant_id, participant_name) in &active {
            if let Some(content) = collected.get(participant_id) {
                conversation.push_message(Message::agent_reply(
                    participant_name.clone(),
                    content.clone(),
                ));
                if let Some(participant) = conversation.participant_mut(participant_id) {
                    participant.reply_count += 1;
                }
                replies.push(ParticipantReply {
                    participant_id: participant_id.clone(),
                    participant_name: participant_name.clone(),
                    content: content.clone(),
                });
            }
        }

        conversation.round_number += 1;
        info!(
            "parallel round {} done: {}/{} replies, conversation {} now at round {}",
            round_id,
            replies.len(),
            active.len(),
            conversation.id,
            conversation.round_number
        );

        Ok(RoundResult {
            replies,
            round: conversation.round_number,
        })
    }

    async fn run_sequential(
        &self,
        conversation: &mut Conversation,
        user_message: &str,
    ) -> Result<RoundResult, OrchestratorError> {
        if !conversation.is_active {
            return Err(OrchestratorError::ConversationEnded(
                conversation.id.clone(),
            ));
        }

        conversation.push_message(Message::user_input(user_message));

        let order: Vec<(String, String)> = conversation
            .active_participants()
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();

        info!(
            "sequential round on conversation {}: chaining {} participants",
            conversation.id,
            order.len()
        );

        let mut context = user_message.to_string();
        let mut replies = Vec::new();

        for (participant_id, participant_name) in &order {
            conversation.current_speaker = Some(participant_id.clone());

            let reply = match self.invoker.invoke(participant_id, &context).await {
                Ok(reply) => reply,
                Err(err) => {
                    // Abort policy: the rest of the chain never runs and the
                    // round number stays put. Earlier replies remain in
                    // history — it is the factual record of what happened.
                    conversation.current_speaker = None;
                    warn!(
                        "sequential round on conversation {} aborted at participant {}: {}",
                        conversation.id, participant_id, err
                    );
                    return Err(OrchestratorError::InvocationFailed {
                        participant_id: participant_id.clone(),
                        reason: err.to_string(),
                    });
                }
            };

            conversation.push_message(Message::agent_reply(participant_name.clone(), reply.clone()));
            if let Some(participant) = conversation.participant_mut(participant_id) {
                participant.reply_count += 1;
            }
            context = format!("{}\n\n{}: {}", context, participant_name, reply);
            replies.push(ParticipantReply {
                participant_id: participant_id.clone(),
                participant_name: participant_name.clone(),
                content: reply,
            });
        }

        conversation.current_speaker = None;
        conversation.round_number += 1;
        info!(
            "sequential round done: {} replies, conversation {} now at round {}",
            replies.len(),
            conversation.id,
            conversation.round_number
        );

        Ok(RoundResult {
            replies,
            round: conversation.round_number,
        })
    }
}
