//! # Roundtable
//!
//! Roundtable is a library-level engine for coordinating live, multi-party AI
//! conversations in which several independently-invoked agents each produce a
//! reply to a shared prompt.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **Round Orchestration**: [`RoundOrchestrator`] owns conversation state and
//!   drives two round strategies — parallel fan-out/fan-in and sequential
//!   chaining — returning one consistent [`RoundResult`] per round even when
//!   some agents are slow or never respond
//! * **Response Aggregation**: [`ResponseAggregator`] collects replies trickling
//!   in from concurrent agent invocations and delivers a single combined result
//!   by a deadline, exactly once, with running completion statistics
//! * **Invocation Flexibility**: the [`ModelInvoker`] trait is the seam to
//!   whatever actually talks to an AI model — an HTTP client, a local model, or
//!   a scripted mock in tests
//! * **Typed Conversation Data**: [`Conversation`], [`Participant`], and
//!   [`Message`] with validating constructors, tagged message types, and serde
//!   support for the transport layer above this crate
//!
//! ## Core Concepts
//!
//! ### Rounds
//!
//! A *round* is one cycle of "user message in → one reply per active
//! participant out". In `Parallel` mode every active participant is invoked
//! concurrently with the same prompt and the aggregator gates completion: the
//! round finishes as soon as everyone replied, or at the deadline with whatever
//! arrived. In `Sequential` mode participants are invoked one at a time, each
//! seeing the accumulated context of the replies before it.
//!
//! ### Partial results are not errors
//!
//! A parallel round in which nobody answered in time still completes — the
//! caller receives an empty [`RoundResult`] and the round number still
//! advances. The aggregator's `timed_out` counter is the only trace. Errors are
//! reserved for real faults: unknown conversations, rounds on ended
//! conversations, and sequential-chain invocation failures.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use roundtable::{
//!     ConversationMode, ModelInvoker, Participant, RoundOrchestrator,
//! };
//!
//! struct EchoInvoker;
//!
//! #[async_trait]
//! impl ModelInvoker for EchoInvoker {
//!     async fn invoke(
//!         &self,
//!         participant_id: &str,
//!         prompt: &str,
//!     ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
//!         Ok(format!("{} heard: {}", participant_id, prompt))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     roundtable::init_logger();
//!
//!     let orchestrator = RoundOrchestrator::new(Arc::new(EchoInvoker));
//!
//!     let participants = vec![
//!         Participant::new("analyst", "Analyst", "panelist", "gpt-4o", "Be analytical.")?,
//!         Participant::new("skeptic", "Skeptic", "panelist", "claude-3", "Challenge claims.")?,
//!     ];
//!
//!     let conversation = orchestrator
//!         .create_conversation(participants, ConversationMode::Parallel)
//!         .await?;
//!
//!     let result = orchestrator
//!         .process_round(&conversation.id, "What could go wrong here?")
//!         .await?;
//!
//!     for reply in &result.replies {
//!         println!("{}: {}", reply.participant_name, reply.content);
//!     }
//!     println!("round {} complete", result.round);
//!     Ok(())
//! }
//! ```
//!
//! Continue exploring the modules re-exported from the crate root for the
//! aggregator-level API and the conversation data model.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// The helper is intentionally lightweight so that applications embedding
/// Roundtable can opt in to simple `RUST_LOG` driven diagnostics without having
/// to choose a specific logging backend upfront.
///
/// ```rust
/// roundtable::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `roundtable` module.
pub mod roundtable;

// Re-exporting key items for easier external access.
pub use crate::roundtable::aggregator;
pub use crate::roundtable::aggregator::{
    AggregatorError, AggregatorStats, CompletionCallback, ResponseAggregator,
};
pub use crate::roundtable::conversation;
pub use crate::roundtable::conversation::{
    Conversation, ConversationError, ConversationMode, Message, MessageType, Participant,
};
pub use crate::roundtable::invoker;
pub use crate::roundtable::invoker::{InvokerResult, ModelInvoker};
pub use crate::roundtable::orchestrator;
pub use crate::roundtable::orchestrator::{
    OrchestratorError, ParticipantReply, RoundOrchestrator, RoundResult,
};
