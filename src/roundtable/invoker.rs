use crate::roundtable::conversation::Participant;
use async_trait::async_trait;
use std::error::Error;

/// A ModelInvoker is the seam between the round engine and whatever actually
/// talks to a specific AI agent or model. It provides a common interface so the
/// orchestrator never depends on a concrete provider.
/// It does not keep track of conversations or rounds, for that we use a
/// RoundOrchestrator which owns conversation history and round state and uses
/// a ModelInvoker to obtain each participant's reply.
// src/roundtable/invoker.rs

/// Type alias for the boxed error an invocation may fail with. Invocations run
/// inside spawned tasks, so the error must be `Send + Sync`.
pub type InvokerResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Trait defining the interface to the service that invokes AI agents.
///
/// Latency of [`invoke`](ModelInvoker::invoke) is variable and unbounded; the
/// round engine never blocks indefinitely on it — in a parallel round the
/// aggregator's deadline bounds the wait, and a reply arriving after the
/// deadline is silently discarded.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Prepare the underlying model for a participant, seeding it with the
    /// participant's behavioral instructions. Called exactly once per
    /// participant, before any reply is requested from it.
    ///
    /// The default implementation does nothing, for invocation services that
    /// need no per-participant setup.
    async fn initialize(&self, _participant: &Participant) -> InvokerResult<()> {
        Ok(())
    }

    /// Send `prompt` to the agent behind `participant_id` and return its
    /// textual reply. May take arbitrarily long; may fail.
    async fn invoke(&self, participant_id: &str, prompt: &str) -> InvokerResult<String>;

    /// Clear any conversational context the invocation service holds for the
    /// participant. Invoked when a conversation ends.
    ///
    /// The default implementation does nothing, so stateless invocation
    /// services don't have to override it.
    async fn reset_history(&self, _participant_id: &str) -> InvokerResult<()> {
        Ok(())
    }
}
