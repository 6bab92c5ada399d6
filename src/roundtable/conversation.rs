//! Conversation data model: participants, messages, and conversation state.
//!
//! These are the plain-data types that cross the boundary between the
//! transport layer and the round engine. Construction goes through validating
//! constructors so malformed input is rejected at the boundary rather than
//! deep inside a round. Everything derives serde so the layer above this crate
//! can ship snapshots over the wire.
//!
//! # Example
//!
//! ```rust
//! use roundtable::{Conversation, ConversationMode, Participant};
//!
//! let participants = vec![
//!     Participant::new("det", "Detective", "detective", "gpt-4o", "Ask questions.").unwrap(),
//!     Participant::new("wit", "Witness", "innocent", "claude-3", "Answer briefly.").unwrap(),
//! ];
//!
//! let conversation = Conversation::new(participants, ConversationMode::Sequential).unwrap();
//! assert_eq!(conversation.round_number, 0);
//! assert!(conversation.is_active);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How replies are gathered within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// Every active participant is invoked concurrently with the same prompt.
    Parallel,
    /// Participants are invoked one at a time, each seeing the replies of
    /// those before it in the chain.
    Sequential,
}

impl FromStr for ConversationMode {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(ConversationMode::Parallel),
            "sequential" => Ok(ConversationMode::Sequential),
            other => Err(ConversationError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationMode::Parallel => write!(f, "parallel"),
            ConversationMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// The kind of a [`Message`] in conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A message from the human driving the conversation.
    UserInput,
    /// A reply produced by one of the AI participants.
    AgentReply,
    /// An engine- or operator-originated notice.
    System,
    /// A moderation action taken on the conversation.
    Moderator,
}

/// A single entry in a conversation's history.
///
/// Messages are immutable once appended; append order defines history order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    fn build(message_type: MessageType, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            content: content.into(),
            sender: sender.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// A message typed by the user. The sender is always `"user"`.
    pub fn user_input(content: impl Into<String>) -> Self {
        Self::build(MessageType::UserInput, "user", content)
    }

    /// A reply from an AI participant, attributed to its display name.
    pub fn agent_reply(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(MessageType::AgentReply, sender, content)
    }

    /// An engine-originated notice.
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(MessageType::System, "system", content)
    }

    /// A moderation action.
    pub fn moderator(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(MessageType::Moderator, sender, content)
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One AI participant in a conversation.
///
/// Participants are immutable except for `active` and `reply_count`, both of
/// which are mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Stable identifier referenced in round results and reply bookkeeping.
    pub id: String,
    /// Human-readable display name used as the sender of this participant's
    /// replies and in sequential-chain context.
    pub name: String,
    /// Free-form role tag (e.g. `"panelist"`, `"detective"`).
    pub role: String,
    /// Identifier of the agent/model behind this participant, interpreted by
    /// the [`ModelInvoker`](crate::ModelInvoker).
    pub model_id: String,
    /// Behavioral instructions handed to the invocation service at
    /// initialization.
    pub instructions: String,
    /// Inactive participants are skipped by both round strategies.
    pub active: bool,
    /// Number of replies this participant has contributed across all rounds.
    pub reply_count: u64,
}

impl Participant {
    /// Create a participant. Rejects a blank `id`, `name`, or `model_id`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        model_id: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Result<Self, ConversationError> {
        let id = id.into();
        let name = name.into();
        let model_id = model_id.into();
        if id.trim().is_empty() {
            return Err(ConversationError::InvalidParticipant("id must not be blank".into()));
        }
        if name.trim().is_empty() {
            return Err(ConversationError::InvalidParticipant(
                "name must not be blank".into(),
            ));
        }
        if model_id.trim().is_empty() {
            return Err(ConversationError::InvalidParticipant(
                "model_id must not be blank".into(),
            ));
        }
        Ok(Self {
            id,
            name,
            role: role.into(),
            model_id,
            instructions: instructions.into(),
            active: true,
            reply_count: 0,
        })
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// In-memory state of one conversation.
///
/// Owned exclusively by the [`RoundOrchestrator`](crate::RoundOrchestrator);
/// at most one round mutates a conversation at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub mode: ConversationMode,
    pub participants: Vec<Participant>,
    pub messages: Vec<Message>,
    /// Set while a sequential round is mid-chain: the participant currently
    /// being invoked. `None` between rounds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_speaker: Option<String>,
    pub round_number: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Conversation {
    /// Create a conversation with a fresh UUID identifier and round number 0.
    ///
    /// Rejects an empty participant list and duplicate participant ids.
    pub fn new(
        participants: Vec<Participant>,
        mode: ConversationMode,
    ) -> Result<Self, ConversationError> {
        if participants.is_empty() {
            return Err(ConversationError::NoParticipants);
        }
        let mut seen = HashSet::new();
        for participant in &participants {
            if !seen.insert(participant.id.as_str()) {
                return Err(ConversationError::DuplicateParticipant(
                    participant.id.clone(),
                ));
            }
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            mode,
            participants,
            messages: Vec::new(),
            current_speaker: None,
            round_number: 0,
            is_active: true,
            created_at: Utc::now(),
            metadata: None,
        })
    }

    /// Append a message to history. Append order defines history order.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// Participants that take part in rounds, in conversation order.
    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.active)
    }
}

/// Error types for conversation construction and mode parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    InvalidParticipant(String),
    NoParticipants,
    DuplicateParticipant(String),
    UnknownMode(String),
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationError::InvalidParticipant(msg) => {
                write!(f, "Invalid participant: {}", msg)
            }
            ConversationError::NoParticipants => {
                write!(f, "A conversation needs at least one participant")
            }
            ConversationError::DuplicateParticipant(id) => {
                write!(f, "Duplicate participant id: {}", id)
            }
            ConversationError::UnknownMode(mode) => {
                write!(f, "Unknown conversation mode: {}", mode)
            }
        }
    }
}

impl Error for ConversationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str) -> Participant {
        Participant::new(id, id.to_uppercase(), "panelist", "mock-model", "").unwrap()
    }

    #[test]
    fn test_participant_rejects_blank_fields() {
        assert!(Participant::new("", "Name", "role", "model", "").is_err());
        assert!(Participant::new("id", "  ", "role", "model", "").is_err());
        assert!(Participant::new("id", "Name", "role", "", "").is_err());
        assert!(Participant::new("id", "Name", "", "model", "").is_ok());
    }

    #[test]
    fn test_conversation_rejects_empty_and_duplicate_participants() {
        assert_eq!(
            Conversation::new(Vec::new(), ConversationMode::Parallel).unwrap_err(),
            ConversationError::NoParticipants
        );

        let err = Conversation::new(
            vec![participant("a"), participant("a")],
            ConversationMode::Parallel,
        )
        .unwrap_err();
        assert_eq!(err, ConversationError::DuplicateParticipant("a".into()));
    }

    #[test]
    fn test_conversation_starts_at_round_zero() {
        let conversation =
            Conversation::new(vec![participant("a")], ConversationMode::Sequential).unwrap();
        assert_eq!(conversation.round_number, 0);
        assert!(conversation.is_active);
        assert!(conversation.messages.is_empty());
        assert!(conversation.current_speaker.is_none());
    }

    #[test]
    fn test_mode_round_trips_through_strings() {
        assert_eq!(
            "parallel".parse::<ConversationMode>().unwrap(),
            ConversationMode::Parallel
        );
        assert_eq!(
            "sequential".parse::<ConversationMode>().unwrap(),
            ConversationMode::Sequential
        );
        assert!("moderated".parse::<ConversationMode>().is_err());
        assert_eq!(ConversationMode::Parallel.to_string(), "parallel");
    }

    #[test]
    fn test_message_constructors_tag_sender_and_type() {
        let user = Message::user_input("hi");
        assert_eq!(user.message_type, MessageType::UserInput);
        assert_eq!(user.sender, "user");

        let reply = Message::agent_reply("Analyst", "hello");
        assert_eq!(reply.message_type, MessageType::AgentReply);
        assert_eq!(reply.sender, "Analyst");
        assert!(reply.metadata.is_none());

        let tagged = Message::system("round aborted")
            .with_metadata(serde_json::json!({"reason": "invocation failure"}));
        assert!(tagged.metadata.is_some());
    }

    #[test]
    fn test_message_type_serializes_to_wire_names() {
        let json = serde_json::to_string(&MessageType::UserInput).unwrap();
        assert_eq!(json, "\"user_input\"");
        let json = serde_json::to_string(&MessageType::AgentReply).unwrap();
        assert_eq!(json, "\"agent_reply\"");
    }
}
