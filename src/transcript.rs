use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Speaker role for a turn, serialized lowercase on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Where the session is in its request/response cycle.
///
/// `Streaming` is the admission-control state: exactly one request may be
/// in flight, and only while streaming is the last assistant turn open for
/// appending. `Failed` keeps the session usable; the next submit leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Streaming,
    Failed,
}

/// Ordered transcript of the session plus the streaming phase.
///
/// Append-only: turns are never removed or reordered, and only the most
/// recent assistant turn mutates, while a stream is in flight. Every
/// mutation republishes the full transcript to watch subscribers; there is
/// no coalescing, each chunk may trigger a publish.
pub struct ConversationStore {
    turns: Vec<Turn>,
    phase: SessionPhase,
    transcript_tx: watch::Sender<Vec<Turn>>,
    phase_tx: watch::Sender<SessionPhase>,
}

impl ConversationStore {
    pub fn new() -> Self {
        let (transcript_tx, _) = watch::channel(Vec::new());
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        Self {
            turns: Vec::new(),
            phase: SessionPhase::Idle,
            transcript_tx,
            phase_tx,
        }
    }

    /// Subscribe to full-transcript snapshots (the chat view)
    pub fn subscribe(&self) -> watch::Receiver<Vec<Turn>> {
        self.transcript_tx.subscribe()
    }

    /// Subscribe to phase changes (gates input-disabled UI state)
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True from request issuance until completion or failure
    pub fn is_pending(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Append a user turn and return the updated transcript snapshot.
    ///
    /// Rejected before any state change when the text is blank or a
    /// request is already in flight.
    pub fn append_user_turn(&mut self, text: &str) -> Result<Vec<Turn>> {
        if text.trim().is_empty() {
            return Err(ChatError::InvalidInput(
                "message text is empty".to_string(),
            ));
        }
        if self.is_pending() {
            return Err(ChatError::InvalidInput(
                "a request is already in flight".to_string(),
            ));
        }
        self.turns.push(Turn::user(text));
        self.publish();
        Ok(self.snapshot())
    }

    /// Open an empty assistant turn for incremental appends.
    /// Called exactly once per request, before the first chunk arrives.
    pub fn begin_assistant_turn(&mut self) {
        self.turns.push(Turn::assistant(""));
        self.publish();
    }

    /// Concatenate a decoded delta onto the open assistant turn
    pub fn append_to_last_assistant(&mut self, delta: &str) -> Result<()> {
        let turn = self.last_assistant_mut()?;
        turn.content.push_str(delta);
        self.publish();
        Ok(())
    }

    /// Overwrite the open assistant turn, discarding partial content.
    /// Used on the failure path to replace partial output with the fixed
    /// error message.
    pub fn set_last_assistant_text(&mut self, full_text: &str) -> Result<()> {
        let turn = self.last_assistant_mut()?;
        turn.content = full_text.to_string();
        self.publish();
        Ok(())
    }

    /// Content of the last turn if it is an assistant turn
    pub fn last_assistant_text(&self) -> Option<&str> {
        match self.turns.last() {
            Some(turn) if turn.role == Role::Assistant => Some(&turn.content),
            _ => None,
        }
    }

    /// Seed the transcript with a standalone assistant notice (e.g. the
    /// configuration reminder for an initial prompt)
    pub fn push_assistant_notice(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
        self.publish();
    }

    fn last_assistant_mut(&mut self) -> Result<&mut Turn> {
        match self.turns.last_mut() {
            Some(turn) if turn.role == Role::Assistant => Ok(turn),
            _ => Err(ChatError::InvalidState(
                "last turn is not an open assistant turn".to_string(),
            )),
        }
    }

    fn publish(&self) {
        self.transcript_tx.send_replace(self.turns.clone());
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
