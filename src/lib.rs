//! Streaming chat core for the Tansan AI app builder.
//!
//! The crate drives one request/response cycle against a remote streaming
//! inference endpoint: it appends the user's turn to the transcript, opens
//! the stream, decodes chunks incrementally into the open assistant turn,
//! and on completion extracts the first fenced code block for the editor
//! surface. The surrounding UI subscribes to transcript, phase, and
//! artifact snapshots over watch channels.

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod session;
pub mod transcript;

pub use client::{CapabilityFactory, HttpInference, InferenceCapability, StreamRequest};
pub use config::{ModelInfo, Settings};
pub use error::{ChatError, STREAM_FAILURE_MESSAGE};
pub use extract::{extract_code, CodeArtifact, DEFAULT_LANGUAGE};
pub use session::ChatSession;
pub use transcript::{ConversationStore, Role, SessionPhase, Turn};
