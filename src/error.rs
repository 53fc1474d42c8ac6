use thiserror::Error;

/// Message written into the open assistant turn when a stream fails.
/// Partial output already appended is overwritten, not kept alongside it.
pub const STREAM_FAILURE_MESSAGE: &str =
    "Sorry, there was an error processing your request. Please check your settings and ensure your inference endpoint is set up correctly.";

/// Errors surfaced by the chat core
#[derive(Debug, Error)]
pub enum ChatError {
    /// Empty/whitespace-only input, or a submit while another request is in flight
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Endpoint credentials are missing; no request was issued
    #[error("not configured: set the endpoint URL and anon key in settings")]
    NotConfigured,

    /// A transcript mutation that requires an open assistant turn found none
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Stream open failure or mid-stream read/decode failure
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
