use crate::client::{http_capability_factory, CapabilityFactory, StreamRequest};
use crate::config::{ModelInfo, Settings};
use crate::decode::Utf8Decoder;
use crate::error::{ChatError, Result, STREAM_FAILURE_MESSAGE};
use crate::extract::{extract_code, CodeArtifact};
use crate::transcript::{ConversationStore, SessionPhase, Turn};
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// One chat session: drives the request/response cycle end to end.
///
/// Holds the transcript store, a settings-to-capability factory, and the
/// single retained code artifact. UI collaborators subscribe to transcript,
/// phase, and artifact snapshots over watch channels; they never mutate the
/// session directly.
pub struct ChatSession {
    session_id: Uuid,
    store: ConversationStore,
    settings: Settings,
    capability_factory: CapabilityFactory,
    artifact_tx: watch::Sender<Option<CodeArtifact>>,
}

impl ChatSession {
    pub fn new(settings: Settings) -> Self {
        Self::with_capability_factory(settings, http_capability_factory())
    }

    /// Build a session with an injected capability factory. The factory is
    /// invoked once per submit with the current settings, so credential
    /// changes take effect without rebuilding the session.
    pub fn with_capability_factory(settings: Settings, factory: CapabilityFactory) -> Self {
        let (artifact_tx, _) = watch::channel(None);
        Self {
            session_id: Uuid::new_v4(),
            store: ConversationStore::new(),
            settings,
            capability_factory: factory,
            artifact_tx,
        }
    }

    /// Send a user message and stream the response into the transcript.
    ///
    /// Runs the full cycle: admission checks, user turn, open assistant
    /// turn, chunk-by-chunk decode and append, then one extraction pass over
    /// the completed text. Transport failures are handled here by writing
    /// the fixed error message into the open turn; they do not propagate.
    pub async fn submit(&mut self, text: &str, model_id: &str) -> Result<()> {
        self.submit_with_token(text, model_id, CancellationToken::new())
            .await
    }

    /// Like [`submit`](Self::submit), with a caller-held token that aborts
    /// the stream between chunk reads. Cancelling keeps the text
    /// accumulated so far and leaves the session idle.
    pub async fn submit_with_token(
        &mut self,
        text: &str,
        model_id: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ChatError::InvalidInput("message text is empty".to_string()));
        }
        if self.store.is_pending() {
            return Err(ChatError::InvalidInput(
                "a request is already in flight".to_string(),
            ));
        }
        if !self.settings.is_complete() {
            return Err(ChatError::NotConfigured);
        }
        let capability = (self.capability_factory)(&self.settings)?;

        // The request carries the transcript up to and including the new
        // user turn; the empty assistant turn is appended after the snapshot.
        let transcript = self.store.append_user_turn(text)?;
        self.store.set_phase(SessionPhase::Streaming);
        self.store.begin_assistant_turn();

        let request = StreamRequest {
            model_id: model_id.to_string(),
            transcript,
        };
        debug!(session = %self.session_id, model = %model_id, "submitting request");

        let mut stream = match capability.open_stream(request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.fail_stream(&err);
                return Ok(());
            }
        };

        let mut decoder = Utf8Decoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(session = %self.session_id, "stream cancelled, keeping partial response");
                    self.store.set_phase(SessionPhase::Idle);
                    return Ok(());
                }
                item = stream.next() => item,
            };
            let Some(item) = next else { break };
            match item {
                Ok(chunk) => match decoder.decode(&chunk) {
                    Ok(delta) => {
                        if !delta.is_empty() {
                            self.store.append_to_last_assistant(&delta)?;
                        }
                    }
                    Err(err) => {
                        self.fail_stream(&ChatError::Transport(err.to_string()));
                        return Ok(());
                    }
                },
                Err(err) => {
                    self.fail_stream(&err);
                    return Ok(());
                }
            }
        }

        if let Err(err) = decoder.finish() {
            self.fail_stream(&ChatError::Transport(err.to_string()));
            return Ok(());
        }

        let full_text = self.store.last_assistant_text().unwrap_or("").to_string();
        if let Some(artifact) = extract_code(&full_text) {
            debug!(session = %self.session_id, language = %artifact.language, "extracted code artifact");
            self.artifact_tx.send_replace(Some(artifact));
        }
        self.store.set_phase(SessionPhase::Idle);
        Ok(())
    }

    /// Handle a prompt carried over from the landing page. When settings are
    /// incomplete this seeds the transcript with a configuration reminder
    /// instead of erroring; otherwise it behaves exactly like `submit`.
    pub async fn submit_initial_prompt(&mut self, prompt: &str, model_id: &str) -> Result<()> {
        if !self.settings.is_complete() {
            self.store.push_assistant_notice(format!(
                "Please configure your API keys in settings to process the request: \"{}\"",
                prompt
            ));
            return Ok(());
        }
        self.submit(prompt, model_id).await
    }

    /// Replace the session settings (the settings page saved new values)
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Model labels for the UI dropdown; passed through unchanged
    pub fn models(&self) -> &[ModelInfo] {
        &self.settings.models
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.store.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.store.phase()
    }

    pub fn is_pending(&self) -> bool {
        self.store.is_pending()
    }

    /// Latest extracted artifact, if any stream has produced one
    pub fn artifact(&self) -> Option<CodeArtifact> {
        self.artifact_tx.borrow().clone()
    }

    pub fn subscribe_transcript(&self) -> watch::Receiver<Vec<Turn>> {
        self.store.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.store.subscribe_phase()
    }

    /// Artifact updates for the editor surface. At most one artifact is
    /// retained; a later stream's block replaces an earlier one.
    pub fn subscribe_artifact(&self) -> watch::Receiver<Option<CodeArtifact>> {
        self.artifact_tx.subscribe()
    }

    fn fail_stream(&mut self, err: &ChatError) {
        error!(session = %self.session_id, error = %err, "stream failed");
        if let Err(state_err) = self.store.set_last_assistant_text(STREAM_FAILURE_MESSAGE) {
            warn!(session = %self.session_id, error = %state_err, "could not record failure message");
        }
        self.store.set_phase(SessionPhase::Failed);
    }

    #[cfg(test)]
    fn force_phase(&mut self, phase: SessionPhase) {
        self.store.set_phase(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ByteStream, InferenceCapability};
    use crate::transcript::Role;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;

    /// Capability that replays a fixed chunk script
    struct ScriptedCapability {
        chunks: Vec<std::result::Result<Vec<u8>, String>>,
        fail_open: bool,
    }

    #[async_trait]
    impl InferenceCapability for ScriptedCapability {
        async fn open_stream(&self, _request: StreamRequest) -> Result<ByteStream> {
            if self.fail_open {
                return Err(ChatError::Transport("endpoint refused".to_string()));
            }
            let items: Vec<Result<Bytes>> = self
                .chunks
                .iter()
                .cloned()
                .map(|chunk| chunk.map(Bytes::from).map_err(ChatError::Transport))
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    /// Capability whose stream never yields; only a cancel ends it
    struct StalledCapability;

    #[async_trait]
    impl InferenceCapability for StalledCapability {
        async fn open_stream(&self, _request: StreamRequest) -> Result<ByteStream> {
            Ok(Box::pin(futures::stream::pending()))
        }
    }

    fn configured_settings() -> Settings {
        let mut settings = Settings::default();
        settings.endpoint_url = Some("https://example.supabase.co".to_string());
        settings.anon_key = Some("anon-key".to_string());
        settings
    }

    fn session_with(capability: Arc<dyn InferenceCapability>) -> ChatSession {
        ChatSession::with_capability_factory(
            configured_settings(),
            Arc::new(move |_| Ok(capability.clone())),
        )
    }

    fn scripted_session(chunks: Vec<std::result::Result<Vec<u8>, String>>) -> ChatSession {
        session_with(Arc::new(ScriptedCapability {
            chunks,
            fail_open: false,
        }))
    }

    fn ok_chunks(parts: &[&str]) -> Vec<std::result::Result<Vec<u8>, String>> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    #[tokio::test]
    async fn chunks_accumulate_in_arrival_order() {
        let mut session = scripted_session(ok_chunks(&["Hello", ", ", "world"]));
        session.submit("hi there", "gpt-4o").await.unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], Turn::user("hi there"));
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].content, "Hello, world");
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks_reassembles() {
        let chunks = vec![
            Ok(b"h\xC3".to_vec()),
            Ok(b"\xA9llo \xF0\x9F".to_vec()),
            Ok(b"\x98\x80".to_vec()),
        ];
        let mut session = scripted_session(chunks);
        session.submit("greet me", "gpt-4o").await.unwrap();

        assert_eq!(session.transcript()[1].content, "héllo 😀");
    }

    #[tokio::test]
    async fn mid_stream_error_overwrites_partial_output() {
        let chunks = vec![
            Ok(b"chunk one ".to_vec()),
            Ok(b"chunk two".to_vec()),
            Err("connection reset".to_string()),
        ];
        let mut session = scripted_session(chunks);
        session.submit("hi", "gpt-4o").await.unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript[1].content, STREAM_FAILURE_MESSAGE);
        assert!(!session.is_pending());
        assert_eq!(session.phase(), SessionPhase::Failed);
    }

    #[tokio::test]
    async fn open_failure_writes_error_message_and_clears_pending() {
        let mut session = session_with(Arc::new(ScriptedCapability {
            chunks: Vec::new(),
            fail_open: true,
        }));
        session.submit("hi", "gpt-4o").await.unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, STREAM_FAILURE_MESSAGE);
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn session_is_usable_after_a_failure() {
        let mut session = session_with(Arc::new(ScriptedCapability {
            chunks: Vec::new(),
            fail_open: true,
        }));
        session.submit("first", "gpt-4o").await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Failed);

        // A fresh submit is admitted; only Streaming blocks it
        let err = session.submit("  ", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        session.submit("second", "gpt-4o").await.unwrap();
        assert_eq!(session.transcript().len(), 4);
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let mut session = scripted_session(ok_chunks(&["unused"]));
        let err = session.submit("   \n", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        assert!(session.transcript().is_empty());
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn submit_while_pending_is_a_no_op() {
        let mut session = scripted_session(ok_chunks(&["unused"]));
        session.force_phase(SessionPhase::Streaming);

        let err = session.submit("hello", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        assert!(session.transcript().is_empty());
        assert!(session.is_pending());
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_mutation() {
        let mut session = ChatSession::with_capability_factory(
            Settings::default(),
            Arc::new(|_| {
                Ok(Arc::new(ScriptedCapability {
                    chunks: Vec::new(),
                    fail_open: false,
                }) as Arc<dyn InferenceCapability>)
            }),
        );
        let err = session.submit("hi", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured));
        assert!(session.transcript().is_empty());
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn completed_stream_publishes_first_code_block() {
        let response = "Here you go:\n```js\nconst a=1;\n```\nand also\n```py\nx = 2\n```";
        let mut session = scripted_session(ok_chunks(&[response]));
        let mut artifact_rx = session.subscribe_artifact();

        session.submit("write code", "gpt-4o").await.unwrap();

        let artifact = session.artifact().unwrap();
        assert_eq!(artifact.language, "js");
        assert_eq!(artifact.source, "const a=1;");
        assert_eq!(artifact_rx.borrow_and_update().clone(), Some(artifact));
    }

    #[tokio::test]
    async fn later_stream_replaces_the_retained_artifact() {
        let capability = Arc::new(ScriptedCapability {
            chunks: ok_chunks(&["```rb\nputs 1\n```"]),
            fail_open: false,
        });
        let mut session = session_with(capability);
        session.submit("first", "gpt-4o").await.unwrap();
        assert_eq!(session.artifact().unwrap().language, "rb");

        // Same scripted response again; the artifact slot is overwritten,
        // not appended to
        session.submit("second", "gpt-4o").await.unwrap();
        assert_eq!(session.artifact().unwrap().language, "rb");
        assert_eq!(session.transcript().len(), 4);
    }

    #[tokio::test]
    async fn response_without_fences_publishes_nothing() {
        let mut session = scripted_session(ok_chunks(&["just prose, no code"]));
        session.submit("chat", "gpt-4o").await.unwrap();
        assert!(session.artifact().is_none());
    }

    #[tokio::test]
    async fn cancellation_finalizes_with_accumulated_text() {
        let mut session = session_with(Arc::new(StalledCapability));
        let cancel = CancellationToken::new();
        cancel.cancel();

        session
            .submit_with_token("hi", "gpt-4o", cancel)
            .await
            .unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "");
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn initial_prompt_without_settings_seeds_a_notice() {
        let mut session = ChatSession::new(Settings::default());
        session
            .submit_initial_prompt("build a todo app", "gpt-4o")
            .await
            .unwrap();

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, Role::Assistant);
        assert!(transcript[0].content.contains("build a todo app"));
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn each_chunk_republishes_the_transcript() {
        let mut session = scripted_session(ok_chunks(&["a", "b", "c"]));
        let mut rx = session.subscribe_transcript();

        session.submit("hi", "gpt-4o").await.unwrap();

        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest[1].content, "abc");
    }
}
