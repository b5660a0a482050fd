//! Conversation session and the streaming message consumer
//!
//! A [`ConversationSession`] owns the visible state of one conversation
//! (messages plus artifact) and is the only thing that mutates it. Sending a
//! message posts it through a [`MessageTransport`], then reads the streamed
//! reply fragment by fragment, applying each one as soon as it is decoded.
//!
//! At most one send runs per session. A second call while one is streaming
//! fails with [`ApiError::SendInProgress`] instead of racing the first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::state::{AttachedFile, ConversationMessage, ConversationState, StreamFragment};
use crate::stream::FragmentDecoder;
use crate::transport::{ChunkSource, MessageTransport, NewMessage};

/// Where a single send currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPhase {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Failed,
    Done,
}

/// How a stream that was opened came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The body was read to completion
    Completed,
    /// The body became unreadable; whatever was applied so far stays
    Interrupted,
}

/// Result of a send that got past the request stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub fragments_applied: usize,
    pub end: StreamEnd,
    pub revision: u64,
}

/// Result of opening a conversation view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Prior messages were loaded from the server
    Loaded { messages: usize },
    /// The conversation was empty; its goal was sent as the first message
    Started(SendOutcome),
}

/// Shared handle to one conversation's state
///
/// Cloning is cheap; all clones see and guard the same state, so a UI can keep
/// one clone for rendering while a spawned task runs [`send_message`].
///
/// [`send_message`]: ConversationSession::send_message
pub struct ConversationSession<T> {
    id: String,
    transport: Arc<T>,
    state: Arc<RwLock<ConversationState>>,
    phase: Arc<Mutex<SendPhase>>,
    in_flight: Arc<AtomicBool>,
}

impl<T> Clone for ConversationSession<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            phase: Arc::clone(&self.phase),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// Clears the in-flight flag on every exit path of a send
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: MessageTransport> ConversationSession<T> {
    pub fn new(id: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            id: id.into(),
            transport,
            state: Arc::new(RwLock::new(ConversationState::default())),
            phase: Arc::new(Mutex::new(SendPhase::Idle)),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current visible state
    pub fn snapshot(&self) -> ConversationState {
        self.state.read().clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn phase(&self) -> SendPhase {
        *self.phase.lock()
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Send a user message and consume the streamed reply.
    ///
    /// The user message is appended before the request goes out and stays
    /// even if the request is rejected.
    pub async fn send_message(
        &self,
        message: &str,
        files: Vec<AttachedFile>,
    ) -> Result<SendOutcome, ApiError> {
        let guard = InFlightGuard::acquire(&self.in_flight).ok_or(ApiError::SendInProgress)?;

        let user = ConversationMessage::user(message).with_files(files.clone());
        let (_, revision) = self.state.write().push(user);
        debug!(conversation = %self.id, revision, "user message appended");

        self.exchange(message, files, guard).await
    }

    /// Request, then stream. The caller has already put the user message in
    /// state and holds the in-flight guard.
    async fn exchange(
        &self,
        message: &str,
        files: Vec<AttachedFile>,
        _guard: InFlightGuard,
    ) -> Result<SendOutcome, ApiError> {
        self.set_phase(SendPhase::Requesting);

        let request = NewMessage {
            message: message.to_string(),
            files,
        };
        let source = match self.transport.post_message(&self.id, &request).await {
            Ok(source) => source,
            Err(e) => {
                warn!(conversation = %self.id, error = %e, "message request failed");
                self.set_phase(SendPhase::Failed);
                return Err(e);
            }
        };

        self.set_phase(SendPhase::Streaming);
        let result = self.consume(source).await;
        self.set_phase(if result.is_ok() {
            SendPhase::Done
        } else {
            SendPhase::Failed
        });
        result
    }

    /// Read the body to completion, applying fragments in arrival order
    async fn consume(&self, mut source: Box<dyn ChunkSource>) -> Result<SendOutcome, ApiError> {
        let mut decoder = FragmentDecoder::new();
        let mut reply_slot: Option<usize> = None;
        let mut applied = 0;

        let end = loop {
            match source.next_chunk().await {
                Ok(Some(chunk)) => {
                    decoder.push(&chunk);
                    while let Some(fragment) = decoder.next_fragment()? {
                        self.apply(&mut reply_slot, fragment);
                        applied += 1;
                    }
                }
                Ok(None) => {
                    if let Some(fragment) = decoder.finish()? {
                        self.apply(&mut reply_slot, fragment);
                        applied += 1;
                    }
                    break StreamEnd::Completed;
                }
                Err(e) => {
                    warn!(conversation = %self.id, error = %e, "response stream interrupted");
                    break StreamEnd::Interrupted;
                }
            }
        };

        let revision = self.revision();
        info!(conversation = %self.id, applied, ?end, "response stream finished");

        Ok(SendOutcome {
            fragments_applied: applied,
            end,
            revision,
        })
    }

    fn apply(&self, reply_slot: &mut Option<usize>, fragment: StreamFragment) {
        let mut state = self.state.write();
        if let Some(message) = fragment.message {
            *reply_slot = Some(state.put_reply(*reply_slot, message));
        }
        if let Some(artifact) = fragment.artifact {
            state.set_artifact(artifact);
        }
        debug!(conversation = %self.id, revision = state.revision, "fragment applied");
    }

    fn set_phase(&self, phase: SendPhase) {
        *self.phase.lock() = phase;
    }
}

impl ConversationSession<ApiClient> {
    /// Load the conversation. If the server has no messages yet, start it by
    /// sending its goal (and files) as the first user message.
    pub async fn open(&self) -> Result<OpenOutcome, ApiError> {
        let guard = InFlightGuard::acquire(&self.in_flight).ok_or(ApiError::SendInProgress)?;

        let stored = self.transport.list_messages(&self.id).await?;
        if !stored.is_empty() {
            let messages = stored.len();
            self.state.write().load(stored);
            return Ok(OpenOutcome::Loaded { messages });
        }

        let detail = self.transport.get_conversation(&self.id).await?;
        info!(conversation = %self.id, "no prior messages, starting conversation from goal");

        let first = ConversationMessage::user(detail.goal.clone()).with_files(detail.files.clone());
        self.state.write().start(first);

        let outcome = self.exchange(&detail.goal, detail.files, guard).await?;
        Ok(OpenOutcome::Started(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatRole;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// One step of a scripted response body
    #[derive(Clone)]
    enum Step {
        Chunk(&'static str),
        Fail,
        /// Block the read until the gate is notified
        Hold(Arc<Notify>),
    }

    struct ScriptedSource {
        steps: VecDeque<Step>,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChunkSource for ScriptedSource {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>, ApiError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            loop {
                match self.steps.pop_front() {
                    Some(Step::Chunk(text)) => return Ok(Some(Bytes::from_static(text.as_bytes()))),
                    Some(Step::Fail) => {
                        return Err(ApiError::Transport("connection reset".to_string()))
                    }
                    Some(Step::Hold(gate)) => gate.notified().await,
                    None => return Ok(None),
                }
            }
        }
    }

    /// Transport that replays the same body for every request, or rejects
    struct ScriptedTransport {
        steps: Vec<Step>,
        reject: Option<(u16, &'static str)>,
        requests: Mutex<Vec<NewMessage>>,
        reads: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn body(steps: Vec<Step>) -> Self {
            Self {
                steps,
                reject: None,
                requests: Mutex::new(Vec::new()),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn chunks(chunks: &[&'static str]) -> Self {
            Self::body(chunks.iter().map(|c| Step::Chunk(*c)).collect())
        }

        fn rejecting(status: u16, message: &'static str) -> Self {
            Self {
                reject: Some((status, message)),
                ..Self::body(Vec::new())
            }
        }
    }

    #[async_trait]
    impl MessageTransport for ScriptedTransport {
        async fn post_message(
            &self,
            _conversation_id: &str,
            request: &NewMessage,
        ) -> Result<Box<dyn ChunkSource>, ApiError> {
            self.requests.lock().push(request.clone());
            if let Some((status, message)) = self.reject {
                return Err(ApiError::Rejected {
                    status,
                    message: message.to_string(),
                });
            }
            Ok(Box::new(ScriptedSource {
                steps: self.steps.iter().cloned().collect(),
                reads: Arc::clone(&self.reads),
            }))
        }
    }

    fn session(transport: ScriptedTransport) -> ConversationSession<ScriptedTransport> {
        ConversationSession::new("c1", Arc::new(transport))
    }

    #[tokio::test]
    async fn test_only_artifact_fragments_keep_last() {
        let session = session(ScriptedTransport::chunks(&[
            "{\"artifact\":\"one\"}\r\n",
            "{\"artifact\":\"two\"}\r\n{\"artifact\":\"three\"}\r\n",
        ]));

        let outcome = session.send_message("hi", Vec::new()).await.unwrap();
        let state = session.snapshot();

        assert_eq!(outcome.fragments_applied, 3);
        assert_eq!(outcome.end, StreamEnd::Completed);
        assert_eq!(state.artifact, "three");
        assert_eq!(state.messages, vec![ConversationMessage::user("hi")]);
    }

    #[tokio::test]
    async fn test_message_fragments_replace_single_reply() {
        let session = session(ScriptedTransport::chunks(&[
            "{\"message\":\"Wor\"}\r\n",
            "{\"message\":\"Working\"}\r\n",
            "{\"message\":\"Working on it\"}\r\n",
        ]));

        session.send_message("go", Vec::new()).await.unwrap();
        let state = session.snapshot();

        assert_eq!(
            state.messages,
            vec![
                ConversationMessage::user("go"),
                ConversationMessage::assistant("Working on it"),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_send_appends_after_previous_exchange() {
        let session = session(ScriptedTransport::chunks(&["{\"message\":\"ok\"}\r\n"]));

        session.send_message("first", Vec::new()).await.unwrap();
        session.send_message("second", Vec::new()).await.unwrap();

        let roles: Vec<ChatRole> = session.snapshot().messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::Assistant
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_segment_between_fragments() {
        let session = session(ScriptedTransport::chunks(&[
            "{\"artifact\":\"a\"}\r\n\r\n{\"message\":\"b\"}",
        ]));

        let outcome = session.send_message("q", Vec::new()).await.unwrap();
        let state = session.snapshot();

        assert_eq!(outcome.fragments_applied, 2);
        assert_eq!(state.artifact, "a");
        assert_eq!(state.messages[1], ConversationMessage::assistant("b"));
    }

    #[tokio::test]
    async fn test_rejected_request_reads_nothing() {
        let transport = ScriptedTransport::rejecting(400, "bad goal");
        let reads = Arc::clone(&transport.reads);
        let session = session(transport);

        let err = session.send_message("q", Vec::new()).await.unwrap_err();

        assert_eq!(err.user_message(), "bad goal");
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert_eq!(session.phase(), SendPhase::Failed);
        assert!(!session.is_sending());
        assert_eq!(session.snapshot().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_stream_keeps_applied_state() {
        let session = session(ScriptedTransport::body(vec![
            Step::Chunk("{\"message\":\"partial\"}\r\n{\"artifact\":\"# Dr"),
            Step::Fail,
            Step::Chunk("aft\"}\r\n"),
        ]));

        let outcome = session.send_message("q", Vec::new()).await.unwrap();
        let state = session.snapshot();

        assert_eq!(outcome.end, StreamEnd::Interrupted);
        assert_eq!(outcome.fragments_applied, 1);
        assert_eq!(state.messages[1].content, "partial");
        assert_eq!(state.artifact, "");
        assert_eq!(session.phase(), SendPhase::Done);
    }

    #[tokio::test]
    async fn test_decode_error_terminates_send() {
        let transport = ScriptedTransport::chunks(&[
            "{\"message\":\"fine\"}\r\nnot json\r\n",
            "{\"artifact\":\"never\"}\r\n",
        ]);
        let reads = Arc::clone(&transport.reads);
        let session = session(transport);

        let err = session.send_message("q", Vec::new()).await.unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        let state = session.snapshot();
        assert_eq!(state.messages[1].content, "fine");
        assert_eq!(state.artifact, "");
        assert_eq!(session.phase(), SendPhase::Failed);
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn test_concurrent_send_is_rejected() {
        let gate = Arc::new(Notify::new());
        let transport = ScriptedTransport::body(vec![
            Step::Chunk("{\"message\":\"a\"}\r\n"),
            Step::Hold(Arc::clone(&gate)),
            Step::Chunk("{\"message\":\"ab\"}\r\n"),
        ]);
        let session = session(transport);

        let background = session.clone();
        let first = tokio::spawn(async move { background.send_message("one", Vec::new()).await });

        // The first send parks on the gate while holding the in-flight flag
        while session.snapshot().messages.len() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(session.is_sending());
        assert_eq!(session.phase(), SendPhase::Streaming);

        let err = session.send_message("two", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::SendInProgress));

        gate.notify_one();
        let outcome = first.await.unwrap().unwrap();

        assert_eq!(outcome.fragments_applied, 2);
        assert!(!session.is_sending());
        assert_eq!(
            session.snapshot().messages,
            vec![
                ConversationMessage::user("one"),
                ConversationMessage::assistant("ab"),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_allowed_again_after_rejection() {
        let gate = Arc::new(Notify::new());
        let session = session(ScriptedTransport::body(vec![Step::Hold(Arc::clone(&gate))]));

        let background = session.clone();
        let first = tokio::spawn(async move { background.send_message("one", Vec::new()).await });
        while !session.is_sending() {
            tokio::task::yield_now().await;
        }
        assert!(session.send_message("two", Vec::new()).await.is_err());

        gate.notify_one();
        first.await.unwrap().unwrap();

        // The rejected call left no user message and no stuck flag behind
        assert_eq!(session.snapshot().messages, vec![ConversationMessage::user("one")]);
        gate.notify_one();
        session.send_message("three", Vec::new()).await.unwrap();
        assert_eq!(session.snapshot().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_files_are_sent_and_shown_on_user_message() {
        let transport = Arc::new(ScriptedTransport::chunks(&[]));
        let session = ConversationSession::new("c1", Arc::clone(&transport));
        let file = AttachedFile {
            name: "brief.pdf".to_string(),
            contents: "Q3 numbers".to_string(),
        };

        session.send_message("read this", vec![file.clone()]).await.unwrap();

        assert_eq!(transport.requests.lock()[0].files, vec![file.clone()]);
        assert_eq!(session.snapshot().messages[0].files, vec![file]);
        assert_eq!(session.phase(), SendPhase::Done);
    }
}
