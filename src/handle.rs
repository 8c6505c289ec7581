//! Entry point for the housing application
//!
//! [`spawn`] starts the keyboard session actor; the returned
//! [`SessionHandle`] forwards user intents to it and hands out UI event
//! subscriptions.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::buffer::TextBuffer;
use crate::config::Config;
use crate::error::SessionError;
use crate::events::UiEvent;
use crate::rewrite::RewritingService;
use crate::state::{Intent, Message, SessionSnapshot, SessionStateMachine};
use crate::transcription::TranscriptionSession;

/// Capacity of the UI event fan-out
const EVENT_CAPACITY: usize = 64;

/// Start a keyboard session on the current tokio runtime
pub fn spawn(
    config: Config,
    session: Box<dyn TranscriptionSession>,
    rewriter: Arc<dyn RewritingService>,
) -> (SessionHandle, JoinHandle<()>) {
    let (event_tx, _event_rx) = broadcast::channel::<UiEvent>(EVENT_CAPACITY);
    let (machine, rx) = SessionStateMachine::new(config, session, rewriter, event_tx.clone());
    let handle = SessionHandle {
        tx: machine.sender(),
        event_tx,
    };
    let task = tokio::spawn(machine.run(rx));
    (handle, task)
}

/// Cloneable handle to a running keyboard session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
    event_tx: broadcast::Sender<UiEvent>,
}

impl SessionHandle {
    /// Subscribe to UI events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.event_tx.subscribe()
    }

    fn send(&self, intent: Intent) -> Result<(), SessionError> {
        self.tx
            .send(Message::Intent(intent))
            .map_err(|_| SessionError::Closed)
    }

    /// Tap-to-talk: start, stop, or cancel depending on state
    pub fn mic_tap_toggle(&self) -> Result<(), SessionError> {
        self.send(Intent::MicTapToggle)
    }

    /// Hold-to-talk press
    pub fn mic_press_down(&self) -> Result<(), SessionError> {
        self.send(Intent::MicPressDown)
    }

    /// Hold-to-talk release; optionally submit the field after the result
    pub fn mic_press_up(&self, auto_enter_after_final: bool) -> Result<(), SessionError> {
        self.send(Intent::MicPressUp {
            auto_enter_after_final,
        })
    }

    pub fn ai_edit_click(&self) -> Result<(), SessionError> {
        self.send(Intent::AiEditClick)
    }

    pub fn postprocess_toggle(&self) -> Result<(), SessionError> {
        self.send(Intent::PostprocessToggle)
    }

    /// Undo the last destructive edit; resolves to whether anything changed
    pub async fn undo(&self) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Intent::Undo { reply })?;
        rx.await.map_err(|_| SessionError::NoReply)
    }

    pub fn retry_click(&self) -> Result<(), SessionError> {
        self.send(Intent::RetryClick)
    }

    /// Insert literal text, keeping an undo snapshot
    pub fn commit_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Intent::CommitText(text.into()))
    }

    pub fn apply_active_rewrite(&self) -> Result<(), SessionError> {
        self.send(Intent::ApplyActiveRewrite)
    }

    pub fn show_clipboard_preview(&self, full_text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Intent::ShowClipboardPreview(full_text.into()))
    }

    pub fn clipboard_preview_click(&self) -> Result<(), SessionError> {
        self.send(Intent::ClipboardPreviewClick)
    }

    pub fn hide_clipboard_preview(&self) -> Result<(), SessionError> {
        self.send(Intent::HideClipboardPreview)
    }

    pub fn restore_partial_as_preview(&self) -> Result<(), SessionError> {
        self.send(Intent::RestorePartialAsPreview)
    }

    /// Bind the field results are written into
    pub fn attach_buffer(&self, buffer: Box<dyn TextBuffer>) -> Result<(), SessionError> {
        self.send(Intent::AttachBuffer(buffer))
    }

    pub fn detach_buffer(&self) -> Result<(), SessionError> {
        self.send(Intent::DetachBuffer)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Intent::Snapshot(reply))?;
        rx.await.map_err(|_| SessionError::NoReply)
    }

    /// Stop capture and end the session actor
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Intent::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryBuffer;
    use crate::events::Status;
    use crate::state::KeyboardState;
    use crate::testing::{MockRewriter, MockSession};
    use tokio_test::{assert_err, assert_ok};

    fn start() -> (SessionHandle, JoinHandle<()>, MockSession) {
        let session = MockSession::default();
        let (handle, task) = spawn(
            Config::default(),
            Box::new(session.clone()),
            Arc::new(MockRewriter::new()),
        );
        (handle, task, session)
    }

    #[tokio::test]
    async fn test_dictation_through_handle() {
        let (handle, _task, session) = start();
        let buffer = MemoryBuffer::new("");
        let mut events = handle.subscribe();

        assert_ok!(handle.attach_buffer(Box::new(buffer.clone())));
        assert_ok!(handle.mic_tap_toggle());
        let snapshot = assert_ok!(handle.snapshot().await);
        assert_eq!(snapshot.state, KeyboardState::listening());

        assert_ok!(handle.mic_tap_toggle());
        assert_ok!(handle.snapshot().await);
        let sink = session.sink();
        sink.stopped();
        sink.final_text("hello");

        let snapshot = assert_ok!(handle.snapshot().await);
        assert_eq!(snapshot.state, KeyboardState::Idle);
        assert_eq!(buffer.text(), "hello");

        assert_eq!(assert_ok!(events.recv().await), UiEvent::HideRetryChip);
        assert_eq!(
            assert_ok!(events.recv().await),
            UiEvent::StateChanged {
                state: KeyboardState::listening()
            }
        );
        assert_eq!(
            assert_ok!(events.recv().await),
            UiEvent::StatusMessage {
                status: Status::Listening
            }
        );
    }

    #[tokio::test]
    async fn test_undo_through_handle() {
        let (handle, _task, _session) = start();
        let buffer = MemoryBuffer::new("a");

        assert_ok!(handle.attach_buffer(Box::new(buffer.clone())));
        assert_ok!(handle.commit_text("b"));
        assert!(assert_ok!(handle.undo().await));
        assert_eq!(buffer.text(), "a");
        assert!(!assert_ok!(handle.undo().await));
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (handle, task, session) = start();
        assert_ok!(handle.mic_tap_toggle());
        assert_ok!(handle.shutdown());
        assert_ok!(task.await);

        assert!(!session.probe().running);
        assert_err!(handle.mic_tap_toggle());
        assert_err!(handle.snapshot().await);
    }
}
