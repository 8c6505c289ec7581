//! Transcription session contract
//!
//! A session captures audio and, once capture ends, performs a single
//! recognition call. Results are delivered through the [`TranscriptionSink`]
//! handed to `start`, which feeds them into the keyboard session's mailbox.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::CaptureError;
use crate::state::Message;

/// What the captured speech will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum CaptureContext {
    /// Dictated text to insert
    Dictation,
    /// A spoken instruction for editing existing text
    AiEdit { target_is_selection: bool },
}

/// How the underlying recognizer delivers results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Buffers the whole utterance and uploads it once; can be retried
    File,
    /// Streams audio while capturing; nothing is kept for a retry
    Streaming,
}

/// Events a session reports about one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionEvent {
    Partial(String),
    Final(String),
    Error(String),
    /// Audio capture ended; a final result or error may still follow
    Stopped,
    ModelLoadStarted,
    ModelLoadFinished,
}

/// Transcription event tagged with the operation that started the capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedEvent {
    pub seq: u64,
    pub event: TranscriptionEvent,
}

/// Delivers a capture's events to the keyboard session.
///
/// Cheap to clone and usable from any thread. Events sent after the session
/// has shut down are dropped.
#[derive(Debug, Clone)]
pub struct TranscriptionSink {
    seq: u64,
    tx: mpsc::UnboundedSender<Message>,
}

impl TranscriptionSink {
    pub(crate) fn new(seq: u64, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { seq, tx }
    }

    /// Operation sequence this sink was issued for
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn send(&self, event: TranscriptionEvent) {
        let stamped = StampedEvent {
            seq: self.seq,
            event,
        };
        if self.tx.send(Message::Transcription(stamped)).is_err() {
            debug!(seq = self.seq, "keyboard session gone, transcription event dropped");
        }
    }

    pub fn partial(&self, text: impl Into<String>) {
        self.send(TranscriptionEvent::Partial(text.into()));
    }

    pub fn final_text(&self, text: impl Into<String>) {
        self.send(TranscriptionEvent::Final(text.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(TranscriptionEvent::Error(message.into()));
    }

    pub fn stopped(&self) {
        self.send(TranscriptionEvent::Stopped);
    }
}

/// One audio capture plus recognition engine.
///
/// Only one instance is active per keyboard session. `is_running` reflects
/// capture, not network activity: a recognition call may still be in flight
/// after `Stopped` has been reported.
pub trait TranscriptionSession: Send {
    /// Begin capturing. Exactly one `Final` or `Error` follows, always
    /// preceded by `Stopped`.
    fn start(&mut self, context: CaptureContext, events: TranscriptionSink) -> Result<(), CaptureError>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn engine_kind(&self) -> EngineKind;

    /// Recreate the engine; only called while no capture is active
    fn rebuild_engine(&mut self, postprocess_enabled: bool);

    /// Wall-clock latency of the most recent completed recognition call
    fn last_request_duration_ms(&self) -> Option<u64>;

    /// Whether the last buffered utterance can be sent again
    fn can_retry_last_file_recognition(&self) -> bool {
        false
    }

    /// Re-send the last buffered utterance, reporting on `events`.
    /// Returns false if nothing could be started.
    fn retry_last_file_recognition(&mut self, _events: TranscriptionSink) -> bool {
        false
    }

    /// Audio duration of the last capture, consumed once for statistics
    fn take_last_audio_ms(&mut self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_stamps_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = TranscriptionSink::new(7, tx);
        sink.partial("hi");
        sink.stopped();

        match rx.try_recv() {
            Ok(Message::Transcription(stamped)) => {
                assert_eq!(stamped.seq, 7);
                assert_eq!(stamped.event, TranscriptionEvent::Partial("hi".into()));
            }
            _ => panic!("expected a transcription message"),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(Message::Transcription(StampedEvent {
                event: TranscriptionEvent::Stopped,
                ..
            }))
        ));
    }

    #[test]
    fn test_sink_tolerates_closed_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        TranscriptionSink::new(1, tx).final_text("late");
    }

    #[test]
    fn test_capture_context_serialization() {
        let json = serde_json::to_string(&CaptureContext::AiEdit {
            target_is_selection: true,
        })
        .unwrap();
        assert!(json.contains("ai_edit"));
    }
}
