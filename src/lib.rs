//! dictation-core: session orchestrator for voice dictation keyboards
//!
//! Coordinates one keyboard session:
//! - Explicit state machine for dictation and AI-edit capture
//! - Operation sequencing so superseded results never reach the field
//! - Merging streaming partials and final transcripts into the edit field
//! - Optional rewriting of results, with undo back to the raw transcript
//! - Retry of failed file recognitions
//!
//! Audio capture, speech recognition, the rewriting backend and the edit
//! field itself are supplied by the host through the [`TranscriptionSession`],
//! [`RewritingService`] and [`TextBuffer`] traits.

pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
mod handle;
pub mod retry;
pub mod rewrite;
pub mod state;
pub mod telemetry;
pub mod text;
pub mod transcription;

#[cfg(test)]
mod testing;

pub use buffer::{MemoryBuffer, TextBuffer, UndoSnapshot};
pub use config::{Config, RewriteConfig, SpeechPreset};
pub use error::{CaptureError, SessionError};
pub use events::{Status, UiEvent};
pub use handle::{spawn, SessionHandle};
pub use rewrite::{RewriteOutcome, RewritingService};
pub use state::{ClipboardPreview, KeyboardState, PostprocCommit, SessionContext, SessionSnapshot, UsageStats};
pub use transcription::{
    CaptureContext, EngineKind, TranscriptionEvent, TranscriptionSession, TranscriptionSink,
};
