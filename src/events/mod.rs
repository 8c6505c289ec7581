//! Events module for keyboard UI notifications
//!
//! Everything the housing application needs to render (state, status line,
//! haptics, clipboard preview, retry chip) is broadcast as a [`UiEvent`].

use serde::{Deserialize, Serialize};

use crate::state::{ClipboardPreview, KeyboardState};

/// Status line messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    Idle,
    Listening,
    AiEditListening,
    Recognizing,
    Cancelled,
    AiProcessing,
    AiEditing,
    /// Rewriting failed; the raw transcript was committed instead
    UsedRawText,
    EditFailed,
    EmptyEditResult,
    EmptyResult,
    CannotReadText,
    LastResultNotFound,
    NothingToEdit,
    RevertedToRaw,
    Undone,
    PostprocessToggled { enabled: bool },
    RewriteCredentialsMissing,
    LastRequest { ms: u64 },
    ModelLoading,
    ModelLoadingWhileListening,
    ModelReady,
    /// Error text reported by the transcription engine
    Error { message: String },
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, "Ready"),
            Status::Listening => write!(f, "Listening…"),
            Status::AiEditListening => write!(f, "Say how to edit…"),
            Status::Recognizing => write!(f, "Recognizing…"),
            Status::Cancelled => write!(f, "Cancelled"),
            Status::AiProcessing => write!(f, "AI processing…"),
            Status::AiEditing => write!(f, "AI editing…"),
            Status::UsedRawText => write!(f, "AI post-processing failed, used raw text"),
            Status::EditFailed => write!(f, "AI edit failed"),
            Status::EmptyEditResult => write!(f, "AI returned an empty result"),
            Status::EmptyResult => write!(f, "Recognition result is empty"),
            Status::CannotReadText => write!(f, "Cannot read text from this field"),
            Status::LastResultNotFound => write!(f, "Last result not found"),
            Status::NothingToEdit => write!(f, "Nothing to edit"),
            Status::RevertedToRaw => write!(f, "Reverted to raw text"),
            Status::Undone => write!(f, "Undone"),
            Status::PostprocessToggled { enabled } => {
                write!(f, "AI post-processing: {}", if *enabled { "on" } else { "off" })
            }
            Status::RewriteCredentialsMissing => write!(f, "Configure the AI service first"),
            Status::LastRequest { ms } => write!(f, "Last request: {} ms", ms),
            Status::ModelLoading => write!(f, "Loading model…"),
            Status::ModelLoadingWhileListening => write!(f, "Listening, model still loading…"),
            Status::ModelReady => write!(f, "Model ready"),
            Status::Error { message } => write!(f, "{}", message),
        }
    }
}

/// Notifications emitted by the keyboard session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    StateChanged { state: KeyboardState },

    StatusMessage { status: Status },

    /// Haptic acknowledgement
    Vibrate,

    ShowClipboardPreview { preview: ClipboardPreview },

    HideClipboardPreview,

    ShowRetryChip { label: String },

    HideRetryChip,
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEvent::StateChanged { state } => write!(f, "STATE_CHANGED ({})", state),
            UiEvent::StatusMessage { status } => write!(f, "STATUS ({})", status),
            UiEvent::Vibrate => write!(f, "VIBRATE"),
            UiEvent::ShowClipboardPreview { preview } => {
                write!(f, "SHOW_CLIPBOARD_PREVIEW ({})", preview.snippet)
            }
            UiEvent::HideClipboardPreview => write!(f, "HIDE_CLIPBOARD_PREVIEW"),
            UiEvent::ShowRetryChip { label } => write!(f, "SHOW_RETRY_CHIP ({})", label),
            UiEvent::HideRetryChip => write!(f, "HIDE_RETRY_CHIP"),
        }
    }
}
