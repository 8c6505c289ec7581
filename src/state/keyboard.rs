//! Keyboard state and per-session data

use serde::{Deserialize, Serialize};

/// The keyboard's capture state; exactly one is active at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyboardState {
    /// No capture in progress
    Idle,
    /// Dictation capture is active
    Listening {
        /// Latest streaming partial, shown as a preview
        partial_text: Option<String>,
        /// Characters of the utterance already written into the field
        committed_stable_len: usize,
    },
    /// Capture stopped, waiting for the final result
    Processing,
    /// Capturing a spoken instruction for editing existing text
    AiEditListening {
        target_is_selection: bool,
        target_text: String,
        instruction: Option<String>,
    },
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::Idle
    }
}

impl KeyboardState {
    /// Fresh dictation state with nothing previewed yet
    pub fn listening() -> Self {
        Self::Listening {
            partial_text: None,
            committed_stable_len: 0,
        }
    }

    /// Whether audio is being captured in this state
    pub fn is_capturing(&self) -> bool {
        matches!(
            self,
            KeyboardState::Listening { .. } | KeyboardState::AiEditListening { .. }
        )
    }
}

impl std::fmt::Display for KeyboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyboardState::Idle => write!(f, "Idle"),
            KeyboardState::Listening { .. } => write!(f, "Listening"),
            KeyboardState::Processing => write!(f, "Processing"),
            KeyboardState::AiEditListening { .. } => write!(f, "AiEditListening"),
        }
    }
}

/// A rewrite substitution that undo can revert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostprocCommit {
    pub processed: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPreview {
    pub full_text: String,
    pub snippet: String,
}

/// Data carried across states for the life of a keyboard session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Most recent text written by a finalize step
    pub last_asr_commit_text: Option<String>,
    pub last_postproc_commit: Option<PostprocCommit>,
    pub clipboard_preview: Option<ClipboardPreview>,
}

/// Usage counters for one keyboard session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub commits: u64,
    pub chars: u64,
    pub audio_ms: u64,
}

impl UsageStats {
    pub fn record(&mut self, chars: usize, audio_ms: Option<u64>) {
        self.commits += 1;
        self.chars += chars as u64;
        self.audio_ms += audio_ms.unwrap_or(0);
    }
}

/// Point-in-time view of a keyboard session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: KeyboardState,
    pub context: SessionContext,
    pub op_seq: u64,
    pub postprocess_enabled: bool,
    pub has_undo_snapshot: bool,
    pub stats: UsageStats,
}
