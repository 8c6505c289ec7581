//! Keyboard session state machine
//!
//! States:
//! - Idle: no capture in progress
//! - Listening: dictating; partials are previewed in the field
//! - Processing: capture stopped, final result or rewrite pending
//! - AiEditListening: capturing a spoken edit instruction
//!
//! The machine runs as a single actor. Asynchronous work (recognition,
//! rewriting, timers) reports back into its mailbox, and every result
//! carries the operation sequence it was issued under so superseded
//! results are discarded instead of applied.

mod finalize;
mod keyboard;
mod machine;

pub use keyboard::{
    ClipboardPreview, KeyboardState, PostprocCommit, SessionContext, SessionSnapshot, UsageStats,
};
pub(crate) use machine::{Intent, Message, SessionStateMachine};
