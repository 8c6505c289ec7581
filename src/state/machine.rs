//! Core state machine implementation
//!
//! Handles user intents, transcription events, rewrite completions and
//! timers for one keyboard session. Finalization of results lives in
//! `finalize.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::keyboard::{ClipboardPreview, KeyboardState, SessionContext, SessionSnapshot, UsageStats};
use crate::buffer::{apply_replacement, batch, clear_preview, TextBuffer, UndoSnapshot};
use crate::config::Config;
use crate::events::{Status, UiEvent};
use crate::retry;
use crate::rewrite::{RewriteOutcome, RewritingService};
use crate::text::{self, TargetLocation};
use crate::transcription::{
    CaptureContext, StampedEvent, TranscriptionEvent, TranscriptionSession, TranscriptionSink,
};

const RETRY_LABEL: &str = "Retry";

/// Everything the session actor reacts to
pub(crate) enum Message {
    Intent(Intent),
    Transcription(StampedEvent),
    RewriteFinished(RewriteCompletion),
    Timer(TimerEvent),
}

/// User actions and host requests
pub(crate) enum Intent {
    MicTapToggle,
    MicPressDown,
    MicPressUp { auto_enter_after_final: bool },
    AiEditClick,
    PostprocessToggle,
    Undo { reply: oneshot::Sender<bool> },
    RetryClick,
    CommitText(String),
    ApplyActiveRewrite,
    ShowClipboardPreview(String),
    ClipboardPreviewClick,
    HideClipboardPreview,
    RestorePartialAsPreview,
    AttachBuffer(Box<dyn TextBuffer>),
    DetachBuffer,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

impl Intent {
    fn name(&self) -> &'static str {
        match self {
            Intent::MicTapToggle => "mic_tap_toggle",
            Intent::MicPressDown => "mic_press_down",
            Intent::MicPressUp { .. } => "mic_press_up",
            Intent::AiEditClick => "ai_edit_click",
            Intent::PostprocessToggle => "postprocess_toggle",
            Intent::Undo { .. } => "undo",
            Intent::RetryClick => "retry_click",
            Intent::CommitText(_) => "commit_text",
            Intent::ApplyActiveRewrite => "apply_active_rewrite",
            Intent::ShowClipboardPreview(_) => "show_clipboard_preview",
            Intent::ClipboardPreviewClick => "clipboard_preview_click",
            Intent::HideClipboardPreview => "hide_clipboard_preview",
            Intent::RestorePartialAsPreview => "restore_partial_as_preview",
            Intent::AttachBuffer(_) => "attach_buffer",
            Intent::DetachBuffer => "detach_buffer",
            Intent::Snapshot(_) => "snapshot",
            Intent::Shutdown => "shutdown",
        }
    }
}

/// Text an edit or rewrite operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EditTarget {
    Selection(String),
    LastCommit(String),
    Entire(String),
}

impl EditTarget {
    pub(crate) fn text(&self) -> &str {
        match self {
            EditTarget::Selection(t) | EditTarget::LastCommit(t) | EditTarget::Entire(t) => t,
        }
    }
}

/// Rewrite call issued by the session, returned with its result
#[derive(Debug, Clone)]
pub(crate) enum RewriteJob {
    /// Clean up a dictated transcript
    Dictation { raw: String },
    /// Apply a spoken instruction to existing text
    AiEdit { target: EditTarget, instruction: String },
    /// Rewrite existing text with the configured prompt
    Apply { target: EditTarget },
}

impl RewriteJob {
    fn name(&self) -> &'static str {
        match self {
            RewriteJob::Dictation { .. } => "dictation",
            RewriteJob::AiEdit { .. } => "ai_edit",
            RewriteJob::Apply { .. } => "apply",
        }
    }
}

pub(crate) struct RewriteCompletion {
    pub(crate) seq: u64,
    pub(crate) job: RewriteJob,
    pub(crate) outcome: RewriteOutcome,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TimerEvent {
    ProcessingTimeout { generation: u64 },
    TimingHint { seq: u64 },
}

/// The keyboard session actor
pub(crate) struct SessionStateMachine {
    pub(super) config: Config,
    pub(super) state: KeyboardState,
    /// Last capturing state entered; decides how a final result is applied
    pub(super) capture_state: Option<KeyboardState>,
    pub(super) context: SessionContext,
    pub(super) undo_snapshot: Option<UndoSnapshot>,
    /// Bumped on every new capture and every return to Idle
    pub(super) op_seq: u64,
    /// Guards apply-rewrite results; advanced by each apply, new capture and undo
    pub(super) apply_seq: u64,
    /// Discard the next final result after a forced stop
    pub(super) drop_pending_final: bool,
    pub(super) auto_enter_once: bool,
    /// A preview this session put into the field is still showing
    pub(super) preview_active: bool,
    pub(super) retry_offered: bool,
    /// Engine rebuild postponed until capture has ended
    pub(super) rebuild_pending: bool,
    pub(super) processing_timer: Option<JoinHandle<()>>,
    pub(super) timing_timer: Option<JoinHandle<()>>,
    pub(super) timer_generation: u64,
    pub(super) state_entered_at: Option<Instant>,
    pub(super) stats: UsageStats,
    pub(super) session: Box<dyn TranscriptionSession>,
    pub(super) rewriter: Arc<dyn RewritingService>,
    pub(super) buffer: Option<Box<dyn TextBuffer>>,
    pub(super) mailbox: mpsc::UnboundedSender<Message>,
    pub(super) event_tx: broadcast::Sender<UiEvent>,
}

impl SessionStateMachine {
    /// Create a new state machine together with its mailbox
    pub(crate) fn new(
        config: Config,
        session: Box<dyn TranscriptionSession>,
        rewriter: Arc<dyn RewritingService>,
        event_tx: broadcast::Sender<UiEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (mailbox, rx) = mpsc::unbounded_channel();
        let machine = Self {
            config,
            state: KeyboardState::Idle,
            capture_state: None,
            context: SessionContext::default(),
            undo_snapshot: None,
            op_seq: 0,
            apply_seq: 0,
            drop_pending_final: false,
            auto_enter_once: false,
            preview_active: false,
            retry_offered: false,
            rebuild_pending: false,
            processing_timer: None,
            timing_timer: None,
            timer_generation: 0,
            state_entered_at: None,
            stats: UsageStats::default(),
            session,
            rewriter,
            buffer: None,
            mailbox,
            event_tx,
        };
        (machine, rx)
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.mailbox.clone()
    }

    /// Run the session, processing messages until shutdown
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        info!("keyboard session started in Idle state");

        while let Some(message) = rx.recv().await {
            let shutdown = matches!(message, Message::Intent(Intent::Shutdown));
            self.handle(message);
            if shutdown {
                break;
            }
        }

        info!("keyboard session stopped");
    }

    pub(crate) fn handle(&mut self, message: Message) {
        match message {
            Message::Intent(intent) => self.handle_intent(intent),
            Message::Transcription(stamped) => self.handle_transcription(stamped),
            Message::RewriteFinished(done) => self.handle_rewrite_finished(done),
            Message::Timer(timer) => self.handle_timer(timer),
        }
    }

    fn handle_intent(&mut self, intent: Intent) {
        debug!(intent = intent.name(), state = %self.state, "intent received");

        match intent {
            Intent::MicTapToggle => self.handle_mic_tap_toggle(),
            Intent::MicPressDown => self.handle_mic_press_down(),
            Intent::MicPressUp {
                auto_enter_after_final,
            } => self.handle_mic_press_up(auto_enter_after_final),
            Intent::AiEditClick => self.handle_ai_edit_click(),
            Intent::PostprocessToggle => self.handle_postprocess_toggle(),
            Intent::Undo { reply } => {
                let undone = self.handle_undo();
                let _ = reply.send(undone);
            }
            Intent::RetryClick => self.handle_retry_click(),
            Intent::CommitText(text) => self.commit_literal_text(&text),
            Intent::ApplyActiveRewrite => self.apply_active_rewrite(),
            Intent::ShowClipboardPreview(text) => self.show_clipboard_preview(text),
            Intent::ClipboardPreviewClick => self.handle_clipboard_preview_click(),
            Intent::HideClipboardPreview => self.hide_clipboard_preview(),
            Intent::RestorePartialAsPreview => self.restore_partial_as_preview(),
            Intent::AttachBuffer(buffer) => {
                self.buffer = Some(buffer);
                self.preview_active = false;
            }
            Intent::DetachBuffer => {
                self.buffer = None;
                self.preview_active = false;
            }
            Intent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Intent::Shutdown => self.shutdown(),
        }
    }

    fn handle_mic_tap_toggle(&mut self) {
        match self.state {
            KeyboardState::Idle => self.start_normal_listening(),
            KeyboardState::Listening { .. } => self.stop_capture_and_wait(),
            KeyboardState::Processing => self.force_stop(),
            KeyboardState::AiEditListening { .. } => {
                debug!("mic tap ignored during AI edit capture");
            }
        }
    }

    fn handle_mic_press_down(&mut self) {
        match self.state {
            KeyboardState::Idle => self.start_normal_listening(),
            KeyboardState::Processing => self.force_stop(),
            _ => debug!(state = %self.state, "mic press ignored"),
        }
    }

    fn handle_mic_press_up(&mut self, auto_enter_after_final: bool) {
        self.auto_enter_once = auto_enter_after_final;
        if self.session.is_running() {
            self.stop_capture_and_wait();
        }
    }

    fn handle_ai_edit_click(&mut self) {
        if self.buffer.is_none() {
            self.status(Status::Idle);
            return;
        }

        if let KeyboardState::AiEditListening { .. } = self.state {
            self.stop_capture_and_wait();
            return;
        }

        if self.session.is_running()
            || matches!(
                self.state,
                KeyboardState::Listening { .. } | KeyboardState::Processing
            )
        {
            debug!(state = %self.state, "AI edit ignored while dictation is in progress");
            return;
        }

        let Some(target) = self.resolve_edit_target(false) else {
            return;
        };

        self.begin_operation();
        self.transition(KeyboardState::AiEditListening {
            target_is_selection: matches!(target, EditTarget::Selection(_)),
            target_text: target.text().to_string(),
            instruction: None,
        });
        let capture = CaptureContext::AiEdit {
            target_is_selection: matches!(target, EditTarget::Selection(_)),
        };
        if self.start_capture(capture) {
            self.status(Status::AiEditListening);
        }
    }

    fn handle_postprocess_toggle(&mut self) {
        let enabled = !self.config.postprocess_enabled;
        self.config.postprocess_enabled = enabled;

        if matches!(self.state, KeyboardState::Idle) && !self.session.is_running() {
            self.session.rebuild_engine(enabled);
        } else {
            debug!(state = %self.state, "engine rebuild deferred until idle");
            self.rebuild_pending = true;
        }

        info!(enabled, "post-processing toggled");
        self.status(Status::PostprocessToggled { enabled });
    }

    /// Revert the last rewrite substitution, else restore the undo
    /// snapshot. Returns whether anything changed.
    fn handle_undo(&mut self) -> bool {
        self.apply_seq += 1;
        let window = self.config.context_window;
        let commit = self
            .context
            .last_postproc_commit
            .clone()
            .filter(|c| !c.processed.is_empty());
        let Some(buffer) = self.buffer.as_deref_mut() else {
            return false;
        };

        if let Some(commit) = commit {
            let still_there = buffer
                .text_before_cursor(window)
                .is_some_and(|before| before.ends_with(&commit.processed));
            if still_there
                && apply_replacement(
                    buffer,
                    TargetLocation::BeforeCursor,
                    &commit.processed,
                    &commit.raw,
                    window,
                )
            {
                self.context.last_postproc_commit = None;
                self.status(Status::RevertedToRaw);
                return true;
            }
            debug!("field changed since the rewrite, not reverting to raw");
        }

        if let Some(snapshot) = self.undo_snapshot.take() {
            snapshot.restore(buffer, window);
            self.preview_active = false;
            self.status(Status::Undone);
            return true;
        }

        false
    }

    fn handle_retry_click(&mut self) {
        if !self.retry_offered {
            debug!("retry click without a pending retry, ignored");
            return;
        }
        self.transition(KeyboardState::Processing);
        self.schedule_processing_timeout();
        self.status(Status::Recognizing);

        let sink = TranscriptionSink::new(self.op_seq, self.mailbox.clone());
        if !self.session.retry_last_file_recognition(sink) {
            warn!("retry could not be started");
            self.transition_to_idle(false);
        }
    }

    /// Insert literal text (a typed key or a symbol)
    fn commit_literal_text(&mut self, text: &str) {
        self.save_undo_snapshot();
        if let Some(buffer) = self.buffer.as_deref_mut() {
            buffer.commit(text);
            self.preview_active = false;
        }
    }

    /// Rewrite the selection, the last result or the whole field with the
    /// configured prompt, outside of any capture
    fn apply_active_rewrite(&mut self) {
        if self.buffer.is_none() {
            return;
        }
        if !self.config.rewrite.has_credentials() {
            self.status(Status::RewriteCredentialsMissing);
            return;
        }
        let Some(target) = self.resolve_edit_target(true) else {
            return;
        };

        self.apply_seq += 1;
        self.status(Status::AiProcessing);
        self.spawn_rewrite(self.apply_seq, RewriteJob::Apply { target });
    }

    fn show_clipboard_preview(&mut self, full_text: String) {
        if full_text.is_empty() {
            return;
        }
        let preview = ClipboardPreview {
            snippet: text::snippet(&full_text, self.config.clipboard_snippet_chars),
            full_text,
        };
        self.context.clipboard_preview = Some(preview.clone());
        self.emit(UiEvent::ShowClipboardPreview { preview });
    }

    fn handle_clipboard_preview_click(&mut self) {
        let text = self
            .context
            .clipboard_preview
            .as_ref()
            .map(|p| p.full_text.clone())
            .filter(|t| !t.is_empty());

        if let Some(text) = text {
            self.finish_preview();
            self.commit_literal_text(&text);
        }
        self.hide_clipboard_preview();
    }

    fn hide_clipboard_preview(&mut self) {
        self.context.clipboard_preview = None;
        self.emit(UiEvent::HideClipboardPreview);
    }

    /// Turn a partial that was written as plain text back into a preview,
    /// so the final result can replace it
    fn restore_partial_as_preview(&mut self) {
        let KeyboardState::Listening {
            partial_text: Some(partial),
            ..
        } = &self.state
        else {
            return;
        };
        if partial.is_empty() {
            return;
        }
        let partial = partial.clone();
        let window = self.config.context_window;
        let Some(buffer) = self.buffer.as_deref_mut() else {
            return;
        };

        batch(buffer, |buf| {
            let written = buf
                .text_before_cursor(window)
                .is_some_and(|before| before.ends_with(&partial));
            if written {
                buf.delete_surrounding(partial.chars().count(), 0);
            }
            buf.set_preview(&partial);
        });
        self.preview_active = true;
    }

    fn handle_transcription(&mut self, stamped: StampedEvent) {
        let StampedEvent { seq, event } = stamped;

        match event {
            TranscriptionEvent::Final(text) => self.on_final(seq, text),
            TranscriptionEvent::Stopped => self.on_stopped(seq),
            TranscriptionEvent::ModelLoadStarted => {
                let status = if self.state.is_capturing() {
                    Status::ModelLoadingWhileListening
                } else {
                    Status::ModelLoading
                };
                self.status(status);
            }
            TranscriptionEvent::ModelLoadFinished => self.status(Status::ModelReady),
            _ if seq != self.op_seq => {
                debug!(seq, op_seq = self.op_seq, "stale transcription event ignored");
            }
            TranscriptionEvent::Partial(text) => self.on_partial(text),
            TranscriptionEvent::Error(message) => self.on_error(message),
        }
    }

    fn on_partial(&mut self, text: String) {
        let (next, preview) = match &self.state {
            KeyboardState::Listening {
                committed_stable_len,
                ..
            } => (
                KeyboardState::Listening {
                    partial_text: Some(text.clone()),
                    committed_stable_len: *committed_stable_len,
                },
                true,
            ),
            KeyboardState::AiEditListening {
                target_is_selection,
                target_text,
                ..
            } => (
                KeyboardState::AiEditListening {
                    target_is_selection: *target_is_selection,
                    target_text: target_text.clone(),
                    instruction: Some(text.clone()),
                },
                false,
            ),
            _ => {
                debug!(state = %self.state, "partial result outside of capture ignored");
                return;
            }
        };

        self.update_state(next);
        if preview {
            self.show_preview(&text);
        }
    }

    fn on_stopped(&mut self, seq: u64) {
        if self.drop_pending_final {
            debug!(seq, "capture stopped after forced stop, ignored");
            return;
        }
        if seq != self.op_seq {
            debug!(seq, op_seq = self.op_seq, "stale stop ignored");
            return;
        }

        self.transition(KeyboardState::Processing);
        self.schedule_processing_timeout();
        self.status(Status::Recognizing);
    }

    fn on_final(&mut self, seq: u64, text: String) {
        if self.drop_pending_final {
            self.drop_pending_final = false;
            debug!(seq, "final result dropped after forced stop");
            return;
        }
        if seq != self.op_seq {
            debug!(seq, op_seq = self.op_seq, "stale final result discarded");
            return;
        }
        // the watchdog only covers a final that never arrives
        self.cancel_processing_timeout();

        match self.capture_state.clone() {
            Some(KeyboardState::AiEditListening {
                target_is_selection,
                target_text,
                instruction,
            }) => self.begin_ai_edit(seq, text, target_is_selection, target_text, instruction),
            Some(KeyboardState::Listening {
                partial_text,
                committed_stable_len,
            }) => self.finalize_dictation(seq, text, partial_text, committed_stable_len),
            _ => self.finalize_dictation(seq, text, None, 0),
        }
    }

    fn on_error(&mut self, message: String) {
        warn!(error = %message, "transcription failed");

        self.discard_preview();
        self.transition_to_idle(true);
        self.status(Status::Error {
            message: message.clone(),
        });
        self.vibrate();

        let offer = retry::should_offer_retry(
            &message,
            self.session.engine_kind(),
            self.session.can_retry_last_file_recognition(),
        );
        if offer {
            self.retry_offered = true;
            self.emit(UiEvent::ShowRetryChip {
                label: RETRY_LABEL.to_string(),
            });
        } else {
            self.emit(UiEvent::HideRetryChip);
        }
    }

    fn handle_rewrite_finished(&mut self, done: RewriteCompletion) {
        let RewriteCompletion { seq, job, outcome } = done;
        let current = match job {
            RewriteJob::Apply { .. } => self.apply_seq,
            _ => self.op_seq,
        };
        if seq != current {
            debug!(seq, current, job = job.name(), "stale rewrite result discarded");
            return;
        }

        debug!(seq, job = job.name(), ok = outcome.ok, "rewrite finished");
        match job {
            RewriteJob::Dictation { raw } => self.finish_rewrite_dictation(raw, outcome),
            RewriteJob::AiEdit { target, .. } => self.finish_ai_edit(target, outcome),
            RewriteJob::Apply { target } => self.finish_apply_rewrite(target, outcome),
        }
    }

    fn handle_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::ProcessingTimeout { generation } => {
                if generation != self.timer_generation {
                    return;
                }
                self.processing_timer = None;
                if matches!(self.state, KeyboardState::Processing) {
                    warn!(
                        timeout_ms = self.config.processing_timeout_ms,
                        "no final result before timeout, returning to Idle"
                    );
                    self.finish_preview();
                    self.transition_to_idle(false);
                }
            }
            TimerEvent::TimingHint { seq } => {
                if seq == self.op_seq && !self.state.is_capturing() {
                    self.transition_to_idle(false);
                }
            }
        }
    }

    /// Pick what an edit operates on: the selection, then the last result,
    /// then (when allowed) everything around the cursor
    pub(super) fn resolve_edit_target(&mut self, fallback_to_entire: bool) -> Option<EditTarget> {
        let window = self.config.context_window;
        let default_to_last = self.config.ai_edit_default_to_last_asr;

        let resolved = {
            let buffer = self.buffer.as_deref()?;
            let last = self
                .context
                .last_asr_commit_text
                .as_ref()
                .filter(|t| !t.is_empty());

            if let Some(selection) = buffer.selected_text().filter(|s| !s.is_empty()) {
                Ok(EditTarget::Selection(selection))
            } else if let Some(last) = last.filter(|_| default_to_last) {
                Ok(EditTarget::LastCommit(last.clone()))
            } else if default_to_last && !fallback_to_entire {
                Err(Status::NothingToEdit)
            } else {
                match (
                    buffer.text_before_cursor(window),
                    buffer.text_after_cursor(window),
                ) {
                    (Some(before), Some(after)) if !(before.is_empty() && after.is_empty()) => {
                        Ok(EditTarget::Entire(before + &after))
                    }
                    (Some(_), Some(_)) => Err(Status::NothingToEdit),
                    _ => Err(Status::CannotReadText),
                }
            }
        };

        match resolved {
            Ok(target) => Some(target),
            Err(status) => {
                self.status(status);
                None
            }
        }
    }

    fn start_normal_listening(&mut self) {
        self.begin_operation();
        self.transition(KeyboardState::listening());
        if self.start_capture(CaptureContext::Dictation) {
            self.status(Status::Listening);
        }
    }

    /// New operation: supersede everything issued before it
    fn begin_operation(&mut self) {
        self.op_seq += 1;
        self.apply_seq += 1;
        self.cancel_processing_timeout();
        self.cancel_timing_hint();
        self.drop_pending_final = false;
        self.auto_enter_once = false;
    }

    fn start_capture(&mut self, context: CaptureContext) -> bool {
        let sink = TranscriptionSink::new(self.op_seq, self.mailbox.clone());
        match self.session.start(context, sink) {
            Ok(()) => {
                debug!(op_seq = self.op_seq, ?context, "capture started");
                true
            }
            Err(e) => {
                warn!(error = %e, "capture failed to start");
                self.transition_to_idle(true);
                self.status(Status::Error {
                    message: e.to_string(),
                });
                self.vibrate();
                false
            }
        }
    }

    fn stop_capture_and_wait(&mut self) {
        self.session.stop();
        self.transition(KeyboardState::Processing);
        self.schedule_processing_timeout();
        self.status(Status::Recognizing);
    }

    /// Abandon the pending result of the current capture
    fn force_stop(&mut self) {
        info!(op_seq = self.op_seq, "processing cancelled by user");
        self.cancel_processing_timeout();
        self.drop_pending_final = true;
        if self.session.is_running() {
            self.session.stop();
        }
        self.discard_preview();
        self.transition_to_idle(true);
        self.status(Status::Cancelled);
    }

    /// Perform a state transition
    pub(super) fn transition(&mut self, new_state: KeyboardState) {
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %self.state,
            to = %new_state,
            duration_ms = duration_ms,
            op_seq = self.op_seq,
            "state transition"
        );

        if !matches!(new_state, KeyboardState::Idle) {
            self.retry_offered = false;
            self.emit(UiEvent::HideRetryChip);
        }
        self.state_entered_at = if matches!(new_state, KeyboardState::Idle) {
            None
        } else {
            Some(Instant::now())
        };
        self.update_state(new_state);
    }

    /// Replace the state without logging a transition (partial updates)
    fn update_state(&mut self, new_state: KeyboardState) {
        if new_state.is_capturing() {
            self.capture_state = Some(new_state.clone());
        }
        self.state = new_state.clone();
        self.emit(UiEvent::StateChanged { state: new_state });
    }

    /// Return to Idle, invalidating every in-flight result
    pub(super) fn transition_to_idle(&mut self, keep_message: bool) {
        self.op_seq += 1;
        self.cancel_processing_timeout();
        self.cancel_timing_hint();
        self.auto_enter_once = false;
        self.transition(KeyboardState::Idle);

        if self.rebuild_pending && !self.session.is_running() {
            self.rebuild_pending = false;
            self.session.rebuild_engine(self.config.postprocess_enabled);
        }
        if !keep_message {
            self.status(Status::Idle);
        }
    }

    /// Show the last request latency briefly before going idle
    pub(super) fn transition_to_idle_with_timing(&mut self) {
        match self.session.last_request_duration_ms() {
            Some(ms) => {
                self.status(Status::LastRequest { ms });
                let seq = self.op_seq;
                self.cancel_timing_hint();
                let handle = self.schedule_timer(self.config.timing_hint(), TimerEvent::TimingHint { seq });
                self.timing_timer = Some(handle);
            }
            None => self.transition_to_idle(false),
        }
    }

    /// Capture ended but results are still coming: wait in Processing
    pub(super) fn wait_for_idle(&mut self) {
        self.transition(KeyboardState::Processing);
        self.schedule_processing_timeout();
        self.transition_to_idle_with_timing();
    }

    fn schedule_timer(&self, delay: Duration, timer: TimerEvent) -> JoinHandle<()> {
        let tx = self.mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Message::Timer(timer));
        })
    }

    pub(super) fn schedule_processing_timeout(&mut self) {
        self.cancel_processing_timeout();
        let generation = self.timer_generation;
        let handle = self.schedule_timer(
            self.config.processing_timeout(),
            TimerEvent::ProcessingTimeout { generation },
        );
        self.processing_timer = Some(handle);
    }

    fn cancel_processing_timeout(&mut self) {
        if let Some(timer) = self.processing_timer.take() {
            timer.abort();
        }
        self.timer_generation += 1;
    }

    fn cancel_timing_hint(&mut self) {
        if let Some(timer) = self.timing_timer.take() {
            timer.abort();
        }
    }

    pub(super) fn spawn_rewrite(&self, seq: u64, job: RewriteJob) {
        let rewriter = Arc::clone(&self.rewriter);
        let config = self.config.rewrite.clone();
        let tx = self.mailbox.clone();

        debug!(seq, job = job.name(), "rewrite call issued");
        tokio::spawn(async move {
            let outcome = match &job {
                RewriteJob::Dictation { raw } => rewriter.process(raw, &config).await,
                RewriteJob::AiEdit {
                    target,
                    instruction,
                } => rewriter.edit(target.text(), instruction, &config).await,
                RewriteJob::Apply { target } => rewriter.process(target.text(), &config).await,
            };
            let _ = tx.send(Message::RewriteFinished(RewriteCompletion { seq, job, outcome }));
        });
    }

    pub(super) fn save_undo_snapshot(&mut self) {
        if let Some(buffer) = self.buffer.as_deref() {
            self.undo_snapshot = Some(UndoSnapshot::capture(buffer, self.config.context_window));
        }
    }

    pub(super) fn show_preview(&mut self, text: &str) {
        if let Some(buffer) = self.buffer.as_deref_mut() {
            buffer.set_preview(text);
            self.preview_active = true;
        }
    }

    /// Keep whatever preview is showing as plain text
    pub(super) fn finish_preview(&mut self) {
        if !self.preview_active {
            return;
        }
        if let Some(buffer) = self.buffer.as_deref_mut() {
            buffer.finish_preview();
        }
        self.preview_active = false;
    }

    /// Remove whatever preview is showing
    pub(super) fn discard_preview(&mut self) {
        if !self.preview_active {
            return;
        }
        if let Some(buffer) = self.buffer.as_deref_mut() {
            clear_preview(buffer);
        }
        self.preview_active = false;
    }

    pub(super) fn record_commit(&mut self, text: &str) {
        let audio_ms = self.session.take_last_audio_ms();
        self.stats.record(text.chars().count(), audio_ms);
    }

    pub(super) fn status(&self, status: Status) {
        self.emit(UiEvent::StatusMessage { status });
    }

    pub(super) fn vibrate(&self) {
        self.emit(UiEvent::Vibrate);
    }

    fn emit(&self, event: UiEvent) {
        debug!(%event, "emitting ui event");
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            context: self.context.clone(),
            op_seq: self.op_seq,
            postprocess_enabled: self.config.postprocess_enabled,
            has_undo_snapshot: self.undo_snapshot.is_some(),
            stats: self.stats,
        }
    }

    fn shutdown(&mut self) {
        info!("keyboard session shutting down");
        if let Some(timer) = self.processing_timer.take() {
            timer.abort();
        }
        self.cancel_timing_hint();
        if self.session.is_running() {
            self.session.stop();
        }
        self.finish_preview();
        self.op_seq += 1;
        self.apply_seq += 1;
    }
}
