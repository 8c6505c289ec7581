//! Applying final results to the text buffer
//!
//! Three ways a capture ends: a dictation result committed directly, a
//! dictation result sent through the rewriting service first, or a spoken
//! instruction applied to existing text. Rewrite results arrive later as
//! mailbox messages and are checked against `op_seq` before touching the
//! field.

use tracing::{debug, warn};

use super::keyboard::{KeyboardState, PostprocCommit};
use super::machine::{EditTarget, RewriteJob, SessionStateMachine};
use crate::buffer::{apply_replacement, batch, find_target, UndoSnapshot};
use crate::events::Status;
use crate::rewrite::RewriteOutcome;
use crate::text::{find_speech_preset, maybe_trim, plan_final_merge};

impl SessionStateMachine {
    pub(super) fn finalize_dictation(
        &mut self,
        seq: u64,
        text: String,
        partial: Option<String>,
        committed_stable_len: usize,
    ) {
        if self.config.rewriting_active() {
            self.begin_rewrite_dictation(seq, text);
        } else {
            self.finalize_plain(seq, text, partial, committed_stable_len);
        }
    }

    /// Commit the transcript as-is, merged over any partial preview
    fn finalize_plain(
        &mut self,
        seq: u64,
        text: String,
        partial: Option<String>,
        committed_stable_len: usize,
    ) {
        let trimmed = maybe_trim(&text, self.config.trim_final_trailing_punct);
        let final_text = find_speech_preset(&self.config.speech_presets, &trimmed)
            .map(str::to_string)
            .unwrap_or(trimmed);

        if final_text.trim().is_empty() {
            self.fail_empty_result();
            return;
        }
        if seq != self.op_seq {
            return;
        }

        let plan = plan_final_merge(partial.as_deref(), committed_stable_len, &final_text);
        let Some(buffer) = self.buffer.as_deref_mut() else {
            warn!("no text buffer attached, dictation result dropped");
            self.transition_to_idle(false);
            return;
        };

        batch(buffer, |buf| {
            buf.finish_preview();
            if plan.delete_before > 0 {
                buf.delete_surrounding(plan.delete_before, 0);
            }
            if !plan.commit.is_empty() {
                buf.commit(&plan.commit);
            }
        });
        self.preview_active = false;

        if self.auto_enter_once {
            buffer.send_submit();
            self.auto_enter_once = false;
        }

        debug!(chars = final_text.chars().count(), "dictation committed");
        self.context.last_postproc_commit = None;
        self.record_commit(&final_text);
        self.context.last_asr_commit_text = Some(final_text);
        self.vibrate();
        self.continue_or_wait();
    }

    /// Show the raw transcript and hand it to the rewriting service
    fn begin_rewrite_dictation(&mut self, seq: u64, text: String) {
        let raw = maybe_trim(&text, self.config.trim_final_trailing_punct);
        if raw.trim().is_empty() {
            self.fail_empty_result();
            return;
        }
        if self.buffer.is_none() {
            warn!("no text buffer attached, dictation result dropped");
            self.transition_to_idle(false);
            return;
        }

        self.show_preview(&raw);
        self.status(Status::AiProcessing);
        self.spawn_rewrite(seq, RewriteJob::Dictation { raw });
    }

    pub(super) fn finish_rewrite_dictation(&mut self, raw: String, outcome: RewriteOutcome) {
        let failed = !outcome.ok;
        let final_text = if failed {
            warn!("rewrite failed, committing raw transcript");
            raw.clone()
        } else {
            let processed = maybe_trim(&outcome.text, self.config.trim_final_trailing_punct);
            if processed.trim().is_empty() {
                raw.clone()
            } else {
                processed
            }
        };
        let Some(buffer) = self.buffer.as_deref_mut() else {
            warn!("text buffer detached before the rewrite finished");
            self.preview_active = false;
            self.transition_to_idle(false);
            return;
        };

        batch(buffer, |buf| {
            buf.set_preview(&final_text);
            buf.finish_preview();
        });
        self.preview_active = false;

        if self.auto_enter_once {
            buffer.send_submit();
            self.auto_enter_once = false;
        }

        self.context.last_postproc_commit = (final_text != raw).then(|| PostprocCommit {
            processed: final_text.clone(),
            raw,
        });
        self.record_commit(&final_text);
        self.context.last_asr_commit_text = Some(final_text);
        self.vibrate();

        if self.session.is_running() {
            self.transition(KeyboardState::listening());
            if failed {
                self.status(Status::UsedRawText);
            }
        } else if failed {
            self.transition_to_idle(true);
            self.status(Status::UsedRawText);
        } else {
            self.wait_for_idle();
        }
    }

    /// Send the spoken instruction and its target to the rewriting service
    pub(super) fn begin_ai_edit(
        &mut self,
        seq: u64,
        text: String,
        target_is_selection: bool,
        target_text: String,
        partial_instruction: Option<String>,
    ) {
        self.status(Status::AiEditing);

        let spoken = if text.trim().is_empty() {
            partial_instruction.unwrap_or_default()
        } else {
            text
        };
        let instruction = maybe_trim(&spoken, self.config.trim_final_trailing_punct);

        if target_text.trim().is_empty() {
            self.vibrate();
            self.transition_to_idle(true);
            self.status(Status::CannotReadText);
            return;
        }
        if instruction.trim().is_empty() {
            self.vibrate();
            self.transition_to_idle(true);
            self.status(Status::EmptyResult);
            return;
        }
        if self.buffer.is_none() {
            warn!("no text buffer attached, AI edit dropped");
            self.transition_to_idle(false);
            return;
        }

        let target = if target_is_selection {
            EditTarget::Selection(target_text)
        } else if self.config.ai_edit_default_to_last_asr {
            EditTarget::LastCommit(target_text)
        } else {
            EditTarget::Entire(target_text)
        };
        self.spawn_rewrite(
            seq,
            RewriteJob::AiEdit {
                target,
                instruction,
            },
        );
    }

    pub(super) fn finish_ai_edit(&mut self, target: EditTarget, outcome: RewriteOutcome) {
        if !outcome.ok {
            warn!("AI edit failed");
            self.vibrate();
            self.transition_to_idle(true);
            self.status(Status::EditFailed);
            return;
        }
        let edited = outcome.text;
        if edited.trim().is_empty() {
            self.vibrate();
            self.transition_to_idle(true);
            self.status(Status::EmptyEditResult);
            return;
        }

        let window = self.config.context_window;
        let Some(buffer) = self.buffer.as_deref_mut() else {
            warn!("text buffer detached before the edit finished");
            self.transition_to_idle(false);
            return;
        };

        let applied = match &target {
            EditTarget::Selection(_) => {
                self.undo_snapshot = Some(UndoSnapshot::capture(&*buffer, window));
                batch(buffer, |buf| buf.commit(&edited));
                true
            }
            EditTarget::LastCommit(original) | EditTarget::Entire(original) => {
                match find_target(&*buffer, original, window) {
                    Some(location) => {
                        self.undo_snapshot = Some(UndoSnapshot::capture(&*buffer, window));
                        apply_replacement(buffer, location, original, &edited, window)
                    }
                    None => false,
                }
            }
        };

        if !applied {
            debug!("edit target no longer in the field");
            self.vibrate();
            self.transition_to_idle(true);
            self.status(Status::LastResultNotFound);
            return;
        }

        self.context.last_asr_commit_text = Some(edited);
        self.context.last_postproc_commit = None;
        self.vibrate();

        if self.session.is_running() {
            self.transition(KeyboardState::listening());
        } else {
            self.transition_to_idle_with_timing();
        }
    }

    pub(super) fn finish_apply_rewrite(&mut self, target: EditTarget, outcome: RewriteOutcome) {
        let ok = outcome.ok;
        let rewritten = if outcome.text.trim().is_empty() {
            target.text().to_string()
        } else {
            outcome.text
        };

        let window = self.config.context_window;
        let Some(buffer) = self.buffer.as_deref_mut() else {
            return;
        };

        let applied = match &target {
            EditTarget::Selection(_) => {
                self.undo_snapshot = Some(UndoSnapshot::capture(&*buffer, window));
                batch(buffer, |buf| buf.commit(&rewritten));
                true
            }
            EditTarget::LastCommit(original) => match find_target(&*buffer, original, window) {
                Some(location) => {
                    self.undo_snapshot = Some(UndoSnapshot::capture(&*buffer, window));
                    apply_replacement(buffer, location, original, &rewritten, window)
                }
                None => false,
            },
            EditTarget::Entire(_) => {
                let snapshot = UndoSnapshot::capture(&*buffer, window);
                let (before, after) = if snapshot.valid {
                    (
                        snapshot.text_before.chars().count(),
                        snapshot.text_after.chars().count(),
                    )
                } else {
                    (usize::MAX, usize::MAX)
                };
                batch(buffer, |buf| {
                    buf.finish_preview();
                    buf.delete_surrounding(before, after);
                    buf.commit(&rewritten);
                });
                self.undo_snapshot = Some(snapshot);
                true
            }
        };
        self.preview_active = false;

        if !applied {
            self.status(Status::LastResultNotFound);
            return;
        }

        if let EditTarget::LastCommit(_) = target {
            self.context.last_asr_commit_text = Some(rewritten.clone());
        }
        self.context.last_postproc_commit =
            (ok && rewritten != target.text()).then(|| PostprocCommit {
                processed: rewritten,
                raw: target.text().to_string(),
            });
        self.vibrate();
        self.status(if ok { Status::Idle } else { Status::UsedRawText });
    }

    /// Empty transcript: nothing to commit
    fn fail_empty_result(&mut self) {
        self.discard_preview();
        self.vibrate();
        self.transition_to_idle(true);
        self.status(Status::EmptyResult);
    }

    /// Back to Listening while a chunked capture keeps running, otherwise
    /// wait out the timing hint
    fn continue_or_wait(&mut self) {
        if self.session.is_running() {
            self.transition(KeyboardState::listening());
        } else {
            self.wait_for_idle();
        }
    }
}
