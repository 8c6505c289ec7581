//! Text buffer port: the edit field results are committed into.
//!
//! The field belongs to the host application and may change between any
//! read and write made here, so replacements locate their target by content
//! rather than by a remembered offset.

mod memory;

use serde::{Deserialize, Serialize};

use crate::text::{locate_target, TargetLocation};

pub use memory::MemoryBuffer;

/// Primitive operations on the host's edit field.
///
/// Lengths and positions are in `char`s. Reads return `None` when the field
/// refuses to report its content (for example a password field).
pub trait TextBuffer: Send {
    /// Up to `n` characters immediately before the cursor
    fn text_before_cursor(&self, n: usize) -> Option<String>;

    /// Up to `n` characters immediately after the cursor
    fn text_after_cursor(&self, n: usize) -> Option<String>;

    /// Currently selected text; empty when nothing is selected
    fn selected_text(&self) -> Option<String>;

    /// Replace the preview (or else the selection) with `text` and place the
    /// cursor after it
    fn commit(&mut self, text: &str);

    /// Delete `before` characters before the selection and `after` after it
    fn delete_surrounding(&mut self, before: usize, after: usize);

    fn set_selection(&mut self, start: usize, end: usize);

    /// Show `text` as a non-final preview, replacing any previous preview
    fn set_preview(&mut self, text: &str);

    /// Keep the preview text as ordinary committed text
    fn finish_preview(&mut self);

    fn begin_batch(&mut self);

    fn end_batch(&mut self);

    /// Send the field's submit/enter action
    fn send_submit(&mut self);
}

/// Run `f` inside a batch edit so its changes become visible together
pub fn batch<R>(buffer: &mut dyn TextBuffer, f: impl FnOnce(&mut dyn TextBuffer) -> R) -> R {
    buffer.begin_batch();
    let result = f(buffer);
    buffer.end_batch();
    result
}

/// Remove any preview without leaving text behind
pub fn clear_preview(buffer: &mut dyn TextBuffer) {
    batch(buffer, |buf| {
        buf.set_preview("");
        buf.finish_preview();
    });
}

/// Field contents around the cursor, captured before a destructive edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoSnapshot {
    pub text_before: String,
    pub text_after: String,
    /// False when the field refused to report its content
    pub valid: bool,
}

impl UndoSnapshot {
    pub fn capture(buffer: &dyn TextBuffer, window: usize) -> Self {
        match (
            buffer.text_before_cursor(window),
            buffer.text_after_cursor(window),
        ) {
            (Some(text_before), Some(text_after)) => Self {
                text_before,
                text_after,
                valid: true,
            },
            _ => Self {
                text_before: String::new(),
                text_after: String::new(),
                valid: false,
            },
        }
    }

    /// Put the captured contents back and the cursor where it was.
    ///
    /// An invalid snapshot can only clear the field.
    pub fn restore(&self, buffer: &mut dyn TextBuffer, window: usize) {
        batch(buffer, |buf| {
            if !self.valid {
                buf.delete_surrounding(usize::MAX, usize::MAX);
                return;
            }

            buf.finish_preview();
            let before = buf.text_before_cursor(window).map(|t| t.chars().count());
            let after = buf.text_after_cursor(window).map(|t| t.chars().count());
            match (before, after) {
                (Some(before), Some(after)) => buf.delete_surrounding(before, after),
                _ => buf.delete_surrounding(usize::MAX, usize::MAX),
            }

            buf.commit(&format!("{}{}", self.text_before, self.text_after));
            let cursor = self.text_before.chars().count();
            buf.set_selection(cursor, cursor);
        });
    }
}

/// Locate `target` around the cursor without modifying anything.
///
/// A match found only by searching the joined context is rejected when the
/// text before the cursor was truncated by `window`, since its offset would
/// not be absolute.
pub fn find_target(buffer: &dyn TextBuffer, target: &str, window: usize) -> Option<TargetLocation> {
    let before = buffer.text_before_cursor(window);
    let after = buffer.text_after_cursor(window);
    let location = locate_target(before.as_deref(), after.as_deref(), target)?;

    if let TargetLocation::Within { .. } = location {
        let before_len = before.as_deref().map_or(0, |b| b.chars().count());
        if before_len >= window {
            return None;
        }
    }
    Some(location)
}

/// Replace `target` at a location returned by [`find_target`].
///
/// Returns false, deleting nothing, if the target is no longer there.
pub fn apply_replacement(
    buffer: &mut dyn TextBuffer,
    location: TargetLocation,
    target: &str,
    replacement: &str,
    window: usize,
) -> bool {
    let target_len = target.chars().count();
    batch(buffer, |buf| {
        match location {
            TargetLocation::BeforeCursor => buf.delete_surrounding(target_len, 0),
            TargetLocation::AfterCursor => buf.delete_surrounding(0, target_len),
            TargetLocation::Within { end } => {
                buf.set_selection(end, end);
                let moved = buf.text_before_cursor(window);
                if !moved.is_some_and(|b| b.ends_with(target)) {
                    return false;
                }
                buf.delete_surrounding(target_len, 0);
            }
        }
        buf.commit(replacement);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: usize = 10_000;

    fn replace(buffer: &mut MemoryBuffer, target: &str, replacement: &str) -> bool {
        match find_target(&*buffer, target, WINDOW) {
            Some(location) => apply_replacement(buffer, location, target, replacement, WINDOW),
            None => false,
        }
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut buffer = MemoryBuffer::with_cursor("hello world", 5);
        let snapshot = UndoSnapshot::capture(&buffer, WINDOW);
        assert!(snapshot.valid);
        assert_eq!(snapshot.text_before, "hello");
        assert_eq!(snapshot.text_after, " world");

        buffer.commit(" there");
        buffer.set_selection(0, 0);
        assert_eq!(buffer.text(), "hello there world");

        snapshot.restore(&mut buffer, WINDOW);
        assert_eq!(buffer.text(), "hello world");
        assert_eq!(buffer.cursor(), 5);
    }

    #[test]
    fn test_invalid_snapshot_clears_field() {
        let mut buffer = MemoryBuffer::new("secret");
        buffer.set_secure(true);
        let snapshot = UndoSnapshot::capture(&buffer, WINDOW);
        assert!(!snapshot.valid);

        buffer.set_secure(false);
        snapshot.restore(&mut buffer, WINDOW);
        assert_eq!(buffer.text(), "");
    }

    #[test]
    fn test_replace_before_cursor() {
        let mut buffer = MemoryBuffer::new("今天明天开会");
        assert!(replace(&mut buffer, "明天开会", "下周一开会"));
        assert_eq!(buffer.text(), "今天下周一开会");
    }

    #[test]
    fn test_replace_after_cursor() {
        let mut buffer = MemoryBuffer::with_cursor("abc def", 4);
        assert!(replace(&mut buffer, "def", "xyz"));
        assert_eq!(buffer.text(), "abc xyz");
    }

    #[test]
    fn test_replace_last_occurrence() {
        let mut buffer = MemoryBuffer::with_cursor("one two three", 2);
        assert!(replace(&mut buffer, "two", "2"));
        assert_eq!(buffer.text(), "one 2 three");
        assert_eq!(buffer.cursor(), 5);
    }

    #[test]
    fn test_replace_missing_target_leaves_text() {
        let mut buffer = MemoryBuffer::new("nothing here");
        assert!(!replace(&mut buffer, "absent", "x"));
        assert_eq!(buffer.text(), "nothing here");
    }

    #[test]
    fn test_find_target_rejects_truncated_context() {
        let buffer = MemoryBuffer::with_cursor("xx target yyyyyyyy", 12);
        assert_eq!(
            find_target(&buffer, "target", WINDOW),
            Some(TargetLocation::Within { end: 9 })
        );
        assert_eq!(find_target(&buffer, "target", 4), None);
    }

    #[test]
    fn test_clear_preview() {
        let mut buffer = MemoryBuffer::new("abc ");
        buffer.set_preview("partial");
        assert_eq!(buffer.text(), "abc partial");
        clear_preview(&mut buffer);
        assert_eq!(buffer.text(), "abc ");
        assert_eq!(buffer.preview(), None);
    }
}
