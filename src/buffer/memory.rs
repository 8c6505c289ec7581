//! In-process text buffer
//!
//! Behaves like an editor input connection: a cursor/selection, an optional
//! preview (composing) region, and batch edits that are published in one
//! step when the outermost batch ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::TextBuffer;

#[derive(Debug, Clone, Default)]
struct Document {
    text: Vec<char>,
    sel_start: usize,
    sel_end: usize,
    preview: Option<(usize, usize)>,
}

impl Document {
    /// Range replaced by the next commit or preview
    fn target_range(&self) -> (usize, usize) {
        self.preview.unwrap_or((self.sel_start, self.sel_end))
    }

    fn splice(&mut self, start: usize, end: usize, text: &str) -> usize {
        let inserted: Vec<char> = text.chars().collect();
        let len = inserted.len();
        self.text.splice(start..end, inserted);
        start + len
    }

    fn commit(&mut self, text: &str) {
        let (start, end) = self.target_range();
        let cursor = self.splice(start, end, text);
        self.sel_start = cursor;
        self.sel_end = cursor;
        self.preview = None;
    }

    fn set_preview(&mut self, text: &str) {
        let (start, end) = self.target_range();
        let cursor = self.splice(start, end, text);
        self.sel_start = cursor;
        self.sel_end = cursor;
        self.preview = (cursor > start).then_some((start, cursor));
    }

    fn delete_surrounding(&mut self, before: usize, after: usize) {
        let after_end = self.sel_end.saturating_add(after).min(self.text.len());
        self.text.drain(self.sel_end..after_end);

        let before_start = self.sel_start.saturating_sub(before);
        self.text.drain(before_start..self.sel_start);
        let removed = self.sel_start - before_start;
        self.sel_start -= removed;
        self.sel_end -= removed;
        self.preview = None;
    }

    fn set_selection(&mut self, start: usize, end: usize) {
        let len = self.text.len();
        let (start, end) = (start.min(len), end.min(len));
        self.sel_start = start.min(end);
        self.sel_end = start.max(end);
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.text[start..end].iter().collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    live: Document,
    staged: Option<Document>,
    batch_depth: usize,
    secure: bool,
    submits: usize,
}

impl Inner {
    fn current(&self) -> &Document {
        self.staged.as_ref().unwrap_or(&self.live)
    }

    fn current_mut(&mut self) -> &mut Document {
        match self.staged {
            Some(ref mut doc) => doc,
            None => &mut self.live,
        }
    }
}

/// Cloneable in-memory [`TextBuffer`]; clones share the same document
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBuffer {
    /// Buffer holding `text` with the cursor at the end
    pub fn new(text: &str) -> Self {
        let cursor = text.chars().count();
        Self::with_cursor(text, cursor)
    }

    pub fn with_cursor(text: &str, cursor: usize) -> Self {
        let mut doc = Document {
            text: text.chars().collect(),
            ..Document::default()
        };
        doc.set_selection(cursor, cursor);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                live: doc,
                ..Inner::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Published contents; edits inside an open batch are not visible
    pub fn text(&self) -> String {
        self.lock().live.text.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.lock().live.sel_end
    }

    pub fn selection(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.live.sel_start, inner.live.sel_end)
    }

    /// Text currently shown as a preview, if any
    pub fn preview(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .live
            .preview
            .map(|(start, end)| inner.live.slice(start, end))
    }

    /// Refuse content reads, like a password field
    pub fn set_secure(&self, secure: bool) {
        self.lock().secure = secure;
    }

    pub fn submit_count(&self) -> usize {
        self.lock().submits
    }
}

impl TextBuffer for MemoryBuffer {
    fn text_before_cursor(&self, n: usize) -> Option<String> {
        let inner = self.lock();
        if inner.secure {
            return None;
        }
        let doc = inner.current();
        Some(doc.slice(doc.sel_start.saturating_sub(n), doc.sel_start))
    }

    fn text_after_cursor(&self, n: usize) -> Option<String> {
        let inner = self.lock();
        if inner.secure {
            return None;
        }
        let doc = inner.current();
        let end = doc.sel_end.saturating_add(n).min(doc.text.len());
        Some(doc.slice(doc.sel_end, end))
    }

    fn selected_text(&self) -> Option<String> {
        let inner = self.lock();
        if inner.secure {
            return None;
        }
        let doc = inner.current();
        Some(doc.slice(doc.sel_start, doc.sel_end))
    }

    fn commit(&mut self, text: &str) {
        self.lock().current_mut().commit(text);
    }

    fn delete_surrounding(&mut self, before: usize, after: usize) {
        self.lock().current_mut().delete_surrounding(before, after);
    }

    fn set_selection(&mut self, start: usize, end: usize) {
        self.lock().current_mut().set_selection(start, end);
    }

    fn set_preview(&mut self, text: &str) {
        self.lock().current_mut().set_preview(text);
    }

    fn finish_preview(&mut self) {
        self.lock().current_mut().preview = None;
    }

    fn begin_batch(&mut self) {
        let mut inner = self.lock();
        if inner.batch_depth == 0 {
            inner.staged = Some(inner.live.clone());
        }
        inner.batch_depth += 1;
    }

    fn end_batch(&mut self) {
        let mut inner = self.lock();
        if inner.batch_depth == 0 {
            return;
        }
        inner.batch_depth -= 1;
        if inner.batch_depth == 0 {
            if let Some(doc) = inner.staged.take() {
                inner.live = doc;
            }
        }
    }

    fn send_submit(&mut self) {
        self.lock().submits += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_replaces_selection() {
        let mut buffer = MemoryBuffer::new("hello world");
        buffer.set_selection(6, 11);
        assert_eq!(buffer.selected_text().as_deref(), Some("world"));

        buffer.commit("there");
        assert_eq!(buffer.text(), "hello there");
        assert_eq!(buffer.cursor(), 11);
    }

    #[test]
    fn test_preview_is_replaceable() {
        let mut buffer = MemoryBuffer::new("> ");
        buffer.set_preview("你");
        buffer.set_preview("你好");
        assert_eq!(buffer.text(), "> 你好");
        assert_eq!(buffer.preview().as_deref(), Some("你好"));

        buffer.commit("你好。");
        assert_eq!(buffer.text(), "> 你好。");
        assert_eq!(buffer.preview(), None);
    }

    #[test]
    fn test_delete_surrounding_clamps() {
        let mut buffer = MemoryBuffer::with_cursor("abcdef", 3);
        buffer.delete_surrounding(1, 1);
        assert_eq!(buffer.text(), "abef");
        assert_eq!(buffer.cursor(), 2);

        buffer.delete_surrounding(usize::MAX, usize::MAX);
        assert_eq!(buffer.text(), "");
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn test_batch_publishes_together() {
        let mut buffer = MemoryBuffer::new("abc");
        let observer = buffer.clone();

        buffer.begin_batch();
        buffer.delete_surrounding(3, 0);
        assert_eq!(buffer.text_before_cursor(10).as_deref(), Some(""));
        assert_eq!(observer.text(), "abc");
        buffer.commit("xyz");
        buffer.end_batch();

        assert_eq!(observer.text(), "xyz");
    }

    #[test]
    fn test_nested_batch() {
        let mut buffer = MemoryBuffer::new("");
        buffer.begin_batch();
        buffer.begin_batch();
        buffer.commit("a");
        buffer.end_batch();
        assert_eq!(buffer.text(), "");
        buffer.end_batch();
        assert_eq!(buffer.text(), "a");
    }

    #[test]
    fn test_secure_field_refuses_reads() {
        let buffer = MemoryBuffer::new("pin");
        buffer.set_secure(true);
        assert_eq!(buffer.text_before_cursor(10), None);
        assert_eq!(buffer.text_after_cursor(10), None);
        assert_eq!(buffer.selected_text(), None);
    }

    #[test]
    fn test_submit_counter() {
        let mut buffer = MemoryBuffer::new("");
        buffer.send_submit();
        assert_eq!(buffer.submit_count(), 1);
    }
}
