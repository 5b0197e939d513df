//! The text sink: where decoded text ends up.
//!
//! The decoder only ever talks to a [`TextSink`]. Hosts plug in their own
//! document API; [`TextBuffer`] is the in-memory document used by the CLI
//! and the tests.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

pub use crate::error::SinkError;

/// A span of characters in the sink's document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub location: usize,
    pub length: usize,
}

impl TextRange {
    pub fn new(location: usize, length: usize) -> Self {
        Self { location, length }
    }

    pub fn end(&self) -> usize {
        self.location + self.length
    }
}

/// A side effect the decoder asks the sink to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkRequest {
    /// Insert at the caret, or over `replacing` when given
    InsertText {
        text: String,
        replacing: Option<TextRange>,
    },
    /// Stage `text` over `range`. An empty string deletes the range.
    SetMarkedText { text: String, range: TextRange },
}

impl SinkRequest {
    pub fn insert(text: impl Into<String>) -> Self {
        SinkRequest::InsertText {
            text: text.into(),
            replacing: None,
        }
    }

    pub fn replace(range: TextRange, text: impl Into<String>) -> Self {
        SinkRequest::InsertText {
            text: text.into(),
            replacing: Some(range),
        }
    }

    pub fn delete(range: TextRange) -> Self {
        SinkRequest::SetMarkedText {
            text: String::new(),
            range,
        }
    }
}

/// Document capability consumed by the decoder. Calls are synchronous and
/// must be reflected before the next call returns.
pub trait TextSink {
    fn insert_text(&mut self, text: &str, replacing: Option<TextRange>) -> Result<(), SinkError>;

    fn set_marked_text(&mut self, text: &str, range: TextRange) -> Result<(), SinkError>;

    /// Caret position, in characters from the start of the document
    fn selection_position(&self) -> Result<usize, SinkError>;

    fn apply(&mut self, request: &SinkRequest) -> Result<(), SinkError> {
        match request {
            SinkRequest::InsertText { text, replacing } => self.insert_text(text, *replacing),
            SinkRequest::SetMarkedText { text, range } => self.set_marked_text(text, *range),
        }
    }
}

impl<S: TextSink + ?Sized> TextSink for Box<S> {
    fn insert_text(&mut self, text: &str, replacing: Option<TextRange>) -> Result<(), SinkError> {
        (**self).insert_text(text, replacing)
    }

    fn set_marked_text(&mut self, text: &str, range: TextRange) -> Result<(), SinkError> {
        (**self).set_marked_text(text, range)
    }

    fn selection_position(&self) -> Result<usize, SinkError> {
        (**self).selection_position()
    }
}

/// In-memory document with a caret and an optional marked span
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    chars: Vec<char>,
    caret: usize,
    marked: Option<TextRange>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer holding `text` with the caret at its end
    pub fn with_text(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let caret = chars.len();
        Self {
            chars,
            caret,
            marked: None,
        }
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn marked(&self) -> Option<TextRange> {
        self.marked
    }

    fn check(&self, range: TextRange) -> Result<(), SinkError> {
        if range.end() > self.chars.len() {
            return Err(SinkError::RangeOutOfBounds {
                start: range.location,
                end: range.end(),
                len: self.chars.len(),
            });
        }
        Ok(())
    }

    fn splice(&mut self, range: TextRange, text: &str) -> usize {
        let inserted: Vec<char> = text.chars().collect();
        let count = inserted.len();
        self.chars.splice(range.location..range.end(), inserted);
        self.caret = range.location + count;
        count
    }
}

impl TextSink for TextBuffer {
    fn insert_text(&mut self, text: &str, replacing: Option<TextRange>) -> Result<(), SinkError> {
        let range = match replacing {
            Some(range) => {
                self.check(range)?;
                range
            }
            None => TextRange::new(self.caret, 0),
        };
        self.splice(range, text);
        self.marked = None;
        Ok(())
    }

    fn set_marked_text(&mut self, text: &str, range: TextRange) -> Result<(), SinkError> {
        self.check(range)?;
        let count = self.splice(range, text);
        self.marked = (count > 0).then(|| TextRange::new(range.location, count));
        Ok(())
    }

    fn selection_position(&self) -> Result<usize, SinkError> {
        Ok(self.caret)
    }
}

/// A `TextBuffer` that can be inspected while a runtime owns the sink
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<TextBuffer>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.0.lock().text()
    }
}

impl TextSink for SharedBuffer {
    fn insert_text(&mut self, text: &str, replacing: Option<TextRange>) -> Result<(), SinkError> {
        self.0.lock().insert_text(text, replacing)
    }

    fn set_marked_text(&mut self, text: &str, range: TextRange) -> Result<(), SinkError> {
        self.0.lock().set_marked_text(text, range)
    }

    fn selection_position(&self) -> Result<usize, SinkError> {
        self.0.lock().selection_position()
    }
}

/// Renders the document as a single redrawn terminal line
pub struct TerminalSink<W: Write> {
    buffer: TextBuffer,
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            buffer: TextBuffer::new(),
            out,
        }
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    /// Apply an edit to a copy, draw it, and keep it only if drawing worked
    fn commit(&mut self, edit: impl FnOnce(&mut TextBuffer) -> Result<(), SinkError>) -> Result<(), SinkError> {
        let mut next = self.buffer.clone();
        edit(&mut next)?;
        write!(self.out, "\r\x1b[2K{}", next.text())
            .and_then(|_| self.out.flush())
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        self.buffer = next;
        Ok(())
    }
}

impl<W: Write> TextSink for TerminalSink<W> {
    fn insert_text(&mut self, text: &str, replacing: Option<TextRange>) -> Result<(), SinkError> {
        self.commit(|buffer| buffer.insert_text(text, replacing))
    }

    fn set_marked_text(&mut self, text: &str, range: TextRange) -> Result<(), SinkError> {
        self.commit(|buffer| buffer.set_marked_text(text, range))
    }

    fn selection_position(&self) -> Result<usize, SinkError> {
        self.buffer.selection_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_at_caret_and_replace() {
        let mut buffer = TextBuffer::with_text("ab");
        buffer.insert_text(".", None).unwrap();
        buffer.insert_text("-", None).unwrap();
        assert_eq!(buffer.text(), "ab.-");
        assert_eq!(buffer.caret(), 4);

        buffer.insert_text("A", Some(TextRange::new(2, 2))).unwrap();
        assert_eq!(buffer.text(), "abA");
        assert_eq!(buffer.caret(), 3);
    }

    #[test]
    fn test_empty_marked_text_deletes_range() {
        let mut buffer = TextBuffer::with_text("x-.-.");
        buffer.set_marked_text("", TextRange::new(1, 4)).unwrap();
        assert_eq!(buffer.text(), "x");
        assert_eq!(buffer.caret(), 1);
        assert_eq!(buffer.marked(), None);
    }

    #[test]
    fn test_marked_text_is_tracked() {
        let mut buffer = TextBuffer::with_text("hi ");
        buffer.set_marked_text("..", TextRange::new(3, 0)).unwrap();
        assert_eq!(buffer.marked(), Some(TextRange::new(3, 2)));
        buffer.insert_text("I", Some(TextRange::new(3, 2))).unwrap();
        assert_eq!(buffer.text(), "hi I");
        assert_eq!(buffer.marked(), None);
    }

    #[test]
    fn test_out_of_bounds_range_is_rejected() {
        let mut buffer = TextBuffer::with_text("abc");
        let err = buffer.insert_text("z", Some(TextRange::new(2, 5))).unwrap_err();
        assert_eq!(err, SinkError::RangeOutOfBounds { start: 2, end: 7, len: 3 });
        assert_eq!(buffer.text(), "abc");
    }

    #[test]
    fn test_terminal_sink_redraws_line() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.insert_text(".", None).unwrap();
        sink.insert_text("E", Some(TextRange::new(0, 1))).unwrap();
        assert_eq!(sink.buffer().text(), "E");
        let drawn = String::from_utf8(sink.out.clone()).unwrap();
        assert!(drawn.ends_with("\r\x1b[2KE"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_terminal_sink_keeps_document_when_drawing_fails() {
        let mut sink = TerminalSink::new(BrokenPipe);
        assert!(matches!(sink.insert_text(".", None), Err(SinkError::Unavailable(_))));
        assert!(sink.buffer().is_empty());
    }
}
