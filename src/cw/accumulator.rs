use log::debug;

use super::table;
use super::timing::Symbol;
use crate::sink::{SinkRequest, TextRange};

/// Result of converting the pending codeword at a character boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationOutcome {
    Success(char),
    /// The codeword had no mapping; its provisional symbols were removed
    Failure,
}

/// Pending codeword plus the span of raw symbols already shown in the sink.
///
/// The range exists exactly when the codeword is non-empty, and its length
/// always equals the number of symbols keyed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolAccumulator {
    code: String,
    range: Option<TextRange>,
}

impl SymbolAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol that is about to be inserted at `caret`.
    ///
    /// Returns the request that shows the raw symbol in the sink.
    pub fn append(&mut self, symbol: Symbol, caret: usize) -> SinkRequest {
        self.code.push(symbol.as_char());
        match self.range.as_mut() {
            Some(range) => range.length += 1,
            // Once inserted the caret sits just past the symbol, so the range
            // opens one character before it: at the old caret.
            None => self.range = Some(TextRange::new(caret, 1)),
        }
        debug!("pending codeword {:?}", self.code);
        SinkRequest::insert(symbol.as_char().to_string())
    }

    /// Convert the codeword and clear it. The sink request either replaces
    /// the provisional symbols with the character or removes them.
    pub fn translate_and_clear(&mut self) -> (TranslationOutcome, Option<SinkRequest>) {
        let code = std::mem::take(&mut self.code);
        let Some(range) = self.range.take() else {
            return (TranslationOutcome::Failure, None);
        };

        match table::translate(&code) {
            Some(ch) => {
                debug!("translated {:?} -> {:?}", code, ch);
                (
                    TranslationOutcome::Success(ch),
                    Some(SinkRequest::replace(range, ch.to_string())),
                )
            }
            None => {
                debug!("no character for {:?}, discarding", code);
                (TranslationOutcome::Failure, Some(SinkRequest::delete(range)))
            }
        }
    }

    /// Drop the pending codeword. `None` means there was nothing to cancel.
    pub fn cancel(&mut self) -> Option<SinkRequest> {
        let range = self.range.take()?;
        debug!("cancelled codeword {:?}", self.code);
        self.code.clear();
        Some(SinkRequest::delete(range))
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn range(&self) -> Option<TextRange> {
        self.range
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(symbols: &str, caret: usize) -> SymbolAccumulator {
        let mut acc = SymbolAccumulator::new();
        for (i, c) in symbols.chars().enumerate() {
            let symbol = Symbol::from_char(c).unwrap();
            acc.append(symbol, caret + i);
        }
        acc
    }

    #[test]
    fn test_range_tracks_codeword_length() {
        let mut acc = SymbolAccumulator::new();
        assert_eq!(acc.range(), None);

        let request = acc.append(Symbol::Dash, 7);
        assert_eq!(request, SinkRequest::insert("-"));
        assert_eq!(acc.range(), Some(TextRange::new(7, 1)));

        acc.append(Symbol::Dot, 8);
        assert_eq!(acc.code(), "-.");
        assert_eq!(acc.range(), Some(TextRange::new(7, 2)));
    }

    #[test]
    fn test_translate_hit_replaces_range() {
        let mut acc = keyed(".-", 3);
        let (outcome, request) = acc.translate_and_clear();
        assert_eq!(outcome, TranslationOutcome::Success('A'));
        assert_eq!(request, Some(SinkRequest::replace(TextRange::new(3, 2), "A")));
        assert!(acc.is_empty());
        assert_eq!(acc.range(), None);
    }

    #[test]
    fn test_translate_miss_removes_symbols() {
        let mut acc = keyed("......", 0);
        let (outcome, request) = acc.translate_and_clear();
        assert_eq!(outcome, TranslationOutcome::Failure);
        assert_eq!(request, Some(SinkRequest::delete(TextRange::new(0, 6))));
        assert!(acc.is_empty());
        assert_eq!(acc.range(), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut acc = keyed("-.-.", 2);
        assert_eq!(acc.cancel(), Some(SinkRequest::delete(TextRange::new(2, 4))));
        assert_eq!(acc.cancel(), None);
        assert!(acc.is_empty());
    }
}
