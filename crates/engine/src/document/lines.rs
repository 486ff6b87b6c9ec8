use fixup_common::protocol::{Position, Range};

use super::Span;

/// Maps between protocol line/character positions and UTF-8 byte offsets.
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, starts }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Content of `line` without its terminator.
    pub fn line_text(&self, line: usize) -> Option<&'a str> {
        let start = *self.starts.get(line)?;
        let end = self.starts.get(line + 1).map(|next| next - 1).unwrap_or(self.text.len());
        let raw = &self.text[start..end];
        Some(raw.strip_suffix('\r').unwrap_or(raw))
    }

    /// Last line, last column.
    pub fn end_position(&self) -> Position {
        let last = self.line_count() - 1;
        let chars = self.line_text(last).map(|l| l.chars().count()).unwrap_or(0);
        Position::new(last as i64, chars as i64)
    }

    /// Byte offset of `position`. Characters past the end of the line clamp to
    /// the line end; lines outside the document have no offset.
    pub fn offset(&self, position: Position) -> Option<u32> {
        let line = usize::try_from(position.line).ok()?;
        let line_text = self.line_text(line)?;
        let wanted = usize::try_from(position.character.max(0)).unwrap_or(0);
        let within = line_text
            .char_indices()
            .nth(wanted)
            .map(|(i, _)| i)
            .unwrap_or(line_text.len());
        u32::try_from(self.starts[line] + within).ok()
    }

    /// Protocol position of a byte offset. Offsets inside a multi-byte
    /// character snap back to its start.
    pub fn position(&self, offset: u32) -> Position {
        let offset = (offset as usize).min(self.text.len());
        let line = self.starts.partition_point(|&start| start <= offset) - 1;
        let prefix = &self.text[self.starts[line]..];
        let character = prefix.char_indices().take_while(|(i, _)| *i < offset - self.starts[line]).count();
        Position::new(line as i64, character as i64)
    }

    /// Orders the range and replaces `-1` sentinels: a sentinel start becomes
    /// line 0, a sentinel end becomes the end of the document.
    pub fn normalize_range(&self, range: Range) -> Range {
        let range = range.ordered();
        let start = if range.start.is_sentinel() {
            Position::new(0, range.start.character.max(0))
        } else {
            range.start
        };
        let end = if range.end.is_sentinel() { self.end_position() } else { range.end };
        Range::new(start, end).ordered()
    }

    /// A standalone insert position with a sentinel line means end of document.
    pub fn normalize_position(&self, position: Position) -> Position {
        if position.is_sentinel() {
            self.end_position()
        } else {
            position
        }
    }

    pub fn span(&self, range: Range) -> Option<Span> {
        let range = self.normalize_range(range);
        let start = self.offset(range.start)?;
        let end = self.offset(range.end)?;
        Some(Span::new(start.min(end), start.max(end)))
    }

    pub fn range(&self, span: Span) -> Range {
        Range::new(self.position(span.start), self.position(span.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "fn main() {\n    println!(\"hé\");\n}\n";

    #[test]
    fn counts_trailing_empty_line() {
        let index = LineIndex::new(TEXT);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_text(3), Some(""));
        assert_eq!(index.end_position(), Position::new(3, 0));
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let index = LineIndex::new(TEXT);
        // `é` is two bytes; the closing quote is the 16th character of line 1.
        let quote = index.offset(Position::new(1, 16)).expect("position should map");
        assert_eq!(&TEXT[quote as usize..quote as usize + 1], "\"");
        assert_eq!(index.position(quote), Position::new(1, 16));
    }

    #[test]
    fn character_past_line_end_clamps() {
        let index = LineIndex::new(TEXT);
        assert_eq!(index.offset(Position::new(0, 99)), Some(11));
    }

    #[test]
    fn lines_outside_document_have_no_offset() {
        let index = LineIndex::new(TEXT);
        assert_eq!(index.offset(Position::new(9, 0)), None);
        assert_eq!(index.offset(Position::new(-2, 0)), None);
    }

    #[test]
    fn sentinel_start_normalizes_to_line_zero() {
        let index = LineIndex::new(TEXT);
        let range = index.normalize_range(Range::lines(-1, 0, 1, 4));
        assert_eq!(range, Range::lines(0, 0, 1, 4));
    }

    #[test]
    fn sentinel_end_normalizes_to_document_end() {
        let index = LineIndex::new("one\ntwo");
        let range = index.normalize_range(Range::lines(0, 1, -1, -1));
        assert_eq!(range, Range::lines(0, 1, 1, 3));
        assert_eq!(index.span(range), Some(Span::new(1, 7)));
    }

    #[test]
    fn swapped_range_is_ordered_before_mapping() {
        let index = LineIndex::new("alpha\nbeta\n");
        assert_eq!(index.span(Range::lines(1, 2, 0, 1)), index.span(Range::lines(0, 1, 1, 2)));
    }

    #[test]
    fn crlf_terminators_are_not_characters() {
        let index = LineIndex::new("ab\r\ncd");
        assert_eq!(index.line_text(0), Some("ab"));
        assert_eq!(index.offset(Position::new(0, 5)), Some(2));
        assert_eq!(index.offset(Position::new(1, 1)), Some(5));
    }
}
