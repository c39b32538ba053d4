//! Single pass scanner over exposition format payloads.
//!
//! The scanner does not parse samples. It only records where metric lines and comment lines
//! start and end, so later stages can slice the original payload without copying it.

/// The state of the scanner automaton.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanState {
    /// At the beginning of a line, possibly after leading indentation.
    StartOfLine,
    /// Capturing a metric name.
    InName,
    /// The name is closed, the rest of the line belongs to the metric.
    InData,
    /// Inside a `#` line.
    InComment,
    /// The line starts with a byte that can start neither a metric nor a comment.
    Discard,
}

/// Location of a metric line within a payload.
///
/// All offsets are byte offsets into the scanned payload. The name occupies
/// `name_start..name_end`, the full line `name_start..line_end`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Span {
    /// Offset of the first byte of the metric name.
    pub name_start: usize,
    /// Offset one past the last byte of the metric name.
    pub name_end: usize,
    /// Offset of the terminating newline, or the payload length for the last line.
    pub line_end: usize,
}

impl Span {
    /// Returns the metric name of this span.
    pub fn name<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        &payload[self.name_start..self.name_end]
    }

    /// Returns the full line of this span, excluding the newline.
    pub fn line<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        &payload[self.name_start..self.line_end]
    }
}

/// Location of a comment line within a payload, including the leading `#`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommentSpan {
    /// Offset of the `#`.
    pub start: usize,
    /// Offset of the terminating newline, or the payload length for the last line.
    pub end: usize,
}

impl CommentSpan {
    /// Returns the comment line, excluding the newline.
    pub fn line<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        &payload[self.start..self.end]
    }
}

/// The result of scanning a payload.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Scan {
    /// Metric lines in source order.
    pub spans: Vec<Span>,
    /// Comment lines in source order.
    pub comments: Vec<CommentSpan>,
}

impl Scan {
    /// Returns `true` if neither metrics nor comments were found.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty() && self.comments.is_empty()
    }
}

/// Returns `true` for bytes that may open a metric name.
fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// The scanner automaton.
///
/// Feed bytes with [`step`](Self::step) and close the last line with [`finish`](Self::finish).
/// [`scan`] does both for a complete payload.
#[derive(Debug)]
pub struct Scanner {
    state: ScanState,
    depth: usize,
    start: usize,
    name_end: usize,
    scan: Scan,
}

impl Scanner {
    /// Creates a scanner positioned at the start of a line.
    pub fn new() -> Self {
        Self {
            state: ScanState::StartOfLine,
            depth: 0,
            start: 0,
            name_end: 0,
            scan: Scan::default(),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Returns the current curly brace depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Advances the automaton by the byte at `offset`.
    pub fn step(&mut self, offset: usize, byte: u8) {
        use ScanState::*;

        match (self.state, byte) {
            (_, b'\n') => self.end_line(offset),

            (StartOfLine, b' ' | b'\t') => (),
            (StartOfLine, b'#') => {
                self.start = offset;
                self.state = InComment;
            }
            (StartOfLine, b) if is_name_start(b) => {
                self.start = offset;
                self.state = InName;
            }
            (StartOfLine, _) => self.state = Discard,

            (InName, b' ' | b'\t') => {
                self.name_end = offset;
                self.state = InData;
            }
            (InName, b'{') => {
                self.name_end = offset;
                self.depth = 1;
                self.state = InData;
            }
            (InName, _) => (),

            (InData, b'{') => self.depth += 1,
            (InData, b'}') => self.depth = self.depth.saturating_sub(1),
            (InData | InComment | Discard, _) => (),
        }
    }

    /// Closes any open line at `len` and returns the scan result.
    pub fn finish(mut self, len: usize) -> Scan {
        self.end_line(len);
        self.scan
    }

    fn end_line(&mut self, offset: usize) {
        match self.state {
            ScanState::InName => {
                self.name_end = offset;
                self.push_span(offset);
            }
            ScanState::InData => self.push_span(offset),
            ScanState::InComment => self.scan.comments.push(CommentSpan {
                start: self.start,
                end: offset,
            }),
            ScanState::StartOfLine | ScanState::Discard => (),
        }

        self.depth = 0;
        self.state = ScanState::StartOfLine;
    }

    fn push_span(&mut self, line_end: usize) {
        self.scan.spans.push(Span {
            name_start: self.start,
            name_end: self.name_end,
            line_end,
        });
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Scans a payload for metric and comment lines.
///
/// # Example
///
/// ```
/// let payload = b"# TYPE up gauge\nup{job=\"node\"} 1\n";
/// let scan = pusher_metrics::scan(payload);
///
/// assert_eq!(scan.spans[0].name(payload), b"up");
/// assert_eq!(scan.comments[0].line(payload), b"# TYPE up gauge");
/// ```
pub fn scan(payload: &[u8]) -> Scan {
    let mut scanner = Scanner::new();
    for (offset, &byte) in payload.iter().enumerate() {
        scanner.step(offset, byte);
    }
    scanner.finish(payload.len())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn lines<'a>(payload: &'a [u8], scan: &Scan) -> Vec<&'a str> {
        scan.spans
            .iter()
            .map(|span| std::str::from_utf8(span.line(payload)).unwrap())
            .collect()
    }

    fn names<'a>(payload: &'a [u8], scan: &Scan) -> Vec<&'a str> {
        scan.spans
            .iter()
            .map(|span| std::str::from_utf8(span.name(payload)).unwrap())
            .collect()
    }

    fn comments<'a>(payload: &'a [u8], scan: &Scan) -> Vec<&'a str> {
        scan.comments
            .iter()
            .map(|span| std::str::from_utf8(span.line(payload)).unwrap())
            .collect()
    }

    #[test]
    fn test_step_start_of_line() {
        let mut scanner = Scanner::new();
        scanner.step(0, b' ');
        assert_eq!(scanner.state(), ScanState::StartOfLine);
        scanner.step(1, b'\t');
        assert_eq!(scanner.state(), ScanState::StartOfLine);
        scanner.step(2, b'f');
        assert_eq!(scanner.state(), ScanState::InName);
    }

    #[test]
    fn test_step_comment() {
        let mut scanner = Scanner::new();
        scanner.step(0, b'#');
        assert_eq!(scanner.state(), ScanState::InComment);
        scanner.step(1, b'{');
        assert_eq!(scanner.depth(), 0);
        scanner.step(2, b'}');
        assert_eq!(scanner.depth(), 0);
        scanner.step(3, b'\n');
        assert_eq!(scanner.state(), ScanState::StartOfLine);
    }

    #[test]
    fn test_step_braces() {
        let mut scanner = Scanner::new();
        for (offset, byte) in b"up{a".iter().enumerate() {
            scanner.step(offset, *byte);
        }
        assert_eq!(scanner.state(), ScanState::InData);
        assert_eq!(scanner.depth(), 1);

        scanner.step(4, b'}');
        scanner.step(5, b'}');
        assert_eq!(scanner.depth(), 0);

        scanner.step(6, b'{');
        assert_eq!(scanner.depth(), 1);
        scanner.step(7, b'\n');
        assert_eq!(scanner.depth(), 0);
        assert_eq!(scanner.state(), ScanState::StartOfLine);
    }

    #[test]
    fn test_step_discard() {
        let mut scanner = Scanner::new();
        scanner.step(0, b'-');
        assert_eq!(scanner.state(), ScanState::Discard);
        scanner.step(1, b'a');
        assert_eq!(scanner.state(), ScanState::Discard);
        scanner.step(2, b'\n');
        assert_eq!(scanner.state(), ScanState::StartOfLine);
    }

    #[test]
    fn test_scan_lines() {
        let payload = b"# HELP foo_bar A metric.\n\
            # TYPE foo_bar gauge\n\
            foo_bar 20.1\n\
            \n\
            bin_bar{existing=\"E1\"} 20.3\n";

        let result = scan(payload);
        assert_eq!(lines(payload, &result), ["foo_bar 20.1", "bin_bar{existing=\"E1\"} 20.3"]);
        assert_eq!(names(payload, &result), ["foo_bar", "bin_bar"]);
        assert_eq!(
            comments(payload, &result),
            ["# HELP foo_bar A metric.", "# TYPE foo_bar gauge"]
        );
    }

    #[test]
    fn test_scan_without_trailing_newline() {
        let payload = b"first 1\nsecond 2";
        let result = scan(payload);
        assert_eq!(lines(payload, &result), ["first 1", "second 2"]);

        let payload = b"first 1\n# trailing comment";
        let result = scan(payload);
        assert_eq!(comments(payload, &result), ["# trailing comment"]);
    }

    #[test]
    fn test_scan_name_only() {
        let payload = b"lonely\nlast";
        let result = scan(payload);
        assert_eq!(names(payload, &result), ["lonely", "last"]);
        assert_eq!(lines(payload, &result), ["lonely", "last"]);
    }

    #[test]
    fn test_scan_indented() {
        let payload = b"  \tindented 1\n";
        let result = scan(payload);
        assert_eq!(names(payload, &result), ["indented"]);
        assert_eq!(lines(payload, &result), ["indented 1"]);
    }

    #[test]
    fn test_scan_discards_invalid_lines() {
        let payload = b"{orphan=\"1\"} 2\n-1 2\nvalid 3\n";
        let result = scan(payload);
        assert_eq!(lines(payload, &result), ["valid 3"]);
    }

    #[test]
    fn test_scan_spaces_in_labels() {
        let payload = b"http_requests{path=\"/a b\", code=\"200\"} 3 1600000000000\n";
        let result = scan(payload);
        assert_eq!(names(payload, &result), ["http_requests"]);
        assert_eq!(
            lines(payload, &result),
            ["http_requests{path=\"/a b\", code=\"200\"} 3 1600000000000"]
        );
    }

    #[test]
    fn test_scan_unbalanced_braces_reset() {
        let payload = b"broken{a=\"1\" 2\nnext 3\n";
        let result = scan(payload);
        assert_eq!(names(payload, &result), ["broken", "next"]);
    }

    #[test]
    fn test_scan_empty() {
        assert!(scan(b"").is_empty());
        assert!(scan(b"\n\n  \n").is_empty());
    }

    #[test]
    fn test_scan_fixture() {
        let payload = include_bytes!("../tests/fixtures/node_exporter.prom");
        let result = scan(payload);

        let data_lines = payload
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty() && !line.starts_with(b"#"))
            .count();
        assert_eq!(result.spans.len(), data_lines);

        for span in &result.spans {
            assert!(span.name_start < span.name_end);
            assert!(span.name_end <= span.line_end);
        }

        // Spans are ordered and never overlap.
        for pair in result.spans.windows(2) {
            assert!(pair[0].line_end < pair[1].name_start);
        }
    }

    #[test]
    fn test_scan_is_repeatable() {
        let payload = include_bytes!("../tests/fixtures/node_exporter.prom");
        assert_eq!(scan(payload), scan(payload));
    }
}
