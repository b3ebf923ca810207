//! Line splitting
//!
//! Turns an arbitrarily chunked text stream into complete lines.

/// Buffers incoming text and emits a line for every delimiter occurrence.
///
/// Lines are emitted exactly as received between delimiters: nothing is
/// trimmed and empty lines are kept. The text after the last delimiter stays
/// buffered until more input arrives or [`LineSplitter::flush`] is called.
#[derive(Debug, Clone)]
pub struct LineSplitter {
    buffer: String,
    delimiter: String,
}

impl LineSplitter {
    /// Create a splitter for the given delimiter.
    ///
    /// The delimiter must not be empty; [`crate::SessionConfig::validate`]
    /// rejects an empty one before a session ever builds a splitter.
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            delimiter: delimiter.into(),
        }
    }

    /// Delimiter this splitter breaks lines on
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Text received since the last delimiter
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Append `chunk` and push every completed line into `sink`.
    ///
    /// A chunk that completes N delimiters pushes N lines. Delimiters split
    /// across chunk boundaries are found because the search runs over the
    /// accumulated buffer.
    pub fn transform<E: Extend<String>>(&mut self, chunk: &str, sink: &mut E) {
        self.buffer.push_str(chunk);
        if self.delimiter.is_empty() || !self.buffer.contains(self.delimiter.as_str()) {
            return;
        }

        let mut pieces: Vec<&str> = self.buffer.split(self.delimiter.as_str()).collect();
        let rest = pieces.pop().unwrap_or_default().to_string();
        sink.extend(pieces.into_iter().map(str::to_string));
        self.buffer = rest;
    }

    /// Push whatever is buffered as one final line, even if it is empty.
    ///
    /// The buffer is left as is, so flushing twice pushes the remainder twice.
    pub fn flush<E: Extend<String>>(&mut self, sink: &mut E) {
        sink.extend(std::iter::once(self.buffer.clone()));
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DELIMITER)
    }
}
