//! Text codecs for the serial byte streams
//!
//! The inbound side turns raw bytes into UTF-8 text and then into lines; the
//! outbound side turns text into UTF-8 bytes. Both plug into
//! `tokio_util::codec::{FramedRead, FramedWrite}`.

use bytes::{BufMut, BytesMut};
use std::collections::VecDeque;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::splitter::LineSplitter;

const REPLACEMENT: char = '\u{FFFD}';
const BOM: char = '\u{FEFF}';

/// Incremental UTF-8 decoder.
///
/// Multi-byte sequences split across reads are held back until complete.
/// Invalid sequences decode to U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct TextDecoder {
    pending: Vec<u8>,
    started: bool,
}

impl TextDecoder {
    /// Create a decoder at the start of a stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, appending the text to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        let start = out.len();
        self.pending.extend_from_slice(bytes);

        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    // from_utf8 already validated this prefix
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            input = &rest[len..];
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
        self.strip_bom(out, start);
    }

    /// Finish the stream: a dangling partial sequence becomes one U+FFFD.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            let start = out.len();
            out.push(REPLACEMENT);
            self.strip_bom(out, start);
        }
    }

    fn strip_bom(&mut self, out: &mut String, start: usize) {
        if self.started || out.len() == start {
            return;
        }
        self.started = true;
        if out[start..].starts_with(BOM) {
            out.replace_range(start..start + BOM.len_utf8(), "");
        }
    }
}

/// Decodes a byte stream into delimiter-separated text lines.
///
/// Every line the splitter completes is queued and handed out one per
/// `decode` call. At end of stream the buffered remainder is flushed once as
/// a final line.
#[derive(Debug)]
pub struct LineCodec {
    text: TextDecoder,
    splitter: LineSplitter,
    lines: VecDeque<String>,
    scratch: String,
    flushed: bool,
}

impl LineCodec {
    /// Create a codec splitting on `delimiter`
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            text: TextDecoder::new(),
            splitter: LineSplitter::new(delimiter),
            lines: VecDeque::new(),
            scratch: String::new(),
            flushed: false,
        }
    }

    /// Delimiter lines are split on
    pub fn delimiter(&self) -> &str {
        self.splitter.delimiter()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if !src.is_empty() {
            let bytes = src.split();
            self.scratch.clear();
            self.text.decode(&bytes, &mut self.scratch);
            self.splitter.transform(&self.scratch, &mut self.lines);
        }
        Ok(self.lines.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !self.flushed {
            self.flushed = true;
            self.scratch.clear();
            self.text.finish(&mut self.scratch);
            self.splitter.transform(&self.scratch, &mut self.lines);
            self.splitter.flush(&mut self.lines);
        }
        Ok(self.lines.pop_front())
    }
}

/// Encodes outbound text as UTF-8 bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextEncoder;

impl Encoder<String> for TextEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(item.len());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}
