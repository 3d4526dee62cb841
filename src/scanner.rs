use async_std::io::{prelude::*, Read};
use log::trace;

use crate::{
    encoding::{Decoded, Encoding, Terminator},
    error::Error,
    index::LineRecord,
    Result,
};

/// Max amount of bytes read from the underlying reader at once
const CHUNK_SIZE: usize = 8 * 1024;

/// Decodes characters from a reader while keeping track of the byte position of the next
/// character. Bytes are read ahead in chunks, so dropping the decoder discards everything it
/// buffered but didn't return yet.
#[derive(Debug)]
pub(crate) struct Decoder<R> {
    reader: R,
    encoding: Encoding,
    buf: Vec<u8>,
    /// Position of the next character within `buf`
    pos: usize,
    /// Byte offset of the next character within the underlying stream
    offset: u64,
    chunk_size: usize,
    eof: bool,
}

impl<R: Read + Unpin> Decoder<R> {
    /// Creates a new decoder. `offset` has to be the current position of `reader`.
    #[inline]
    pub(crate) fn new(reader: R, encoding: Encoding, offset: u64) -> Self {
        Self::with_chunk_size(reader, encoding, offset, CHUNK_SIZE)
    }

    /// Creates a new decoder reading at most `chunk_size` bytes at once. Useful to not read
    /// way too much data if only a few characters are required.
    pub(crate) fn with_chunk_size(
        reader: R,
        encoding: Encoding,
        offset: u64,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader,
            encoding,
            buf: Vec::new(),
            pos: 0,
            offset,
            chunk_size: chunk_size.max(4).min(CHUNK_SIZE),
            eof: false,
        }
    }

    /// Byte offset of the next character
    #[inline]
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads more data into the buffer. Returns `false` if the reader is exhausted
    async fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }

        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let len = self.buf.len();
        self.buf.resize(len + self.chunk_size, 0);
        let n = self.reader.read(&mut self.buf[len..]).await?;
        self.buf.truncate(len + n);

        if n == 0 {
            self.eof = true;
        }

        Ok(n > 0)
    }

    /// Returns the next character and its width in bytes without consuming it
    pub(crate) async fn peek_char(&mut self) -> Result<Option<(char, usize)>> {
        loop {
            match self.encoding.decode_char(&self.buf[self.pos..]) {
                Decoded::Char(c, width) => return Ok(Some((c, width))),
                Decoded::Invalid => return Err(self.decode_error()),
                Decoded::Incomplete => {
                    if !self.fill().await? {
                        if self.pos == self.buf.len() {
                            return Ok(None);
                        }

                        // Stream ends within a character
                        return Err(self.decode_error());
                    }
                }
            }
        }
    }

    pub(crate) async fn next_char(&mut self) -> Result<Option<char>> {
        let next = self.peek_char().await?;

        Ok(next.map(|(c, width)| {
            self.consume(width);
            c
        }))
    }

    /// Skips the byte order mark of the decoders encoding if the remaining data starts with it.
    /// Returns `true` if a BOM was skipped.
    pub(crate) async fn skip_bom(&mut self) -> Result<bool> {
        let bom = self.encoding.bom();

        while self.buf.len() - self.pos < bom.len() {
            if !self.fill().await? {
                break;
            }
        }

        if self.buf[self.pos..].starts_with(bom) {
            self.consume(bom.len());
            return Ok(true);
        }

        Ok(false)
    }

    #[inline]
    fn consume(&mut self, n: usize) {
        self.pos += n;
        self.offset += n as u64;
    }

    #[inline]
    fn decode_error(&self) -> Error {
        Error::Decode {
            encoding: self.encoding,
            offset: self.offset,
        }
    }
}

/// A single line produced by `LineScanner`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    /// Content of the line without terminator
    pub text: String,
    /// Byte offset where the lines content starts
    pub offset: u64,
    /// Amount of characters in `text`
    pub char_len: usize,
    /// Amount of bytes `text` occupies in the stream
    pub byte_len: u64,
    /// Amount of bytes of the terminator following the line. Zero for a last line without
    /// terminator
    pub terminator_len: u64,
    /// The terminator ending the line, `None` for a last line without terminator
    pub terminator: Option<Terminator>,
}

impl ScannedLine {
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminator_len > 0
    }

    /// Returns the byte offset of the line following this one
    #[inline]
    pub fn next_offset(&self) -> u64 {
        self.offset + self.byte_len + self.terminator_len
    }

    /// Returns the index record pointing to this line
    #[inline]
    pub fn record(&self) -> LineRecord {
        LineRecord::new(self.offset, self.char_len)
    }
}

/// Lazily splits a stream into lines, keeping track of the byte offset each line starts at.
///
/// `\n`, `\r\n` and a single `\r` are all treated as line terminators. Reading lines advances
/// the underlying reader further than the returned lines, so it must not be used for anything
/// else while scanning.
#[derive(Debug)]
pub struct LineScanner<R> {
    decoder: Decoder<R>,
    encoding: Encoding,
    /// Offset of the next line
    offset: u64,
    started: bool,
    done: bool,
}

impl<R: Read + Unpin> LineScanner<R> {
    /// Create a new `LineScanner` reading from `reader`. `offset` has to be the current
    /// position of the reader. If it is 0, a leading byte order mark gets skipped.
    pub fn new(reader: R, encoding: Encoding, offset: u64) -> Self {
        Self {
            decoder: Decoder::new(reader, encoding, offset),
            encoding,
            offset,
            started: false,
            done: false,
        }
    }

    /// Returns the next line or `None` if the end of the stream was reached.
    pub async fn next_line(&mut self) -> Result<Option<ScannedLine>> {
        if self.done {
            return Ok(None);
        }

        if !self.started {
            self.started = true;
            if self.offset == 0 && self.decoder.skip_bom().await? {
                self.offset = self.decoder.offset();
            }
        }

        let mut text = String::new();
        let mut char_len = 0;

        let (terminator, terminator_len) = loop {
            match self.decoder.next_char().await? {
                Some('\n') => break (Some(Terminator::Lf), self.encoding.char_width('\n')),
                Some('\r') => {
                    let len = self.encoding.char_width('\r');

                    if let Some(('\n', width)) = self.decoder.peek_char().await? {
                        self.decoder.consume(width);
                        break (Some(Terminator::CrLf), len + width);
                    }

                    break (Some(Terminator::Cr), len);
                }
                Some(c) => {
                    text.push(c);
                    char_len += 1;
                }
                None => {
                    self.done = true;
                    if char_len == 0 {
                        return Ok(None);
                    }
                    break (None, 0);
                }
            }
        };

        let line = ScannedLine {
            byte_len: self.encoding.byte_len(&text),
            offset: self.offset,
            text,
            char_len,
            terminator_len: terminator_len as u64,
            terminator,
        };

        self.offset = line.next_offset();
        debug_assert_eq!(self.offset, self.decoder.offset(), "offset doesn't match");
        trace!("scanned line at {}: {:?}", line.offset, line.text);

        Ok(Some(line))
    }
}
