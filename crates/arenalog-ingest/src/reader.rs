//! Offset-tracked line reader over the client log.
//!
//! The client only appends or rotates; bytes below the committed offset
//! are assumed stable. A saved offset past EOF means the file rotated or
//! was truncated, and the reader restarts from the top.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Structured envelopes routinely exceed a megabyte on one line.
const BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// One complete line, with the coordinates needed to resume after it.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub line_no: i64,
    /// Byte offset of the line's first byte.
    pub start_offset: i64,
    /// Bytes consumed including the terminator.
    pub byte_len: i64,
    /// Line content without the trailing `\r\n` / `\n`.
    pub text: String,
}

pub struct LogReader {
    reader: BufReader<File>,
    line_no: i64,
    offset: i64,
    buf: Vec<u8>,
}

impl LogReader {
    /// Open `path` positioned at the saved boundary.
    ///
    /// Returns the reader plus `true` when rotation/truncation was
    /// detected (saved offset beyond the current file size), in which
    /// case the reader starts over from offset 0, line 0 and the caller
    /// must discard its in-memory correlation state.
    pub fn open(path: &Path, offset: i64, line_no: i64) -> std::io::Result<(Self, bool)> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len() as i64;

        let rotated = offset > size;
        let (offset, line_no) = if rotated { (0, 0) } else { (offset, line_no) };

        if offset > 0 {
            file.seek(SeekFrom::Start(offset as u64))?;
        }

        Ok((
            Self {
                reader: BufReader::with_capacity(BUFFER_SIZE, file),
                line_no,
                offset,
                buf: Vec::new(),
            },
            rotated,
        ))
    }

    /// Next complete newline-terminated line, or `None` at EOF.
    ///
    /// A trailing fragment without a newline is withheld: its bytes stay
    /// unconsumed as far as the committed offset is concerned, so a later
    /// pass reads them together with the rest of the line.
    pub fn next_line(&mut self) -> std::io::Result<Option<LogLine>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 || self.buf.last() != Some(&b'\n') {
            return Ok(None);
        }

        self.line_no += 1;
        let start_offset = self.offset;
        self.offset += n as i64;

        let mut end = self.buf.len() - 1;
        if end > 0 && self.buf[end - 1] == b'\r' {
            end -= 1;
        }
        let text = String::from_utf8_lossy(&self.buf[..end]).into_owned();

        Ok(Some(LogLine {
            line_no: self.line_no,
            start_offset,
            byte_len: n as i64,
            text,
        }))
    }

    /// Offset of the first unconsumed byte.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn line_no(&self) -> i64 {
        self.line_no
    }
}
