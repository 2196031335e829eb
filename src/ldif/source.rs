//! The line source: physical lines with absolute numbering over a chain of
//! byte streams.

use std::io::{BufRead, BufReader, Read};

use super::config::ImportConfig;
use super::error::Result;

/// Yields physical lines (terminators stripped) with 1-based absolute line
/// numbers that keep counting across stream rollover.
///
/// A UTF-8 byte-order mark on the very first line of the very first stream
/// is stripped before the line is returned.
#[derive(Default)]
pub(crate) struct LineSource {
    current: Option<BufReader<Box<dyn Read + Send>>>,
    line_number: u64,
    source_index: usize,
}

impl LineSource {
    pub(crate) fn new() -> Self {
        LineSource::default()
    }

    /// The number of the last line returned (0 before the first line).
    pub(crate) fn line_number(&self) -> u64 {
        self.line_number
    }

    /// The next physical line of the current stream, or `None` when the
    /// current stream is exhausted (or no stream is open). I/O failures are
    /// propagated verbatim.
    pub(crate) fn next_line(&mut self) -> Result<Option<String>> {
        let Some(reader) = self.current.as_mut() else {
            return Ok(None);
        };
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            self.current = None;
            return Ok(None);
        }
        self.line_number += 1;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        if self.source_index == 1 && self.line_number == 1 {
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }
        Ok(Some(line))
    }

    /// Opens the next stream from the import configuration. Returns `false`
    /// when no further stream is available (end of input).
    pub(crate) fn advance(&mut self, config: &mut ImportConfig) -> Result<bool> {
        match config.next_source()? {
            Some(reader) => {
                self.current = Some(BufReader::new(reader));
                self.source_index += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops the current stream, releasing its underlying handle.
    pub(crate) fn release(&mut self) {
        self.current = None;
    }
}
