//! Incremental extraction of frames from a stream of text.

use super::{sanitize, Frame, ESCAPE, OBJECT_END, OBJECT_START, QUOTE};
use crate::error::{BufferOverflowError, FrameError, MalformedFrameError};

/// The default maximum length of the receive buffer, in characters.
pub const DEFAULT_MAX_BUFFER_LEN: usize = 4096;

/// Accumulates received text and extracts complete frames from it.
///
/// Bytes are appended with [`push_bytes`](FrameExtractor::push_bytes) and
/// frames are removed, one per call, with [`extract`](FrameExtractor::extract)
/// (or all at once with [`frames`](FrameExtractor::frames)). Anything preceding
/// a frame is treated as noise and discarded. Text following the frame stays
/// in the buffer for the next call.
///
/// Once all available frames have been extracted the buffer holds at most
/// [`max_len`](FrameExtractor::max_len) characters. Content beyond that is
/// discarded, oldest first.
#[derive(Debug)]
pub struct FrameExtractor {
    /// The decoded text that has not been consumed yet.
    buffer: String,
    /// The bytes of an incomplete UTF-8 sequence at the end of the last push.
    pending: Vec<u8>,
    /// The maximum length of `buffer`, in characters.
    max_len: usize,
}

impl FrameExtractor {
    /// Create an extractor with the default maximum buffer length.
    pub fn new() -> Self {
        FrameExtractor::with_max_len(DEFAULT_MAX_BUFFER_LEN)
    }

    /// Create an extractor whose buffer holds at most `max_len` characters.
    pub fn with_max_len(max_len: usize) -> Self {
        FrameExtractor {
            buffer: String::new(),
            pending: Vec::new(),
            max_len,
        }
    }

    /// The maximum length of the buffer, in characters.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// The text that has been received but not yet consumed.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Discard all buffered content.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending.clear();
    }

    /// Append raw bytes received from a device.
    ///
    /// Invalid UTF-8 sequences are dropped. An incomplete sequence at the end
    /// of `bytes` is held back until the rest of it is pushed, so splitting
    /// the stream at arbitrary points does not change the decoded text.
    ///
    /// Returns the number of bytes that were dropped.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let joined;
        let mut input = if self.pending.is_empty() {
            bytes
        } else {
            let mut data = std::mem::take(&mut self.pending);
            data.extend_from_slice(bytes);
            joined = data;
            joined.as_slice()
        };

        let mut dropped = 0;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    if let Some(len) = e.error_len() {
                        dropped += len;
                        input = &rest[len..];
                    } else {
                        self.pending.extend_from_slice(rest);
                        break;
                    }
                }
            }
        }
        dropped
    }

    /// Append already decoded text.
    pub fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Extract the first complete frame from the buffer.
    ///
    /// * `Ok(Some(frame))`: a frame was removed from the buffer.
    /// * `Ok(None)`: there is no complete frame yet. Push more data first.
    /// * `Err(_)`: a malformed frame was dropped or the buffer overflowed and
    ///   was truncated. The buffer has been adjusted so that calling `extract`
    ///   again makes progress.
    pub fn extract(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(start) = self.buffer.find(char::from(OBJECT_START)) else {
            let len = self.buffer.chars().count();
            if len > self.max_len {
                self.buffer.clear();
                return Err(FrameError::from(BufferOverflowError::new(len, false)));
            }
            return Ok(None);
        };
        // Everything before the frame start is noise.
        self.buffer.drain(..start);

        let Some(end) = find_object_end(self.buffer.as_bytes()) else {
            let len = self.buffer.chars().count();
            if len > self.max_len {
                let excess = len - self.max_len;
                let cut = self
                    .buffer
                    .char_indices()
                    .nth(excess)
                    .map_or(self.buffer.len(), |(index, _)| index);
                self.buffer.drain(..cut);
                return Err(FrameError::from(BufferOverflowError::new(excess, true)));
            }
            return Ok(None);
        };

        let parsed = {
            let candidate = sanitize(&self.buffer[..=end]);
            Frame::parse(&candidate).map_err(|e| MalformedFrameError::new(&candidate, &e))
        };
        match parsed {
            Ok(frame) => {
                self.buffer.drain(..=end);
                Ok(Some(frame))
            }
            Err(err) => {
                // Only drop the opening brace so a frame nested within the
                // rejected candidate can still be found.
                self.buffer.drain(..1);
                Err(err.into())
            }
        }
    }

    /// An iterator extracting frames until no complete frame remains.
    ///
    /// Errors are yielded as they occur and do not end iteration.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { extractor: self }
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        FrameExtractor::new()
    }
}

/// An iterator that extracts frames from a [`FrameExtractor`] until it reports
/// that no complete frame is available.
#[derive(Debug)]
#[must_use = "Frames is an iterator and will not extract frames unless consumed."]
pub struct Frames<'a> {
    /// The extractor to pull frames from.
    extractor: &'a mut FrameExtractor,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.extractor.extract().transpose()
    }
}

/// Find the index of the brace closing the object that starts at `bytes[0]`.
///
/// Braces within strings are ignored. Returns `None` if the object is not
/// closed within `bytes`.
fn find_object_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == ESCAPE {
                escaped = true;
            } else if byte == QUOTE {
                in_string = false;
            }
            continue;
        }
        match byte {
            QUOTE => in_string = true,
            OBJECT_START => depth += 1,
            OBJECT_END => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}
