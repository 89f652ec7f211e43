//! Error types for extracting frames from the receive buffer.

/// A candidate frame was found but it could not be parsed, even after
/// sanitization.
///
/// The opening brace that started the candidate has been dropped from the
/// buffer, so the next extraction resumes at the following candidate.
#[derive(Debug, PartialEq, Eq)]
pub struct MalformedFrameError {
    /// The sanitized candidate text.
    text: Box<str>,
    /// The parser's description of the problem.
    reason: Box<str>,
}

impl MalformedFrameError {
    /// Create a new error.
    pub(crate) fn new(text: &str, reason: &serde_json::Error) -> Self {
        MalformedFrameError {
            text: text.into(),
            reason: reason.to_string().into_boxed_str(),
        }
    }

    /// Get the sanitized text of the rejected candidate.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Get the parser's description of the problem.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl_error_display! {
    MalformedFrameError,
    self => "malformed frame ({}): {}", self.reason, self.text
}

/// The receive buffer grew past its maximum length and was truncated.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferOverflowError {
    /// The number of characters that were discarded.
    discarded: usize,
    /// Whether the discarded content belonged to an unterminated frame.
    partial_frame: bool,
}

impl BufferOverflowError {
    /// Create a new error.
    pub(crate) const fn new(discarded: usize, partial_frame: bool) -> Self {
        BufferOverflowError {
            discarded,
            partial_frame,
        }
    }

    /// Get the number of characters that were discarded.
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    /// Whether the discarded content was the head of an unterminated frame
    /// (`true`) or noise without any frame start (`false`).
    pub const fn partial_frame(&self) -> bool {
        self.partial_frame
    }
}

impl_error_display! {
    BufferOverflowError,
    self => "receive buffer overflowed, discarded {} characters of {}",
    self.discarded,
    if self.partial_frame { "an unterminated frame" } else { "noise" }
}

error_enum! {
    /// Any error produced while extracting a frame from the receive buffer.
    ///
    /// Neither kind is fatal. The buffer has already been adjusted so that
    /// extraction can continue.
    #[derive(Debug, PartialEq, Eq)]
    pub enum FrameError {
        Malformed(MalformedFrameError),
        Overflow(BufferOverflowError),
    }
}
