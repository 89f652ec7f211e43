//! Status frames and the utilities for extracting them from a byte stream.
//!
//! Devices continuously emit their status as JSON objects, one per update,
//! interleaved with whatever noise the link picks up. A [`FrameExtractor`]
//! accumulates the decoded text and pulls complete objects out of it one at a
//! time, yielding each as a [`Frame`].
//!
//! ```
//! use pika_serial::frame::FrameExtractor;
//!
//! let mut extractor = FrameExtractor::new();
//! extractor.push_bytes(b"\x00boot{\"motor\": {\"angle\": 1.25,},}{\"imu\"");
//! let frames: Vec<_> = extractor.frames().filter_map(Result::ok).collect();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0]["motor"]["angle"], 1.25);
//! // The start of the next frame is kept until the rest of it arrives.
//! assert_eq!(extractor.buffer(), "{\"imu\"");
//! ```

mod extract;
mod sanitize;

pub use extract::{FrameExtractor, Frames, DEFAULT_MAX_BUFFER_LEN};
pub use sanitize::sanitize;
pub use serde_json::{Map, Value};

/// The character opening a frame (and any nested object).
pub(crate) const OBJECT_START: u8 = b'{';

/// The character closing a frame (and any nested object).
pub(crate) const OBJECT_END: u8 = b'}';

/// The character closing an array.
pub(crate) const ARRAY_END: u8 = b']';

/// The character delimiting strings.
pub(crate) const QUOTE: u8 = b'"';

/// The character escaping the next character within a string.
pub(crate) const ESCAPE: u8 = b'\\';

/// The character separating members and elements.
pub(crate) const SEPARATOR: u8 = b',';

/// One decoded status update from a device.
///
/// A frame maps keys to arbitrary JSON values (numbers, strings, nested
/// objects, ...). Frames are never merged: each one fully describes the update
/// it was decoded from.
///
/// Frames dereference to the underlying [`Map`] for read-only access.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Frame(Map<String, Value>);

impl Frame {
    /// Parse a frame from the text of a single JSON object.
    pub(crate) fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Frame)
    }

    /// Get the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the frame and return the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl std::ops::Deref for Frame {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Map<String, Value>> for Frame {
    fn from(other: Map<String, Value>) -> Self {
        Frame(other)
    }
}

impl From<Frame> for Value {
    fn from(other: Frame) -> Self {
        Value::Object(other.0)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = serde_json::to_string(&self.0).map_err(|_| std::fmt::Error)?;
        f.write_str(&text)
    }
}
