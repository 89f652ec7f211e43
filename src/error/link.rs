//! Error types for opening a link and sending commands over it.

use super::SerialDeviceInUseOrDisconnectedError;
use crate::command::Endianness;

/// A command was sent while the link was disconnected.
#[derive(Debug, Default, PartialEq, Eq, Hash)]
pub struct NotConnectedError(());

impl NotConnectedError {
    /// Create a new error.
    pub(crate) const fn new() -> Self {
        NotConnectedError(())
    }
}

impl_error_display! {
    NotConnectedError,
    self => "the link is not connected"
}

/// A command value cannot be represented in the payload selected by the
/// [`Endianness`].
///
/// Big-endian payloads are 32-bit signed integers, so the value must be
/// integral and within range. Little-endian payloads are single-precision
/// floats, so a finite value must fit within `f32`.
#[derive(Debug, PartialEq)]
pub struct InvalidCommandValueError {
    /// The rejected value.
    value: f64,
    /// The payload encoding that was requested.
    endianness: Endianness,
}

impl InvalidCommandValueError {
    /// Create a new error.
    pub(crate) const fn new(value: f64, endianness: Endianness) -> Self {
        InvalidCommandValueError { value, endianness }
    }

    /// Get the rejected value.
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the requested payload encoding.
    pub const fn endianness(&self) -> Endianness {
        self.endianness
    }
}

impl_error_display! {
    InvalidCommandValueError,
    self => "value {} cannot be encoded as a {} payload",
    self.value,
    match self.endianness {
        Endianness::Big => "big-endian i32",
        Endianness::Little => "little-endian f32",
    }
}

error_enum! {
    /// Any error returned when connecting a [`Link`](crate::link::Link) or
    /// sending a command over it.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum LinkError {
        SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
        Io(std::io::Error),
        NotConnected(NotConnectedError),
        InvalidCommandValue(InvalidCommandValueError),
    }
}
impl_is_timeout! { LinkError }
impl_from_serialport_error! { LinkError }
