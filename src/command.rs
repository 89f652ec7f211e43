//! Commands sent from the host to a device.
//!
//! Devices accept two kinds of commands, both terminated by [`TERMINATOR`]:
//!
//! * [`BinaryCommand`]: a type code followed by a 4 byte numeric payload.
//! * [`TextCommand`]: a line of text, such as [`GET_INFO`].
//!
//! ## Binary payloads
//!
//! The [`Endianness`] of a binary command not only selects the byte order of
//! the payload but also how the value is represented:
//!
//! | Endianness            | Payload                       |
//! |-----------------------|-------------------------------|
//! | [`Little`] (default)  | IEEE-754 single-precision float |
//! | [`Big`]               | 32-bit signed integer         |
//!
//! Devices depend on this pairing so it must not be "fixed" on the host side.
//!
//! ```
//! use pika_serial::command::{BinaryCommand, Endianness};
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let cmd = BinaryCommand::try_new(3, 1.5, Endianness::Little)?;
//! assert_eq!(cmd.to_bytes(), [3, 0x00, 0x00, 0xC0, 0x3F, b'\r', b'\n']);
//!
//! let cmd = BinaryCommand::try_new(3, 7, Endianness::Big)?;
//! assert_eq!(cmd.to_bytes(), [3, 0, 0, 0, 7, b'\r', b'\n']);
//! # Ok(())
//! # }
//! ```
//!
//! [`Little`]: Endianness::Little
//! [`Big`]: Endianness::Big

use crate::error::InvalidCommandValueError;

/// The bytes terminating every command.
pub const TERMINATOR: &[u8; 2] = b"\r\n";

/// The text command requesting device and firmware information.
pub const GET_INFO: &str = "GET_INFO";

/// The byte order, and by extension the representation, of a binary payload.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Big-endian 32-bit signed integer.
    Big,
    /// Little-endian single-precision float.
    #[default]
    Little,
}

/// A fixed size binary command: `[type code][4 byte payload]\r\n`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BinaryCommand {
    /// The command type code
    type_code: u8,
    /// The already encoded payload
    payload: [u8; 4],
}

impl BinaryCommand {
    /// The size of an encoded binary command, including the terminator.
    pub const SIZE: usize = 7;

    /// Create a command with a little-endian float payload.
    pub fn float(type_code: u8, value: f32) -> Self {
        BinaryCommand {
            type_code,
            payload: value.to_le_bytes(),
        }
    }

    /// Create a command with a big-endian integer payload.
    pub fn int(type_code: u8, value: i32) -> Self {
        BinaryCommand {
            type_code,
            payload: value.to_be_bytes(),
        }
    }

    /// Create a command, choosing the payload representation from `endianness`.
    ///
    /// An error is returned if `value` is not representable: big-endian values
    /// must be integers within the `i32` range, and finite little-endian values
    /// must be within the `f32` range. Non-finite values are passed through as
    /// floats.
    #[allow(clippy::cast_possible_truncation)]
    pub fn try_new(
        type_code: u8,
        value: impl Into<f64>,
        endianness: Endianness,
    ) -> Result<Self, InvalidCommandValueError> {
        let value = value.into();
        match endianness {
            Endianness::Big => {
                if value.fract() != 0.0
                    || value < f64::from(i32::MIN)
                    || value > f64::from(i32::MAX)
                {
                    return Err(InvalidCommandValueError::new(value, endianness));
                }
                Ok(BinaryCommand::int(type_code, value as i32))
            }
            Endianness::Little => {
                if value.is_finite() && value.abs() > f64::from(f32::MAX) {
                    return Err(InvalidCommandValueError::new(value, endianness));
                }
                Ok(BinaryCommand::float(type_code, value as f32))
            }
        }
    }

    /// Get the command type code.
    pub const fn type_code(&self) -> u8 {
        self.type_code
    }

    /// Get the encoded payload.
    pub const fn payload(&self) -> [u8; 4] {
        self.payload
    }

    /// Encode the command for the wire.
    pub fn to_bytes(&self) -> [u8; BinaryCommand::SIZE] {
        let mut buffer = [0u8; BinaryCommand::SIZE];
        buffer[0] = self.type_code;
        buffer[1..5].copy_from_slice(&self.payload);
        buffer[5..].copy_from_slice(TERMINATOR);
        buffer
    }
}

/// A plain text command, sent as UTF-8 followed by the terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextCommand(String);

impl TextCommand {
    /// Create a new text command.
    ///
    /// The text should not contain the terminator, it is appended when encoding.
    pub fn new(text: impl Into<String>) -> Self {
        TextCommand(text.into())
    }

    /// Get the text of the command.
    pub fn text(&self) -> &str {
        &self.0
    }

    /// Encode the command for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.0.len() + TERMINATOR.len());
        buffer.extend_from_slice(self.0.as_bytes());
        buffer.extend_from_slice(TERMINATOR);
        buffer
    }
}

impl From<&str> for TextCommand {
    fn from(text: &str) -> Self {
        TextCommand::new(text)
    }
}

impl From<String> for TextCommand {
    fn from(text: String) -> Self {
        TextCommand(text)
    }
}

/// Any command that can be sent to a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// A binary command.
    Binary(BinaryCommand),
    /// A text command.
    Text(TextCommand),
}

impl Command {
    /// Encode the command for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Command::Binary(cmd) => cmd.to_bytes().to_vec(),
            Command::Text(cmd) => cmd.to_bytes(),
        }
    }
}

impl From<BinaryCommand> for Command {
    fn from(other: BinaryCommand) -> Self {
        Command::Binary(other)
    }
}

impl From<TextCommand> for Command {
    fn from(other: TextCommand) -> Self {
        Command::Text(other)
    }
}

/// Encode a binary command.
///
/// See [`BinaryCommand::try_new`] for how `value` is interpreted.
pub fn encode_binary(
    type_code: u8,
    value: impl Into<f64>,
    endianness: Endianness,
) -> Result<[u8; BinaryCommand::SIZE], InvalidCommandValueError> {
    BinaryCommand::try_new(type_code, value, endianness).map(|cmd| cmd.to_bytes())
}

/// Encode a text command.
pub fn encode_text(text: &str) -> Vec<u8> {
    TextCommand::new(text).to_bytes()
}
