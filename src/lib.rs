//! A small library for talking to Pika sense and gripper devices over a serial port.
//!
//! Devices continuously stream their status as JSON objects ([`frame::Frame`]s)
//! and accept short binary or text [`command`]s. A [`Link`](link::Link)
//! owns the serial port, runs a background loop that extracts frames from the
//! incoming bytes, keeps the most recent one, and writes commands.
//!
//! ```rust
//! use pika_serial::{command::Endianness, link::Link};
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let mut link = Link::open_serial("/dev/ttyUSB0")?;
//! link.send_command(10, 1, Endianness::Big)?;
//! println!("{}", link.get_latest_frame());
//! # Ok(())
//! # }
//! ```
//!
//! The frame extraction and command encoding are available on their own in
//! the [`frame`] and [`command`] modules, for use with other transports.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_debug_implementations)]

pub mod backend;
pub mod command;
pub mod error;
pub mod frame;
pub mod link;
