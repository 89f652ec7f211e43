//! Types defining the different options when opening a link.

use super::Link;
use crate::{
    backend::{Connect, SerialConnector},
    error::LinkError,
    frame::DEFAULT_MAX_BUFFER_LEN,
};
use std::time::Duration;

/// Options for configuring and opening a serial link.
///
/// ## Example
///
/// ```rust
/// # use pika_serial::link::OpenSerialOptions;
/// # use std::time::Duration;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let link = OpenSerialOptions::new()
///     .baud_rate(115_200)
///     .timeout(Some(Duration::from_millis(50)))
///     .open("/dev/ttyUSB0")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OpenSerialOptions {
    /// The custom baud rate
    baud_rate: u32,
    /// The custom timeout
    timeout: Option<Duration>,
    /// The maximum length of the receive buffer, in characters.
    max_buffer_len: usize,
    /// How long to wait for the reader loop to stop when disconnecting.
    join_timeout: Duration,
}

impl OpenSerialOptions {
    /// The default baud rate of Pika devices: 460,800.
    pub const DEFAULT_BAUD_RATE: u32 = 460_800;

    /// Create a blank set of options ready for configuration.
    ///
    /// The default baud rate and read timeout are 460,800 and 1 second,
    /// respectively. The receive buffer holds up to
    /// [`DEFAULT_MAX_BUFFER_LEN`] characters and disconnecting waits up to 1
    /// second for the reader loop.
    ///
    /// Equivalent to [`default`](OpenSerialOptions::default).
    pub fn new() -> Self {
        OpenSerialOptions {
            baud_rate: OpenSerialOptions::DEFAULT_BAUD_RATE,
            timeout: Some(Duration::from_secs(1)),
            max_buffer_len: DEFAULT_MAX_BUFFER_LEN,
            join_timeout: Duration::from_secs(1),
        }
    }

    /// Set a custom baud rate.
    ///
    /// The default is 460,800.
    pub fn baud_rate(&mut self, baud_rate: u32) -> &mut Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set a custom read timeout.
    ///
    /// If duration is `None`, reads will block indefinitely. The default is 1 second.
    pub fn timeout(&mut self, duration: Option<Duration>) -> &mut Self {
        self.timeout = duration;
        self
    }

    /// Set the maximum length of the receive buffer, in characters.
    ///
    /// The default is [`DEFAULT_MAX_BUFFER_LEN`].
    pub fn max_buffer_len(&mut self, max_buffer_len: usize) -> &mut Self {
        self.max_buffer_len = max_buffer_len;
        self
    }

    /// Set how long [`Link::disconnect`] waits for the reader loop to stop.
    ///
    /// A reader loop that does not stop in time is abandoned. The default is 1 second.
    pub fn join_timeout(&mut self, duration: Duration) -> &mut Self {
        self.join_timeout = duration;
        self
    }

    /// Create a disconnected link to the serial device at the specified path.
    ///
    /// Nothing is opened until [`Link::connect`] is called.
    pub fn build(&self, path: &str) -> Link<SerialConnector> {
        self.build_with(SerialConnector {
            path: path.to_string(),
            baud_rate: self.baud_rate,
        })
    }

    /// Create a disconnected link that opens its backend with `connector`.
    ///
    /// The baud rate option only applies to links built with
    /// [`build`](OpenSerialOptions::build), as other connectors carry their
    /// own configuration. The read timeout is applied to every backend once it
    /// is opened.
    pub fn build_with<C: Connect>(&self, connector: C) -> Link<C> {
        Link::from_parts(
            connector,
            self.timeout,
            self.max_buffer_len,
            self.join_timeout,
        )
    }

    /// Open a link to the serial device at the specified path with the custom options.
    pub fn open(&self, path: &str) -> Result<Link<SerialConnector>, LinkError> {
        let mut link = self.build(path);
        link.connect()?;
        Ok(link)
    }
}

impl Default for OpenSerialOptions {
    fn default() -> Self {
        OpenSerialOptions::new()
    }
}
