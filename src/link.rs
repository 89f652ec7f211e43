//! A live connection to a Pika device.
//!
//! A [`Link`] owns the [`Backend`] for one device. While connected, a
//! background reader loop continuously reads whatever the device sends,
//! extracts [`Frame`]s from it, stores the most recent one and passes each to
//! an optional subscriber. Commands are written directly on the caller's
//! thread.
//!
//! ```rust
//! # use pika_serial::link::Link;
//! # use pika_serial::command::Endianness;
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let mut link = Link::open_serial("/dev/ttyUSB0")?;
//! link.subscribe(|frame| println!("{frame}"));
//! link.send_device_info_command()?;
//! link.send_command(3, 1.5, Endianness::Little)?;
//!
//! let latest = link.get_latest_frame();
//! if let Some(angle) = latest.get("angle") {
//!     println!("angle = {angle}");
//! }
//! link.disconnect();
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading
//!
//! There is exactly one reader loop per connected link. The subscriber runs
//! synchronously on that loop, so a slow subscriber delays the processing of
//! later frames (but never loses them). Everything else runs on the caller's
//! thread. Each send is a single write followed by a flush while holding the
//! channel, so concurrent sends never interleave on the wire.
//!
//! [`Backend`]: crate::backend::Backend

mod cache;
mod handlers;
mod options;
mod reader;
mod stats;
#[cfg(test)]
mod test;

pub use handlers::FrameHandler;
pub use options::OpenSerialOptions;
pub use stats::Stats;

use crate::{
    backend::{Backend, Connect, SerialConnector, UNKNOWN_BACKEND_NAME},
    command::{encode_binary, encode_text, Command, Endianness, GET_INFO},
    error::{LinkError, NotConnectedError},
    frame::Frame,
};
use cache::LatestFrame;
use handlers::Subscription;
use log::{debug, error, info, warn};
use reader::Reader;
use stats::Counters;
use std::{
    io::Write as _,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

/// How often `disconnect` checks whether the reader loop has stopped.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Lock a mutex, recovering the data if another thread panicked while holding it.
///
/// Every critical section in this crate is a plain assignment, copy or
/// single I/O call, so the data is never left half-updated.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The state of a link's connection to its device.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No backend is open, or the backend failed.
    #[default]
    Disconnected,
    /// The backend is open and the reader loop is running.
    Connected,
}

/// The state shared between a link and its reader loop.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<ConnectionState>,
    latest: LatestFrame,
    subscription: Subscription,
    counters: Counters,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }
}

/// The handle to a running reader loop.
#[derive(Debug)]
struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

/// A connection to a single Pika device.
///
/// The link starts disconnected when created with
/// [`OpenSerialOptions::build`]/[`build_with`](OpenSerialOptions::build_with)
/// and can be connected and disconnected any number of times. Dropping the
/// link disconnects it.
///
/// A link is `Send + Sync`: frames can be read and commands sent from any
/// number of threads through a shared reference. Connecting and
/// disconnecting require exclusive access.
pub struct Link<C: Connect = SerialConnector> {
    /// Opens the backend on every connection
    connector: C,
    /// The read timeout applied to the backend once opened
    read_timeout: Option<Duration>,
    /// The maximum length of the receive buffer, in characters
    max_buffer_len: usize,
    /// How long to wait for the reader loop to stop
    join_timeout: Duration,
    /// The open backend, shared with the reader loop
    channel: Option<Arc<Mutex<C::Backend>>>,
    /// The name of the open backend, for logging
    name: String,
    shared: Arc<Shared>,
    reader: Option<ReaderHandle>,
}

impl Link<SerialConnector> {
    /// Open a link to the serial device at `path` with the default options.
    ///
    /// See [`OpenSerialOptions`] to customize the options.
    pub fn open_serial(path: &str) -> Result<Self, LinkError> {
        OpenSerialOptions::new().open(path)
    }
}

impl<C: Connect> Link<C> {
    /// Create a disconnected link with the default options.
    pub fn from_connector(connector: C) -> Self {
        OpenSerialOptions::new().build_with(connector)
    }

    pub(crate) fn from_parts(
        connector: C,
        read_timeout: Option<Duration>,
        max_buffer_len: usize,
        join_timeout: Duration,
    ) -> Self {
        Link {
            connector,
            read_timeout,
            max_buffer_len,
            join_timeout,
            channel: None,
            name: UNKNOWN_BACKEND_NAME.to_string(),
            shared: Arc::default(),
            reader: None,
        }
    }

    /// Get the connector used to open the backend.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get the state of the connection.
    ///
    /// A link that was connected becomes [`Disconnected`] on its own if
    /// reading from the backend fails with anything other than a timeout.
    ///
    /// [`Disconnected`]: ConnectionState::Disconnected
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the link is connected or not.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Close the connection.
    ///
    /// The reader loop is asked to stop and given up to the join timeout to do
    /// so, after which the backend is closed. A reader loop that does not stop
    /// in time is abandoned, keeping its backend open until it eventually
    /// does. Either way, no frame is stored once this returns.
    ///
    /// Disconnecting a link that is not connected does nothing.
    pub fn disconnect(&mut self) {
        self.stop_reader();
        if self.channel.take().is_some() {
            info!("{} closed", self.name);
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn stop_reader(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        reader.stop.store(true, Ordering::SeqCst);
        self.shared.latest.invalidate();

        let deadline = Instant::now() + self.join_timeout;
        while !reader.thread.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "{} reader loop did not stop within {:?}, abandoning it",
                    self.name, self.join_timeout
                );
                return;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        if reader.thread.join().is_err() {
            error!("{} reader loop panicked", self.name);
        }
    }

    /// Get a snapshot of the most recently received frame.
    ///
    /// The frame is empty if none has been received yet. Later frames do not
    /// affect the returned snapshot.
    pub fn get_latest_frame(&self) -> Arc<Frame> {
        self.shared.latest.get()
    }

    /// Get the receive counters.
    pub fn stats(&self) -> Stats {
        self.shared.counters.snapshot()
    }

    /// Set the handler to call with every received frame, replacing any
    /// previous one.
    ///
    /// The handler runs on the reader loop, so frames are not processed while
    /// it runs. It may replace or remove itself, for example to handle a
    /// single frame, in which case it is dropped once it returns. If it
    /// panics, the panic is logged and the handler is kept.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: FnMut(&Frame) + Send + 'static,
    {
        self.shared.subscription.replace(Some(Box::new(handler)));
    }

    /// Remove the frame handler, if any, returning it.
    ///
    /// Called from within the handler, this returns `None`.
    pub fn unsubscribe(&self) -> Option<FrameHandler> {
        self.shared.subscription.replace(None)
    }

    /// Write `bytes` to the device, as is.
    ///
    /// The bytes are written and flushed before returning. An error is
    /// returned if the link is not connected or the write fails.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let channel = match &self.channel {
            Some(channel) if self.is_connected() => channel,
            _ => return Err(NotConnectedError::new().into()),
        };
        debug!("{} TX: {:?}", self.name, bytes);
        let mut backend = lock(channel);
        let result = backend.write_all(bytes).and_then(|()| backend.flush());
        if let Err(e) = &result {
            error!("{} write failed: {}", self.name, e);
        }
        Ok(result?)
    }

    /// Send a binary command.
    ///
    /// The `endianness` selects both the byte order and the representation of
    /// the payload, see [`command`](crate::command) for details. Values that
    /// cannot be represented are rejected without writing anything.
    pub fn send_command(
        &self,
        type_code: u8,
        value: impl Into<f64>,
        endianness: Endianness,
    ) -> Result<(), LinkError> {
        let bytes = encode_binary(type_code, value, endianness)?;
        self.send_raw(&bytes)
    }

    /// Send a text command.
    ///
    /// The terminator is appended, so `text` should not include it.
    pub fn send_text_command(&self, text: &str) -> Result<(), LinkError> {
        self.send_raw(&encode_text(text))
    }

    /// Ask the device for its device and firmware information.
    ///
    /// The device answers with a frame like any other.
    pub fn send_device_info_command(&self) -> Result<(), LinkError> {
        self.send_text_command(GET_INFO)
    }

    /// Send any command.
    pub fn send<T: Into<Command>>(&self, command: T) -> Result<(), LinkError> {
        self.send_raw(&command.into().to_bytes())
    }
}

impl<C> Link<C>
where
    C: Connect,
    C::Backend: Send + 'static,
{
    /// Open the backend and start the reader loop.
    ///
    /// Connecting a link that is already connected does nothing. A link that
    /// became disconnected because of a read fault can be reconnected.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.is_connected() {
            warn!("{} is already connected", self.name);
            return Ok(());
        }
        // Clean up after a read fault.
        self.stop_reader();
        self.channel = None;

        let mut backend = match self.connector.connect() {
            Ok(backend) => backend,
            Err(e) => {
                error!("failed to open {}: {}", self.connector.describe(), e);
                return Err(e);
            }
        };
        self.name = backend
            .name()
            .unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string());
        if let Err(e) = backend.set_read_timeout(self.read_timeout) {
            error!("{} failed to set the read timeout: {}", self.name, e);
            return Err(e.into());
        }
        let read_timeout = backend.read_timeout().ok().flatten();
        let channel = Arc::new(Mutex::new(backend));
        let stop = Arc::new(AtomicBool::new(false));
        let reader = Reader::new(
            Arc::clone(&channel),
            Arc::clone(&self.shared),
            Arc::clone(&stop),
            self.shared.latest.generation(),
            self.max_buffer_len,
            self.name.clone(),
        );

        self.shared.set_state(ConnectionState::Connected);
        let spawned = thread::Builder::new()
            .name(format!("pika-serial reader {}", self.name))
            .spawn(move || reader.run());
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                error!("{} failed to start the reader loop: {}", self.name, e);
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        info!("{} opened (read timeout {:?})", self.name, read_timeout);
        self.channel = Some(channel);
        self.reader = Some(ReaderHandle { stop, thread });
        Ok(())
    }
}

impl<C: Connect> Drop for Link<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<C: Connect> std::fmt::Debug for Link<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("connector", &self.connector.describe())
            .field("read_timeout", &self.read_timeout)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("max_buffer_len", &self.max_buffer_len)
            .field("join_timeout", &self.join_timeout)
            .finish_non_exhaustive()
    }
}
