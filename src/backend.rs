//! Types that can exchange (read/write) bytes with a connected device.
//!
//! The [`Backend`] trait represents all such types, while the [`Connect`]
//! trait represents the types that know how to open one.

use std::io;
use std::time::Duration;

use crate::error::LinkError;
use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected device.
pub trait Backend: io::Read + io::Write + private::Sealed {
	/// Set the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error>;

	/// Get the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;

	/// Get the number of bytes that have been received but not yet read.
	fn bytes_to_read(&mut self) -> Result<usize, io::Error>;

	/// Read whatever bytes are pending, appending them to `buf`.
	///
	/// Only the bytes already received are requested, so this does not wait
	/// for more to arrive. If nothing is pending, or the read times out, no
	/// bytes are appended. Returns the number of bytes appended.
	fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, io::Error> {
		let pending = self.bytes_to_read()?;
		if pending == 0 {
			return Ok(0);
		}
		let start = buf.len();
		buf.resize(start + pending, 0);
		match self.read(&mut buf[start..]) {
			Ok(n) => {
				buf.truncate(start + n);
				Ok(n)
			}
			Err(e) if is_transient(&e) => {
				buf.truncate(start);
				Ok(0)
			}
			Err(e) => {
				buf.truncate(start);
				Err(e)
			}
		}
	}
}

/// Whether an I/O error only means that no data was available in time.
pub(crate) fn is_transient(error: &io::Error) -> bool {
	matches!(
		error.kind(),
		io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
	)
}

impl<C: Backend + ?Sized> Backend for Box<C> {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
	fn bytes_to_read(&mut self) -> Result<usize, io::Error> {
		(**self).bytes_to_read()
	}
	fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, io::Error> {
		(**self).read_available(buf)
	}
}

/// A platform agnostic serial port backend.
//
// The `serialport` crate exposes two platform specific serial ports, `COMPort`
// and `TTYPort` for windows and unix, respectively. Only one of them exists on
// any platform, so wrap whichever it is in a new type rather than paying for
// dynamic dispatch or an extra type parameter.
#[derive(Debug)]
pub struct Serial(pub(crate) ExternSerial);

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.0.read(buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

impl Backend for Serial {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		// The serialport API does not support infinite timeouts, so simply set
		// the timeout to the largest possible duration if `timeout` is `None`,
		// which is practically infinite.
		Ok(self.0.set_timeout(timeout.unwrap_or(Duration::MAX))?)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(Some(self.0.timeout()))
	}
	fn name(&self) -> Option<String> {
		self.0.name()
	}
	fn bytes_to_read(&mut self) -> Result<usize, io::Error> {
		let count = self.0.bytes_to_read()?;
		Ok(usize::try_from(count).unwrap_or(usize::MAX))
	}
}

/// Types that can open a [`Backend`].
///
/// A [`Link`](crate::link::Link) holds on to its connector so that it can
/// (re)open the backend every time it is connected.
pub trait Connect: private::SealedConnect {
	/// The type of backend that is opened.
	type Backend: Backend;

	/// Open a new backend.
	fn connect(&mut self) -> Result<Self::Backend, LinkError>;

	/// Get a description of what will be opened, for logging.
	fn describe(&self) -> String;
}

/// Opens a [`Serial`] port at a path.
///
/// Use [`OpenSerialOptions`](crate::link::OpenSerialOptions) to construct one.
#[derive(Debug, Clone)]
pub struct SerialConnector {
	/// The path of the serial device
	pub(crate) path: String,
	/// The baud rate
	pub(crate) baud_rate: u32,
}

impl Connect for SerialConnector {
	type Backend = Serial;

	fn connect(&mut self) -> Result<Serial, LinkError> {
		sp::new(self.path.as_str(), self.baud_rate)
			.data_bits(sp::DataBits::Eight)
			.parity(sp::Parity::None)
			.flow_control(sp::FlowControl::None)
			.stop_bits(sp::StopBits::One)
			.baud_rate(self.baud_rate)
			.open_native()
			.map(Serial)
			.map_err(Into::into)
	}

	fn describe(&self) -> String {
		format!("{} @ {} baud", self.path, self.baud_rate)
	}
}

#[cfg(any(test, feature = "mock"))]
pub use mock::Mock;

#[cfg(any(test, feature = "mock"))]
mod mock {
	use super::{private, Backend, Connect};
	use crate::error::LinkError;
	use std::{
		collections::VecDeque,
		io,
		sync::{Arc, Mutex, MutexGuard, PoisonError},
		time::Duration,
	};

	/// A mock backend for use in testing.
	///
	/// It has the following features:
	///   * It records all data written to it.
	///   * It can be filled with data for reading, including from another thread.
	///   * Specific errors can be inserted for calls to `connect`, `read`,
	///     `write`, and `flush`.
	///
	/// Clones share the same state, so a test can keep a clone and feed data to
	/// the instance owned by a [`Link`](crate::link::Link). The mock is also its
	/// own [`Connect`]or: connecting hands out another clone.
	#[derive(Debug, Clone, Default)]
	pub struct Mock {
		/// The shared state
		inner: Arc<Mutex<Inner>>,
	}

	#[derive(Debug, Default)]
	struct Inner {
		/// The data waiting to be read
		incoming: VecDeque<u8>,
		/// All data written so far
		written: Vec<u8>,
		/// The number of times the mock has been connected.
		connections: usize,
		/// The error to surface on the next connect, if any. It is only surfaced once.
		connect_error: Option<LinkError>,
		/// The error to surface on the next read, if any. It is only surfaced once.
		read_error: Option<io::Error>,
		/// The error to surface on the next write, if any. It is only surfaced once.
		write_error: Option<io::Error>,
		/// The error to surface on the next flush, if any. It is only surfaced once.
		flush_error: Option<io::Error>,
		/// The read timeout, which is recorded but not enforced.
		read_timeout: Option<Duration>,
	}

	impl Mock {
		/// Create a new Mock backend.
		pub fn new() -> Self {
			Mock::default()
		}

		fn lock(&self) -> MutexGuard<'_, Inner> {
			self.inner.lock().unwrap_or_else(PoisonError::into_inner)
		}

		/// Append data to the read buffer.
		///
		/// The data is not validated in any way.
		pub fn append_data<T: AsRef<[u8]>>(&self, bytes: T) {
			self.lock().incoming.extend(bytes.as_ref());
		}

		/// Whether the mock has any data available or not
		pub fn is_empty(&self) -> bool {
			self.lock().incoming.is_empty()
		}

		/// Take all the data written so far.
		pub fn take_written(&self) -> Vec<u8> {
			std::mem::take(&mut self.lock().written)
		}

		/// The number of times the mock has been successfully connected.
		pub fn connections(&self) -> usize {
			self.lock().connections
		}

		/// Set the error for the next `connect`, if any.
		pub fn connect_error(&self, err: Option<LinkError>) {
			self.lock().connect_error = err;
		}

		/// Set the error for the next read attempt, if any.
		pub fn read_error(&self, err: Option<io::Error>) {
			self.lock().read_error = err;
		}

		/// Set the error for the next `write`, if any.
		pub fn write_error(&self, err: Option<io::Error>) {
			self.lock().write_error = err;
		}

		/// Set the error for the next `flush`, if any.
		pub fn flush_error(&self, err: Option<io::Error>) {
			self.lock().flush_error = err;
		}
	}

	impl Backend for Mock {
		fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
			self.lock().read_timeout = timeout;
			Ok(())
		}

		fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
			Ok(self.lock().read_timeout)
		}

		fn name(&self) -> Option<String> {
			Some(format!("<mock 0x{:x}>", Arc::as_ptr(&self.inner) as usize))
		}

		fn bytes_to_read(&mut self) -> Result<usize, io::Error> {
			let mut inner = self.lock();
			if let Some(err) = inner.read_error.take() {
				Err(err)
			} else {
				Ok(inner.incoming.len())
			}
		}
	}

	impl io::Read for Mock {
		fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			let mut inner = self.lock();
			if let Some(err) = inner.read_error.take() {
				Err(err)
			} else if inner.incoming.is_empty() {
				// For a real device, having no data ready would result in a wait
				// and then eventual timeout error. However, as our data is in
				// memory that does not happen here. So simulate that behaviour by
				// returning a timeout error immediately.
				Err(io::Error::new(
					io::ErrorKind::TimedOut,
					"Simulated timeout error",
				))
			} else {
				let n = buf.len().min(inner.incoming.len());
				for (out, byte) in buf.iter_mut().zip(inner.incoming.drain(..n)) {
					*out = byte;
				}
				Ok(n)
			}
		}
	}

	impl io::Write for Mock {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			let mut inner = self.lock();
			if let Some(err) = inner.write_error.take() {
				Err(err)
			} else {
				inner.written.extend_from_slice(buf);
				Ok(buf.len())
			}
		}

		fn flush(&mut self) -> io::Result<()> {
			if let Some(err) = self.lock().flush_error.take() {
				Err(err)
			} else {
				Ok(())
			}
		}
	}

	impl Connect for Mock {
		type Backend = Mock;

		fn connect(&mut self) -> Result<Mock, LinkError> {
			let mut inner = self.lock();
			if let Some(err) = inner.connect_error.take() {
				return Err(err);
			}
			inner.connections += 1;
			Ok(self.clone())
		}

		fn describe(&self) -> String {
			"<mock>".to_string()
		}
	}

	impl private::Sealed for Mock {}
	impl private::SealedConnect for Mock {}

}

mod private {
	pub trait Sealed {}
	pub trait SealedConnect {}

	impl Sealed for super::Serial {}
	impl<C: super::Backend + ?Sized> Sealed for Box<C> {}

	impl SealedConnect for super::SerialConnector {}
}
