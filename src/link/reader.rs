//! The background loop that turns received bytes into frames.

use super::{lock, ConnectionState, Shared};
use crate::{
    backend::{is_transient, Backend},
    error::FrameError,
    frame::{Frame, FrameExtractor},
};
use log::{debug, error, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

/// The pause after every iteration of the loop.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The pause while the link is disconnected or after a read fault.
pub(crate) const DISCONNECTED_PAUSE: Duration = Duration::from_millis(100);

/// The state owned by a reader loop.
///
/// The receive buffer lives in the [`FrameExtractor`] and is never shared.
pub(crate) struct Reader<B> {
    /// The channel, shared with the senders
    channel: Arc<Mutex<B>>,
    /// The state shared with the link
    shared: Arc<Shared>,
    /// Set when the loop should exit
    stop: Arc<AtomicBool>,
    /// The cache generation this loop writes to
    generation: u64,
    extractor: FrameExtractor,
    /// The backend name, for logging
    name: String,
}

impl<B> std::fmt::Debug for Reader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Reader<B> {
    pub fn new(
        channel: Arc<Mutex<B>>,
        shared: Arc<Shared>,
        stop: Arc<AtomicBool>,
        generation: u64,
        max_buffer_len: usize,
        name: String,
    ) -> Self {
        Reader {
            channel,
            shared,
            stop,
            generation,
            extractor: FrameExtractor::with_max_len(max_buffer_len),
            name,
        }
    }

    /// Run until the stop flag is set.
    ///
    /// Only a stop request ends the loop. While the link is disconnected the
    /// loop idles.
    pub fn run(mut self) {
        info!("{} reader loop started", self.name);
        let mut chunk = Vec::new();
        while !self.stopped() {
            if self.shared.state() == ConnectionState::Disconnected {
                thread::sleep(DISCONNECTED_PAUSE);
                continue;
            }

            chunk.clear();
            // Only hold the channel for the read itself.
            let result = lock(&self.channel).read_available(&mut chunk);
            match result {
                Ok(0) => {}
                Ok(_) => self.process(&chunk),
                Err(e) if is_transient(&e) => {}
                Err(e) => {
                    error!("{} read failed: {}", self.name, e);
                    if !self.stopped() {
                        self.shared.set_state(ConnectionState::Disconnected);
                    }
                    thread::sleep(DISCONNECTED_PAUSE);
                    continue;
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
        info!("{} reader loop stopped", self.name);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Decode a chunk of bytes and deliver every frame it completes.
    fn process(&mut self, chunk: &[u8]) {
        debug!("{} RX: {:?}", self.name, String::from_utf8_lossy(chunk));
        self.shared.counters.bytes_received(chunk.len());
        let dropped = self.extractor.push_bytes(chunk);
        if dropped > 0 {
            debug!("{} dropped {} undecodable bytes", self.name, dropped);
        }

        let Reader {
            extractor,
            shared,
            stop,
            generation,
            name,
            ..
        } = self;
        for result in extractor.frames() {
            match result {
                Ok(frame) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    deliver(shared, *generation, name, frame);
                }
                Err(FrameError::Malformed(e)) => {
                    shared.counters.frame_dropped();
                    warn!("{} dropped malformed frame: {}", name, e);
                }
                Err(FrameError::Overflow(e)) => {
                    shared.counters.buffer_overflowed();
                    warn!("{} {}", name, e);
                }
            }
        }
    }
}

/// Store a frame in the cache and pass it to the subscriber.
fn deliver(shared: &Shared, generation: u64, name: &str, frame: Frame) {
    debug!("{} RX frame: {}", name, frame);
    let frame = Arc::new(frame);
    if !shared.latest.update(generation, Arc::clone(&frame)) {
        // The link has moved on without this loop.
        return;
    }
    shared.counters.frame_received();
    shared.subscription.dispatch(name, &frame);
}
