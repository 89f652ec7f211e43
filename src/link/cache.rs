//! The most recent frame received on a link.

use super::lock;
use crate::frame::Frame;
use std::sync::{Arc, Mutex};

/// Holds the most recently received frame.
///
/// Every update belongs to a generation. Invalidating the cache starts a new
/// generation, after which updates from older generations are ignored. This
/// is how a stopped (or abandoned) reader loop is kept from writing to the
/// cache.
#[derive(Debug, Default)]
pub(crate) struct LatestFrame(Mutex<Slot>);

#[derive(Debug, Default)]
struct Slot {
    frame: Arc<Frame>,
    generation: u64,
}

impl LatestFrame {
    /// Get a snapshot of the latest frame.
    pub fn get(&self) -> Arc<Frame> {
        Arc::clone(&lock(&self.0).frame)
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        lock(&self.0).generation
    }

    /// Replace the latest frame, if `generation` is still current.
    ///
    /// Returns whether the frame was stored.
    pub fn update(&self, generation: u64, frame: Arc<Frame>) -> bool {
        let mut slot = lock(&self.0);
        if slot.generation != generation {
            return false;
        }
        slot.frame = frame;
        true
    }

    /// Start a new generation, rejecting all further updates from older ones.
    ///
    /// The current frame is kept.
    pub fn invalidate(&self) {
        let mut slot = lock(&self.0);
        slot.generation = slot.generation.wrapping_add(1);
    }
}
