//! Handlers for frames received on a link.

#[cfg(doc)]
use super::Link;
use super::lock;
use crate::frame::Frame;
use log::error;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Mutex,
};

/// A callback that is called with every frame received on a link.
///
/// See [`Link::subscribe`] for more details.
pub type FrameHandler = Box<dyn FnMut(&Frame) + Send + 'static>;

/// Implementation detail.
///
/// The single, replaceable, subscriber of a link.
#[derive(Default)]
pub(crate) struct Subscription(Mutex<Slot>);

#[derive(Default)]
struct Slot {
    /// The handler, absent while it is being called
    handler: Option<FrameHandler>,
    /// Incremented every time the handler is replaced
    version: u64,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl Subscription {
    /// Replace the handler, returning the previous one.
    ///
    /// While the handler is being called it is not in the slot, so replacing
    /// it from within itself returns `None`. The running handler is then
    /// dropped once it returns.
    pub fn replace(&self, handler: Option<FrameHandler>) -> Option<FrameHandler> {
        let mut slot = lock(&self.0);
        slot.version = slot.version.wrapping_add(1);
        std::mem::replace(&mut slot.handler, handler)
    }

    /// Call the handler, if there is one, with `frame`.
    ///
    /// The slot is not locked during the call, so the handler may replace
    /// itself. A panic within the handler is caught and logged. The handler is
    /// kept.
    pub fn dispatch(&self, name: &str, frame: &Frame) {
        let (mut handler, version) = {
            let mut slot = lock(&self.0);
            match slot.handler.take() {
                Some(handler) => (handler, slot.version),
                None => return,
            }
        };
        if catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
            error!("{} frame handler panicked", name);
        }

        let mut slot = lock(&self.0);
        if slot.version == version {
            slot.handler = Some(handler);
        } else {
            // Replaced during the call. Drop it without holding the lock.
            drop(slot);
            drop(handler);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{mpsc, Arc};

    #[test]
    fn last_registration_wins() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = Subscription::default();
        let frame = Frame::default();

        subscription.dispatch("test", &frame);

        let first = Arc::clone(&seen);
        subscription.replace(Some(Box::new(move |_: &Frame| first.lock().unwrap().push(1))));
        subscription.dispatch("test", &frame);

        let second = Arc::clone(&seen);
        let previous =
            subscription.replace(Some(Box::new(move |_: &Frame| second.lock().unwrap().push(2))));
        assert!(previous.is_some());
        subscription.dispatch("test", &frame);

        assert!(subscription.replace(None).is_some());
        subscription.dispatch("test", &frame);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panics_are_contained() {
        let mut calls = 0;
        let subscription = Subscription::default();
        let (tx, rx) = mpsc::channel();
        subscription.replace(Some(Box::new(move |_: &Frame| {
            calls += 1;
            tx.send(calls).unwrap();
            if calls == 1 {
                panic!("first frame");
            }
        })));
        subscription.dispatch("test", &Frame::default());
        subscription.dispatch("test", &Frame::default());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn handler_can_replace_itself() {
        let subscription = Arc::new(Subscription::default());
        let (tx, rx) = mpsc::channel();

        let inner = Arc::clone(&subscription);
        subscription.replace(Some(Box::new(move |_: &Frame| {
            tx.send("first").unwrap();
            let tx = tx.clone();
            let replaced = inner.replace(Some(Box::new(move |_: &Frame| {
                tx.send("second").unwrap();
            })));
            assert!(replaced.is_none());
        })));

        subscription.dispatch("test", &Frame::default());
        subscription.dispatch("test", &Frame::default());
        subscription.dispatch("test", &Frame::default());
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec!["first", "second", "second"]
        );
    }

    #[test]
    fn handler_can_remove_itself() {
        let subscription = Arc::new(Subscription::default());
        let (tx, rx) = mpsc::channel();

        let inner = Arc::clone(&subscription);
        subscription.replace(Some(Box::new(move |_: &Frame| {
            tx.send(()).unwrap();
            inner.replace(None);
        })));

        subscription.dispatch("test", &Frame::default());
        subscription.dispatch("test", &Frame::default());
        assert_eq!(rx.try_iter().count(), 1);
        assert!(subscription.replace(None).is_none());
    }
}
