//! Fan-out of [`AudioFrame`]s from the audio callback to any number of
//! listeners, plus a single-slot "latest frame" cell for the render loop.
//!
//! Publishing never takes a lock: both the listener list and the slot are
//! atomically swapped `Arc`s. Subscribing and unsubscribing copy the list.

use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::AudioFrame;

type Listener = Arc<dyn Fn(&AudioFrame) + Send + Sync>;

/// Handle returned by [`FrameBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Entry {
    id: SubscriptionId,
    listener: Listener,
}

pub struct FrameBus {
    listeners: ArcSwap<Vec<Entry>>,
    latest: ArcSwapOption<AudioFrame>,
    next_id: AtomicU64,
}

impl FrameBus {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            latest: ArcSwapOption::empty(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener. It runs on the publishing thread (the audio
    /// callback for live input), so it should return quickly.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AudioFrame) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Entry {
            id,
            listener: Arc::new(listener),
        };
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(entry.clone());
            next
        });
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let previous = self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|entry| entry.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|entry| entry.id == id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.load().len()
    }

    /// Stores `frame` as the latest frame and hands it to every listener.
    ///
    /// A listener that panics is logged and skipped; the remaining listeners
    /// still receive the frame.
    pub fn publish(&self, frame: AudioFrame) {
        self.latest.store(Some(Arc::new(frame)));

        let listeners = self.listeners.load_full();
        for entry in listeners.iter() {
            let listener = &entry.listener;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(&frame))) {
                tracing::warn!(
                    subscription = entry.id.0,
                    reason = panic_message(payload.as_ref()),
                    "audio frame listener failed"
                );
            }
        }
    }

    /// The most recently published frame, if any. Never blocks.
    pub fn latest(&self) -> Option<AudioFrame> {
        self.latest.load().as_deref().copied()
    }

    /// The most recently published frame, or silence before the first one.
    pub fn latest_or_silent(&self) -> AudioFrame {
        self.latest().unwrap_or_default()
    }
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBus")
            .field("listeners", &self.listener_count())
            .field("latest", &self.latest())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
