//! One-shot events (toasts, prompts, navigation) kept apart from persistent view state.
//!
//! Only the most recent subscriber receives events. Events posted while nobody
//! observes are dropped, and a new subscriber never sees earlier events.

use std::{
    pin::Pin,
    sync::{Mutex, PoisonError},
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

pub struct ViewEvents<T> {
    subscriber: Mutex<Option<mpsc::UnboundedSender<T>>>,
}

impl<T> Default for ViewEvents<T> {
    fn default() -> Self {
        Self {
            subscriber: Mutex::new(None),
        }
    }
}

impl<T> ViewEvents<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previous subscriber; its stream ends once drained.
    pub fn subscribe(&self) -> ViewEventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(tx);
        ViewEventStream { rx }
    }

    /// Returns whether an observer took the event.
    pub fn post(&self, event: T) -> bool {
        let mut guard = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            debug!("view events: no observer, dropping event");
            return false;
        };
        if tx.send(event).is_err() {
            *guard = None;
            debug!("view events: observer went away, dropping event");
            return false;
        }
        true
    }

    pub fn has_observer(&self) -> bool {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

pub struct ViewEventStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> ViewEventStream<T> {
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking read of an already delivered event.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for ViewEventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
#[path = "tests/view_events_tests.rs"]
mod tests;
