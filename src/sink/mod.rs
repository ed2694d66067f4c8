//! The capability a [`Buffer`](crate::buffer::Buffer) hands its batches to.
//!
//! The controller awaits [`Flusher::flush`] to completion before it services
//! any other event, so a slow flusher slows down pushes instead of letting
//! items pile up. Calling back into the owning buffer from inside `flush`
//! deadlocks until the caller's timeout fires: the controller is busy
//! waiting on that very call.

pub mod hooks;

pub use hooks::{FlushError, FlushPhase, HookFlusher};

use parking_lot::Mutex;
use std::future::ready;
use std::sync::Arc;

pub trait Flusher<T>: Send + 'static {
    /// Disposes of one batch. `items` holds exactly the accumulated items, in
    /// push order, and is never empty. Failures are the flusher's own concern.
    fn flush(&mut self, items: &[T]) -> impl Future<Output = ()> + Send;
}

/// Adapts a plain closure into a [`Flusher`]. See [`flush_fn`].
pub struct FnFlusher<F>(F);

/// Wraps a synchronous closure. The closure runs on the controller task, so
/// it should not block the thread for long.
pub fn flush_fn<T, F>(f: F) -> FnFlusher<F>
where
    F: FnMut(&[T]) + Send + 'static,
{
    FnFlusher(f)
}

impl<T, F> Flusher<T> for FnFlusher<F>
where
    F: FnMut(&[T]) + Send + 'static,
{
    fn flush(&mut self, items: &[T]) -> impl Future<Output = ()> + Send {
        (self.0)(items);
        ready(())
    }
}

/// Records every batch it receives. Clones share the same record.
#[derive(Debug)]
pub struct CollectingFlusher<T> {
    batches: Arc<Mutex<Vec<Vec<T>>>>,
}

impl<T> Clone for CollectingFlusher<T> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
        }
    }
}

impl<T> Default for CollectingFlusher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CollectingFlusher<T> {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn item_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

impl<T: Clone> CollectingFlusher<T> {
    pub fn batches(&self) -> Vec<Vec<T>> {
        self.batches.lock().clone()
    }

    /// All delivered items, flattened in delivery order.
    pub fn items(&self) -> Vec<T> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl<T> Flusher<T> for CollectingFlusher<T>
where
    T: Clone + Send + 'static,
{
    fn flush(&mut self, items: &[T]) -> impl Future<Output = ()> + Send {
        self.batches.lock().push(items.to_vec());
        ready(())
    }
}
