use super::controller::{self, Controller, Outbox, Submission};
use super::error::{BufferError, ConfigError, Operation};
use super::metrics::{BufferMetrics, BufferMetricsCollector};
use super::options::{BufferOption, BufferOptions};
use crate::sink::Flusher;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Accumulates items and hands them to a [`Flusher`] in batches.
///
/// A batch is flushed when the buffer reaches capacity, when the flush
/// interval elapses, when [`flush`](Self::flush) is called, or on
/// [`close`](Self::close). Batches are delivered one at a time, in push order.
///
/// Every operation waits at most its configured timeout for the controller
/// to take the signal. A push or flush that times out is never applied: the
/// controller discards a signal whose caller is no longer waiting, so retrying
/// a timed-out push does not deliver the item twice.
///
/// None of the operations may be called from inside the flusher of the same
/// buffer; the controller is blocked on that flush and the call will time out.
///
/// Handles are cheap to clone. Dropping every handle without calling `close`
/// still delivers the remaining items.
pub struct Buffer<T> {
    outbox: Outbox<T>,
    options: Arc<BufferOptions>,
    metrics: Arc<BufferMetricsCollector>,
    done: CancellationToken,
    close_acknowledged: Arc<AtomicBool>,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            outbox: self.outbox.clone(),
            options: Arc::clone(&self.options),
            metrics: Arc::clone(&self.metrics),
            done: self.done.clone(),
            close_acknowledged: Arc::clone(&self.close_acknowledged),
        }
    }
}

impl<T> Buffer<T>
where
    T: Send + 'static,
{
    /// Validates `options` and spawns the controller on the current Tokio
    /// runtime.
    pub fn new<F>(flusher: F, options: BufferOptions) -> Result<Self, ConfigError>
    where
        F: Flusher<T>,
    {
        options.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let (outbox, inbox) = controller::channels();
        let metrics = Arc::new(BufferMetricsCollector::new());
        let done = CancellationToken::new();

        let controller = Controller::new(flusher, &options, inbox, Arc::clone(&metrics), done.clone());
        runtime.spawn(controller.run());

        Ok(Self {
            outbox,
            options: Arc::new(options),
            metrics,
            done,
            close_acknowledged: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn builder<F>() -> BufferBuilder<T, F>
    where
        F: Flusher<T>,
    {
        BufferBuilder::new()
    }

    /// Appends an item to the buffer.
    ///
    /// Returns once the controller has accepted the item, which may trigger a
    /// capacity flush. Fails with [`BufferError::Timeout`] if that does not
    /// happen within the push timeout (typically because a flush is running).
    pub async fn push(&self, item: T) -> Result<(), BufferError> {
        if self.is_closed() {
            return Err(self.reject_closed());
        }

        let (ack, accepted) = oneshot::channel();
        let handoff = async {
            self.outbox
                .items
                .send(Submission { item, ack })
                .await
                .map_err(|_| BufferError::Closed)?;
            accepted.await.map_err(|_| BufferError::Closed)
        };

        self.bounded(Operation::Push, self.options.push_timeout, handoff)
            .await
    }

    /// Asks the controller to flush whatever it holds.
    ///
    /// Succeeds once the request has been accepted, not once the flush has
    /// completed.
    pub async fn flush(&self) -> Result<(), BufferError> {
        if self.is_closed() {
            return Err(self.reject_closed());
        }

        let (ack, accepted) = oneshot::channel();
        let handoff = async {
            self.outbox
                .flushes
                .send(ack)
                .await
                .map_err(|_| BufferError::Closed)?;
            accepted.await.map_err(|_| BufferError::Closed)
        };

        self.bounded(Operation::Flush, self.options.flush_timeout, handoff)
            .await
    }

    /// Flushes the remaining items and stops the buffer.
    ///
    /// The close timeout applies twice: once for the controller to take the
    /// request and once for it to finish the final flush. A timeout in either
    /// phase leaves the buffer in a state where calling `close` again is
    /// safe; the retry either registers the request or waits for the final
    /// flush that is already running. Exactly one `close` call succeeds, every
    /// later operation fails with [`BufferError::Closed`].
    pub async fn close(&self) -> Result<(), BufferError> {
        if self.is_closed() {
            return self.acknowledge_close();
        }

        let close_timeout = self.options.close_timeout;
        let (ack, accepted) = oneshot::channel();
        let request = async {
            // A closed channel or dropped ack means the controller is already
            // on its way out; the completion wait below covers that case.
            if self.outbox.closes.send(ack).await.is_ok() {
                let _ = accepted.await;
            }
        };
        // A retry can find the final flush already running; completion then
        // ends this phase without waiting for the request slot.
        let registered = async {
            tokio::select! {
                () = request => {}
                () = self.done.cancelled() => {}
            }
        };
        if timeout(close_timeout, registered).await.is_err() {
            return Err(self.timed_out(Operation::Close, close_timeout));
        }

        if timeout(close_timeout, self.done.cancelled()).await.is_err() {
            return Err(self.timed_out(Operation::Close, close_timeout));
        }

        self.acknowledge_close()
    }
}

impl<T> Buffer<T> {
    /// True once the controller has finished its final flush.
    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    pub fn capacity(&self) -> usize {
        self.options.capacity
    }

    pub fn options(&self) -> &BufferOptions {
        &self.options
    }

    pub fn metrics(&self) -> BufferMetrics {
        self.metrics.snapshot()
    }

    pub fn metrics_collector(&self) -> Arc<BufferMetricsCollector> {
        Arc::clone(&self.metrics)
    }

    async fn bounded<Fut>(
        &self,
        operation: Operation,
        limit: Duration,
        handoff: Fut,
    ) -> Result<(), BufferError>
    where
        Fut: Future<Output = Result<(), BufferError>>,
    {
        match timeout(limit, handoff).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.metrics.record_closed_rejection();
                Err(e)
            }
            Err(_) => Err(self.timed_out(operation, limit)),
        }
    }

    fn timed_out(&self, operation: Operation, waited: Duration) -> BufferError {
        self.metrics.record_timeout(operation);
        warn!(%operation, waited_ms = waited.as_millis() as u64, "Buffer operation timed out");
        BufferError::timeout(operation, waited)
    }

    fn reject_closed(&self) -> BufferError {
        self.metrics.record_closed_rejection();
        BufferError::Closed
    }

    fn acknowledge_close(&self) -> Result<(), BufferError> {
        if self.close_acknowledged.swap(true, Ordering::AcqRel) {
            Err(self.reject_closed())
        } else {
            Ok(())
        }
    }
}

/// Collects a flusher and options, then validates them in [`build`](Self::build).
pub struct BufferBuilder<T, F> {
    flusher: Option<F>,
    options: BufferOptions,
    _items: PhantomData<fn(T)>,
}

impl<T, F> Default for BufferBuilder<T, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, F> BufferBuilder<T, F> {
    pub fn new() -> Self {
        Self {
            flusher: None,
            options: BufferOptions::default(),
            _items: PhantomData,
        }
    }

    pub fn flusher(mut self, flusher: F) -> Self {
        self.flusher = Some(flusher);
        self
    }

    pub fn options(mut self, options: BufferOptions) -> Self {
        self.options = options;
        self
    }

    /// Applies one named setting on top of what is already configured.
    pub fn option(mut self, option: BufferOption) -> Self {
        option.apply(&mut self.options);
        self
    }

    pub fn capacity(self, capacity: usize) -> Self {
        self.option(BufferOption::Capacity(capacity))
    }

    pub fn flush_interval(self, interval: Duration) -> Self {
        self.option(BufferOption::FlushInterval(interval))
    }

    pub fn push_timeout(self, limit: Duration) -> Self {
        self.option(BufferOption::PushTimeout(limit))
    }

    pub fn flush_timeout(self, limit: Duration) -> Self {
        self.option(BufferOption::FlushTimeout(limit))
    }

    pub fn close_timeout(self, limit: Duration) -> Self {
        self.option(BufferOption::CloseTimeout(limit))
    }
}

impl<T, F> BufferBuilder<T, F>
where
    T: Send + 'static,
    F: Flusher<T>,
{
    pub fn build(self) -> Result<Buffer<T>, ConfigError> {
        let flusher = self.flusher.ok_or(ConfigError::MissingFlusher)?;
        Buffer::new(flusher, self.options)
    }
}
