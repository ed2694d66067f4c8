use super::batch::FlushReason;
use super::metrics::BufferMetricsCollector;
use super::options::BufferOptions;
use crate::sink::Flusher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

// Larger capacities grow the accumulator on demand.
const MAX_PREALLOCATED_ITEMS: usize = 4096;

/// Fired by the controller once the signal has been taken off its channel.
pub(crate) type Ack = oneshot::Sender<()>;

pub(crate) struct Submission<T> {
    pub(crate) item: T,
    pub(crate) ack: Ack,
}

/// Sending half of the controller's signal channels, one per signal kind.
pub(crate) struct Outbox<T> {
    pub(crate) items: mpsc::Sender<Submission<T>>,
    pub(crate) flushes: mpsc::Sender<Ack>,
    pub(crate) closes: mpsc::Sender<Ack>,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            flushes: self.flushes.clone(),
            closes: self.closes.clone(),
        }
    }
}

pub(crate) struct Inbox<T> {
    items: mpsc::Receiver<Submission<T>>,
    flushes: mpsc::Receiver<Ack>,
    closes: mpsc::Receiver<Ack>,
}

/// Single-slot channels. A signal only takes effect if its acknowledgement
/// reaches the caller, so a caller that timed out while its signal sat in the
/// slot never has it applied. Callers observe a rendezvous, not a queue.
pub(crate) fn channels<T>() -> (Outbox<T>, Inbox<T>) {
    let (items_tx, items_rx) = mpsc::channel(1);
    let (flushes_tx, flushes_rx) = mpsc::channel(1);
    let (closes_tx, closes_rx) = mpsc::channel(1);
    (
        Outbox {
            items: items_tx,
            flushes: flushes_tx,
            closes: closes_tx,
        },
        Inbox {
            items: items_rx,
            flushes: flushes_rx,
            closes: closes_rx,
        },
    )
}

/// Owns the accumulator for the whole life of a buffer. Runs as one task;
/// every other party talks to it through the [`Inbox`] channels.
pub(crate) struct Controller<T, F> {
    flusher: F,
    items: Vec<T>,
    capacity: usize,
    flush_interval: Duration,
    inbox: Inbox<T>,
    metrics: Arc<BufferMetricsCollector>,
    done: CancellationToken,
}

impl<T, F> Controller<T, F>
where
    T: Send + 'static,
    F: Flusher<T>,
{
    pub(crate) fn new(
        flusher: F,
        options: &BufferOptions,
        inbox: Inbox<T>,
        metrics: Arc<BufferMetricsCollector>,
        done: CancellationToken,
    ) -> Self {
        Self {
            flusher,
            items: Vec::with_capacity(options.capacity.min(MAX_PREALLOCATED_ITEMS)),
            capacity: options.capacity,
            flush_interval: options.flush_interval,
            inbox,
            metrics,
            done,
        }
    }

    pub(crate) async fn run(mut self) {
        // Raised on every exit path, including a panicking flusher.
        let _done = self.done.clone().drop_guard();
        let mut ticker = self.new_ticker();
        let mut open = true;

        debug!(
            capacity = self.capacity,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Buffer controller started"
        );

        while open {
            let trigger = tokio::select! {
                received = self.inbox.items.recv() => match received {
                    Some(Submission { item, ack }) => {
                        // A caller that timed out has dropped its receiver and
                        // already reported failure; its item must not land.
                        if ack.send(()).is_ok() {
                            self.items.push(item);
                            self.metrics.record_accepted();
                            (self.items.len() >= self.capacity).then_some(FlushReason::Capacity)
                        } else {
                            trace!("Push caller gave up before acknowledgement, item dropped");
                            None
                        }
                    }
                    None => {
                        open = false;
                        self.pending(FlushReason::Close)
                    }
                },
                () = next_tick(&mut ticker) => self.pending(FlushReason::Interval),
                received = self.inbox.flushes.recv() => match received {
                    Some(ack) => {
                        if ack.send(()).is_ok() {
                            self.pending(FlushReason::Manual)
                        } else {
                            trace!("Flush caller gave up before acknowledgement, request ignored");
                            None
                        }
                    }
                    None => {
                        open = false;
                        self.pending(FlushReason::Close)
                    }
                },
                received = self.inbox.closes.recv() => {
                    if let Some(ack) = received {
                        let _ = ack.send(());
                    }
                    open = false;
                    self.pending(FlushReason::Close)
                }
            };

            if let Some(reason) = trigger {
                ticker = None;
                self.flush(reason).await;
                if open {
                    ticker = self.new_ticker();
                }
            }
        }

        info!(
            items_flushed = self.metrics.snapshot().items_flushed,
            "Buffer controller stopped"
        );
    }

    /// `reason` if there is anything to flush.
    fn pending(&self, reason: FlushReason) -> Option<FlushReason> {
        (!self.items.is_empty()).then_some(reason)
    }

    async fn flush(&mut self, reason: FlushReason) {
        let batch_size = self.items.len();
        let started = Instant::now();

        self.flusher.flush(&self.items).await;
        self.items.clear();
        self.metrics.record_flush(reason, batch_size);

        debug!(
            %reason,
            batch_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Flushed batch"
        );
    }

    fn new_ticker(&self) -> Option<Interval> {
        if self.flush_interval.is_zero() {
            return None;
        }
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(ticker)
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
