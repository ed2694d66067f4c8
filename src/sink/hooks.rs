use super::Flusher;
use std::fmt;
use std::future::ready;
use thiserror::Error;
use tracing::warn;

type BatchHook<T> = Box<dyn FnMut(&[T]) -> anyhow::Result<()> + Send>;
type ItemHook<T> = Box<dyn FnMut(&T) -> anyhow::Result<()> + Send>;
type BatchErrorHook<T> = Box<dyn FnMut(&[T], &anyhow::Error) + Send>;
type ItemErrorHook<T> = Box<dyn FnMut(&T, &anyhow::Error) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    Start,
    Each,
    End,
}

impl fmt::Display for FlushPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushPhase::Start => "start",
            FlushPhase::Each => "each",
            FlushPhase::End => "end",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum FlushError {
    #[error("start hook failed: {error:#}")]
    Start { error: anyhow::Error },

    #[error("item hook failed at index {index}: {error:#}")]
    Item { index: usize, error: anyhow::Error },

    #[error("end hook failed: {error:#}")]
    End { error: anyhow::Error },
}

impl FlushError {
    pub fn phase(&self) -> FlushPhase {
        match self {
            FlushError::Start { .. } => FlushPhase::Start,
            FlushError::Item { .. } => FlushPhase::Each,
            FlushError::End { .. } => FlushPhase::End,
        }
    }
}

/// A flusher assembled from three phases: `on_start` sees the whole batch,
/// `on_each` sees every item in order, `on_end` sees the whole batch again.
///
/// When a phase fails its error callback runs. Unless that phase is set to
/// bypass errors, the run stops there. Unset hooks do nothing.
pub struct HookFlusher<T> {
    on_start: Option<BatchHook<T>>,
    on_each: Option<ItemHook<T>>,
    on_end: Option<BatchHook<T>>,
    on_start_error: Option<BatchErrorHook<T>>,
    on_each_error: Option<ItemErrorHook<T>>,
    on_end_error: Option<BatchErrorHook<T>>,
    bypass_start_errors: bool,
    bypass_each_errors: bool,
    bypass_end_errors: bool,
}

impl<T> Default for HookFlusher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HookFlusher<T> {
    pub fn new() -> Self {
        Self {
            on_start: None,
            on_each: None,
            on_end: None,
            on_start_error: None,
            on_each_error: None,
            on_end_error: None,
            bypass_start_errors: false,
            bypass_each_errors: false,
            bypass_end_errors: false,
        }
    }

    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&[T]) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }

    pub fn on_each<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&T) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_each = Some(Box::new(hook));
        self
    }

    pub fn on_end<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&[T]) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_end = Some(Box::new(hook));
        self
    }

    pub fn on_start_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&[T], &anyhow::Error) + Send + 'static,
    {
        self.on_start_error = Some(Box::new(hook));
        self
    }

    pub fn on_each_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&T, &anyhow::Error) + Send + 'static,
    {
        self.on_each_error = Some(Box::new(hook));
        self
    }

    pub fn on_end_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&[T], &anyhow::Error) + Send + 'static,
    {
        self.on_end_error = Some(Box::new(hook));
        self
    }

    pub fn bypass_errors(mut self, phase: FlushPhase, bypass: bool) -> Self {
        match phase {
            FlushPhase::Start => self.bypass_start_errors = bypass,
            FlushPhase::Each => self.bypass_each_errors = bypass,
            FlushPhase::End => self.bypass_end_errors = bypass,
        }
        self
    }

    /// Runs the three phases over `items`.
    pub fn run(&mut self, items: &[T]) -> Result<(), FlushError> {
        self.run_start(items)?;
        self.run_each(items)?;
        self.run_end(items)
    }

    fn run_start(&mut self, items: &[T]) -> Result<(), FlushError> {
        let Some(hook) = self.on_start.as_mut() else {
            return Ok(());
        };
        if let Err(error) = hook(items) {
            if let Some(on_error) = self.on_start_error.as_mut() {
                on_error(items, &error);
            }
            if !self.bypass_start_errors {
                return Err(FlushError::Start { error });
            }
        }
        Ok(())
    }

    fn run_each(&mut self, items: &[T]) -> Result<(), FlushError> {
        let Some(hook) = self.on_each.as_mut() else {
            return Ok(());
        };
        for (index, item) in items.iter().enumerate() {
            if let Err(error) = hook(item) {
                if let Some(on_error) = self.on_each_error.as_mut() {
                    on_error(item, &error);
                }
                if !self.bypass_each_errors {
                    return Err(FlushError::Item { index, error });
                }
            }
        }
        Ok(())
    }

    fn run_end(&mut self, items: &[T]) -> Result<(), FlushError> {
        let Some(hook) = self.on_end.as_mut() else {
            return Ok(());
        };
        if let Err(error) = hook(items) {
            if let Some(on_error) = self.on_end_error.as_mut() {
                on_error(items, &error);
            }
            if !self.bypass_end_errors {
                return Err(FlushError::End { error });
            }
        }
        Ok(())
    }
}

impl<T> Flusher<T> for HookFlusher<T>
where
    T: Send + 'static,
{
    fn flush(&mut self, items: &[T]) -> impl Future<Output = ()> + Send {
        if let Err(e) = self.run(items) {
            warn!(phase = %e.phase(), batch_size = items.len(), "Flush hooks failed: {}", e);
        }
        ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_start_and_end_called_once_per_run() {
        let starts = counter();
        let ends = counter();
        let (s, e) = (Arc::clone(&starts), Arc::clone(&ends));
        let mut flusher = HookFlusher::new()
            .on_start(move |_items: &[i32]| {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_end(move |_items: &[i32]| {
                e.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        flusher.run(&[1, 2, 3]).unwrap();

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_each_called_once_per_item_in_order() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut flusher = HookFlusher::new().on_each(move |item: &i32| {
            sink.lock().push(*item);
            Ok(())
        });

        flusher.run(&[4, 5, 6]).unwrap();

        assert_eq!(*seen.lock(), vec![4, 5, 6]);
    }

    #[test]
    fn test_start_failure_stops_run_and_reports() {
        let reported = counter();
        let items_seen = counter();
        let (r, i) = (Arc::clone(&reported), Arc::clone(&items_seen));
        let mut flusher = HookFlusher::new()
            .on_start(|_items: &[i32]| Err(anyhow!("connection refused")))
            .on_start_error(move |items: &[i32], _err: &anyhow::Error| {
                r.fetch_add(items.len(), Ordering::SeqCst);
            })
            .on_each(move |_item: &i32| {
                i.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let err = flusher.run(&[1, 2]).unwrap_err();

        assert_eq!(err.phase(), FlushPhase::Start);
        assert_eq!(reported.load(Ordering::SeqCst), 2);
        assert_eq!(items_seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_item_failure_reports_index() {
        let failed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&failed);
        let mut flusher = HookFlusher::new()
            .on_each(|item: &i32| {
                if *item == 2 {
                    Err(anyhow!("bad item"))
                } else {
                    Ok(())
                }
            })
            .on_each_error(move |item: &i32, _err: &anyhow::Error| sink.lock().push(*item));

        let err = flusher.run(&[1, 2, 3]).unwrap_err();

        assert!(matches!(err, FlushError::Item { index: 1, .. }));
        assert_eq!(*failed.lock(), vec![2]);
    }

    #[test]
    fn test_bypassed_item_failures_continue_to_end() {
        let ends = counter();
        let e = Arc::clone(&ends);
        let errors = counter();
        let errs = Arc::clone(&errors);
        let mut flusher = HookFlusher::new()
            .on_each(|_item: &i32| Err(anyhow!("always fails")))
            .on_each_error(move |_item: &i32, _err: &anyhow::Error| {
                errs.fetch_add(1, Ordering::SeqCst);
            })
            .on_end(move |_items: &[i32]| {
                e.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .bypass_errors(FlushPhase::Each, true);

        assert!(flusher.run(&[1, 2, 3]).is_ok());
        assert_eq!(errors.load(Ordering::SeqCst), 3);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_failure_without_bypass() {
        let mut flusher =
            HookFlusher::new().on_end(|_items: &[i32]| Err(anyhow!("commit failed")));

        let err = flusher.run(&[1]).unwrap_err();
        assert_eq!(err.phase(), FlushPhase::End);
        assert!(err.to_string().contains("commit failed"));

        let mut flusher = HookFlusher::new()
            .on_end(|_items: &[i32]| Err(anyhow!("commit failed")))
            .bypass_errors(FlushPhase::End, true);
        assert!(flusher.run(&[1]).is_ok());
    }

    #[tokio::test]
    async fn test_failures_do_not_escape_flush() {
        let mut flusher = HookFlusher::new().on_start(|_items: &[i32]| Err(anyhow!("down")));
        flusher.flush(&[1, 2]).await;
    }
}
