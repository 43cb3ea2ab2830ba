//! Bounded parallel execution.
//!
//! `for_each` runs an action over every element of a sequence using a fixed
//! number of worker slots. All slots pull from one shared cursor, so each
//! element goes to exactly one slot, and a failing element never stops the
//! others. Failures are collected and handed back together once every slot
//! has drained.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

/// Number of slots used when the caller doesn't pick one:
/// twice the available parallelism, never fewer than two.
pub fn default_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    (cores * 2).max(2)
}

/// Why a single unit of work didn't complete.
#[derive(Debug)]
pub enum TaskFailure<E> {
    /// The action returned an error.
    Failed(E),
    /// The action panicked. Holds the panic message.
    Panicked(String),
    /// The slot running the action was cancelled by the runtime.
    Cancelled,
}

impl<E: fmt::Display> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err}"),
            Self::Panicked(msg) => write!(f, "task panicked: {msg}"),
            Self::Cancelled => write!(f, "task was cancelled"),
        }
    }
}

/// Every distinct failure observed during one bounded run.
#[derive(Debug)]
pub struct AggregateError<E> {
    failures: Vec<TaskFailure<E>>,
}

impl<E: fmt::Display> AggregateError<E> {
    /// Builds an aggregate, dropping failures whose message was already seen.
    pub fn new(failures: Vec<TaskFailure<E>>) -> Self {
        let mut seen = HashSet::new();
        let failures = failures
            .into_iter()
            .filter(|failure| seen.insert(failure.to_string()))
            .collect();
        Self { failures }
    }
}

impl<E> AggregateError<E> {
    pub fn failures(&self) -> &[TaskFailure<E>] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<TaskFailure<E>> {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AggregateError<E> {}

/// Runs `action` over `items` with the default number of slots.
pub async fn for_each<I, F, E>(items: I, action: F) -> Result<(), AggregateError<E>>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
    F: Fn(I::Item) -> Result<(), E> + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    for_each_with(items, default_concurrency(), action).await
}

/// Runs `action` over `items` with at most `max_concurrency` actions in
/// flight. A value of zero is treated as one.
///
/// Resolves once every slot has drained. If any action failed, panicked or
/// was cancelled, the result carries all of those failures rather than
/// only the first.
pub async fn for_each_with<I, F, E>(
    items: I,
    max_concurrency: usize,
    action: F,
) -> Result<(), AggregateError<E>>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
    F: Fn(I::Item) -> Result<(), E> + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    let slots = max_concurrency.max(1);
    let cursor = Arc::new(Mutex::new(items.into_iter()));
    let action = Arc::new(action);
    let failures = Arc::new(Mutex::new(Vec::new()));

    let mut running = JoinSet::new();
    for _ in 0..slots {
        let cursor = Arc::clone(&cursor);
        let action = Arc::clone(&action);
        let failures = Arc::clone(&failures);

        running.spawn_blocking(move || loop {
            // Hold the cursor only long enough to take one element.
            let next = cursor.lock().next();
            let Some(item) = next else {
                break;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| action(item))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.lock().push(TaskFailure::Failed(err)),
                Err(payload) => failures
                    .lock()
                    .push(TaskFailure::Panicked(panic_message(payload.as_ref()))),
            }
        });
    }

    while let Some(joined) = running.join_next().await {
        if let Err(err) = joined {
            let failure = if err.is_cancelled() {
                TaskFailure::Cancelled
            } else {
                TaskFailure::Panicked(err.to_string())
            };
            failures.lock().push(failure);
        }
    }

    let failures = std::mem::take(&mut *failures.lock());
    if failures.is_empty() {
        Ok(())
    } else {
        debug!("{} of the dispatched actions failed", failures.len());
        Err(AggregateError::new(failures))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
