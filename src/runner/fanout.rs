//! Fan-out/join over independent units of work.
//!
//! Every unit runs as its own spawned task inside the caller's span. All units
//! always run to completion: a failure never cancels its siblings, and results
//! come back in input order regardless of completion order.

use crate::error::{JoinedError, UnitFailure};
use futures::future::join_all;
use std::any::Any;
use std::future::Future;
use tracing::Instrument;

/// Run `f` on every input concurrently and return each unit's own result.
///
/// A panicking unit is re-raised here once every unit has finished.
pub async fn par_map_settled<I, F, Fut, T, E>(inputs: I, mut f: F) -> Vec<Result<T, E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let handles: Vec<_> = inputs
        .into_iter()
        .map(|input| tokio::spawn(f(input).in_current_span()))
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(result) => result,
            Err(e) => std::panic::resume_unwind(
                e.try_into_panic()
                    .unwrap_or_else(|e| Box::new(e.to_string()) as Box<dyn Any + Send>),
            ),
        })
        .collect()
}

/// Run `f` on every input concurrently; all results, or every failure.
pub async fn par_map<I, F, Fut, T, E>(inputs: I, f: F) -> Result<Vec<T>, JoinedError<E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let settled = par_map_settled(inputs, f).await;
    let total = settled.len();

    let mut values = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (index, result) in settled.into_iter().enumerate() {
        match result {
            Ok(value) => values.push(value),
            Err(error) => failures.push(UnitFailure { index, error }),
        }
    }

    if failures.is_empty() {
        Ok(values)
    } else {
        Err(JoinedError { total, failures })
    }
}

/// [`par_map`] over `0..n`
pub async fn par_map_range<F, Fut, T, E>(n: usize, f: F) -> Result<Vec<T>, JoinedError<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    par_map(0..n, f).await
}
