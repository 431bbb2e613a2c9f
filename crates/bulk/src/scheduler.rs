//! Bounded task execution.
//!
//! Tasks run in waves by depth: every task of depth `n` settles before any
//! task of depth `n + 1` is admitted, so a directory always exists before
//! the files inside it are copied. Within a wave at most `limit` tasks are
//! in flight, admitted in submission order as slots free up.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use futures_util::stream;
use tracing::debug;

use crate::types::{TransferOutcome, TransferTask};

/// Runs transfer tasks with at most `limit` in flight.
#[derive(Debug)]
pub struct ConcurrencyLimitedScheduler {
    limit: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when a task settles.
struct Admission<'a>(&'a AtomicUsize);

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimitedScheduler {
    /// Creates a scheduler. A limit of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Highest number of tasks that were executing at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn admit(&self) -> Admission<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Admission(&self.in_flight)
    }

    /// Executes every task and returns one outcome per task, in the order
    /// the tasks were given.
    ///
    /// A failed task does not stop the others.
    pub async fn run<F, Fut>(&self, tasks: Vec<TransferTask>, execute: F) -> Vec<TransferOutcome>
    where
        F: Fn(TransferTask) -> Fut,
        Fut: Future<Output = TransferOutcome>,
    {
        let total = tasks.len();
        let mut waves: BTreeMap<usize, Vec<(usize, TransferTask)>> = BTreeMap::new();
        for (idx, task) in tasks.into_iter().enumerate() {
            waves.entry(task.depth).or_default().push((idx, task));
        }

        let mut slots: Vec<Option<TransferOutcome>> = (0..total).map(|_| None).collect();
        for (depth, wave) in waves {
            debug!(depth, tasks = wave.len(), limit = self.limit, "starting wave");
            let settled: Vec<(usize, TransferOutcome)> = stream::iter(wave)
                .map(|(idx, task)| {
                    let fut = execute(task);
                    async move {
                        let _admission = self.admit();
                        (idx, fut.await)
                    }
                })
                .buffer_unordered(self.limit)
                .collect()
                .await;
            for (idx, outcome) in settled {
                slots[idx] = Some(outcome);
            }
        }

        slots.into_iter().flatten().collect()
    }
}
