// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ordered pipeline — fans jobs out to worker threads and hands their results
// back to a single consumer strictly in submission order.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{Receiver, sync_channel};
use std::sync::{Condvar, Mutex, PoisonError};

use bildwerk_core::error::Result;
use tracing::{debug, error, warn};

/// Runs a job list on `workers` threads with at most `window` results in
/// flight ahead of the consumer.
#[derive(Debug, Clone, Copy)]
pub struct OrderedPipeline {
    workers: usize,
    window: usize,
}

impl OrderedPipeline {
    pub fn new(workers: usize, window: usize) -> Self {
        Self {
            workers: workers.max(1),
            window: window.max(1),
        }
    }

    /// Process `jobs` and feed every result to `consume` in job order.
    ///
    /// Each worker builds its own state with `init` once. A job whose worker
    /// panics produces no result; its sequence number is returned in the list
    /// of lost jobs instead, and the rest of the run continues.
    pub fn run<J, R, S, I, W, C>(
        &self,
        jobs: Vec<J>,
        init: I,
        work: W,
        mut consume: C,
    ) -> Result<Vec<usize>>
    where
        J: Send,
        R: Send,
        I: Fn() -> S + Sync,
        W: Fn(&mut S, J) -> R + Sync,
        C: FnMut(usize, R),
    {
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let window = ReorderWindow::new(self.window);
        let (job_tx, job_rx) = sync_channel::<(usize, J)>(self.window);
        let (result_tx, result_rx) = sync_channel::<(usize, Option<R>)>(self.window);
        let job_rx = Mutex::new(job_rx);

        // Both senders are owned by the scope closure, so an early return
        // closes the channels and lets already spawned workers exit.
        std::thread::scope(|scope| -> Result<Vec<usize>> {
            let (job_tx, result_tx) = (job_tx, result_tx);
            for worker in 0..self.workers.min(total) {
                let result_tx = result_tx.clone();
                let (job_rx, init, work) = (&job_rx, &init, &work);
                std::thread::Builder::new()
                    .name(format!("bildwerk-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        let mut state = init();
                        while let Some((seq, job)) = next_job(job_rx) {
                            let outcome =
                                catch_unwind(AssertUnwindSafe(|| work(&mut state, job)));
                            if outcome.is_err() {
                                error!(worker, seq, "Worker panicked, job lost");
                            }
                            if result_tx.send((seq, outcome.ok())).is_err() {
                                break;
                            }
                        }
                    })?;
            }
            drop(result_tx);

            let window_ref = &window;
            std::thread::Builder::new()
                .name("bildwerk-producer".into())
                .spawn_scoped(scope, move || {
                    for (seq, job) in jobs.into_iter().enumerate() {
                        if !window_ref.admit(seq) || job_tx.send((seq, job)).is_err() {
                            warn!(seq, "Producer stopped early");
                            break;
                        }
                    }
                })?;

            let lost = reorder(total, &result_rx, &window, &mut consume);
            window.close();
            Ok(lost)
        })
    }
}

fn next_job<J>(jobs: &Mutex<Receiver<(usize, J)>>) -> Option<(usize, J)> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner).recv().ok()
}

/// Deliver results in sequence order; returns the sequence numbers that never
/// produced a result.
fn reorder<R, C>(
    total: usize,
    results: &Receiver<(usize, Option<R>)>,
    window: &ReorderWindow,
    consume: &mut C,
) -> Vec<usize>
where
    C: FnMut(usize, R),
{
    let mut pending: BTreeMap<usize, Option<R>> = BTreeMap::new();
    let mut lost = Vec::new();
    let mut next = 0;

    for (seq, result) in results.iter() {
        pending.insert(seq, result);
        while let Some(result) = pending.remove(&next) {
            match result {
                Some(result) => consume(next, result),
                None => lost.push(next),
            }
            next += 1;
            window.advance(next);
        }
    }

    // The stream closed; whatever is still buffered sits behind a gap.
    if !pending.is_empty() || next < total {
        warn!(
            next,
            buffered = pending.len(),
            total,
            "Result stream closed with gaps"
        );
    }
    for (seq, result) in pending {
        lost.extend(next..seq);
        match result {
            Some(result) => consume(seq, result),
            None => lost.push(seq),
        }
        next = seq + 1;
    }
    lost.extend(next..total);

    debug!(delivered = total - lost.len(), lost = lost.len(), "Reorder complete");
    lost
}

/// Bounds how far the producer may run ahead of the consumer.
struct ReorderWindow {
    size: usize,
    state: Mutex<WindowState>,
    moved: Condvar,
}

struct WindowState {
    /// Next sequence number the consumer expects.
    next: usize,
    closed: bool,
}

impl ReorderWindow {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(WindowState {
                next: 0,
                closed: false,
            }),
            moved: Condvar::new(),
        }
    }

    /// Block until `seq` fits in the window. `false` once the window closed.
    fn admit(&self, seq: usize) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.closed && seq >= state.next + self.size {
            state = self.moved.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        !state.closed
    }

    fn advance(&self, next: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next = next;
        self.moved.notify_all();
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        self.moved.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn results_arrive_in_job_order_despite_timing() {
        let jobs: Vec<u64> = (0..40).collect();
        let mut seen = Vec::new();
        let lost = OrderedPipeline::new(4, 3)
            .run(
                jobs,
                || (),
                |_, job| {
                    // Early jobs are the slowest.
                    std::thread::sleep(Duration::from_millis((40 - job) % 7));
                    job * 10
                },
                |seq, value| seen.push((seq, value)),
            )
            .unwrap();

        assert!(lost.is_empty());
        let expected: Vec<(usize, u64)> = (0..40).map(|i| (i as usize, i * 10)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn worker_state_is_built_once_per_worker() {
        let inits = AtomicUsize::new(0);
        let mut count = 0;
        OrderedPipeline::new(3, 2)
            .run(
                (0..30).collect::<Vec<_>>(),
                || inits.fetch_add(1, Ordering::SeqCst),
                |_, job: i32| job,
                |_, _| count += 1,
            )
            .unwrap();
        assert_eq!(count, 30);
        assert!(inits.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn panicking_job_is_reported_and_run_continues() {
        let mut seen = Vec::new();
        let lost = OrderedPipeline::new(2, 2)
            .run(
                (0..6).collect::<Vec<_>>(),
                || (),
                |_, job: usize| {
                    if job == 2 {
                        panic!("simulated worker failure");
                    }
                    job
                },
                |_, value| seen.push(value),
            )
            .unwrap();
        assert_eq!(lost, vec![2]);
        assert_eq!(seen, vec![0, 1, 3, 4, 5]);
    }

    #[test]
    fn empty_job_list_is_a_no_op() {
        let lost = OrderedPipeline::new(4, 4)
            .run(Vec::<u8>::new(), || (), |_, job| job, |_, _| unreachable!())
            .unwrap();
        assert!(lost.is_empty());
    }

    #[test]
    fn single_worker_window_of_one() {
        let mut seen = Vec::new();
        OrderedPipeline::new(0, 0)
            .run(vec!['a', 'b', 'c'], || (), |_, c| c, |_, c| seen.push(c))
            .unwrap();
        assert_eq!(seen, vec!['a', 'b', 'c']);
    }

    #[test]
    fn gaps_are_filled_from_buffered_results() {
        let (tx, rx) = sync_channel(8);
        tx.send((1, Some("b"))).unwrap();
        tx.send((3, Some("d"))).unwrap();
        tx.send((0, Some("a"))).unwrap();
        drop(tx);

        let window = ReorderWindow::new(8);
        let mut seen = Vec::new();
        let lost = reorder(5, &rx, &window, &mut |seq, v| seen.push((seq, v)));
        assert_eq!(seen, vec![(0, "a"), (1, "b"), (3, "d")]);
        assert_eq!(lost, vec![2, 4]);
    }
}
