//! Parallel execution of a [`PartitionPlan`].
//!
//! The table buffer is split into disjoint [`PartitionView`]s up front, then
//! handed out to a bounded set of scoped worker threads. Worker `w` of `W`
//! owns partitions `w, w + W, w + 2W, ...` and runs them in order. Because
//! every view is an exclusive borrow of its own cells, no lock is taken on the
//! table and the compiler rejects any overlap.
//!
//! All workers are joined before the elapsed time is taken. A panicking
//! partition, or a cancelled token, turns the whole fill into an error.

use crate::{Error, PartitionPlan, PartitionView, Result, Table};
use core::{any::Any, num::NonZeroUsize, time::Duration};
use std::{
    panic::{self, AssertUnwindSafe},
    thread,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

/// Runs the marker fill for every partition of `plan` on `table`.
///
/// Returns the wall-clock time from just before the buffer is split until the
/// last worker has been joined.
///
/// # Errors
///
/// - [`Error::WorkerFailure`] if any partition task panicked.
/// - [`Error::Cancelled`] if `cancel` fired before every partition started.
///
/// On either error `table` is left partially written: partitions that ran
/// hold their markers, the rest keep their previous contents.
pub fn fill_parallel(
    table: &mut Table,
    plan: &PartitionPlan,
    max_workers: NonZeroUsize,
    cancel: &CancellationToken,
) -> Result<Duration> {
    dispatch(table, plan, max_workers, cancel, |view| view.fill())
}

/// Outcome of one worker thread.
enum Outcome {
    Done,
    Cancelled,
    Failed { partition: usize, reason: String },
}

/// Generic form of [`fill_parallel`] with the per-partition work injected.
pub(crate) fn dispatch<F>(
    table: &mut Table,
    plan: &PartitionPlan,
    max_workers: NonZeroUsize,
    cancel: &CancellationToken,
    work: F,
) -> Result<Duration>
where
    F: Fn(&mut PartitionView<'_>) + Sync,
{
    let start = Instant::now();

    let views = table.split_partitions(plan);
    if views.is_empty() {
        return if cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(start.elapsed())
        };
    }

    let workers = max_workers.get().min(views.len());
    let mut queues: Vec<Vec<PartitionView<'_>>> = (0..workers)
        .map(|_| Vec::with_capacity(views.len().div_ceil(workers)))
        .collect();
    for view in views {
        let slot = view.index() % workers;
        queues[slot].push(view);
    }

    // A failing worker cancels this child so its siblings stop picking up new
    // partitions. The caller's token is never cancelled from here.
    let abort = cancel.child_token();
    let work = &work;
    let abort_ref = &abort;

    let outcomes: Vec<Outcome> = thread::scope(|s| {
        let handles: Vec<_> = queues
            .into_iter()
            .map(|queue| {
                let first = queue.first().map_or(0, PartitionView::index);
                let handle = s.spawn(move || run_queue(queue, work, abort_ref));
                (first, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(first, handle)| {
                handle.join().unwrap_or_else(|payload| Outcome::Failed {
                    partition: first,
                    reason: panic_message(payload.as_ref()),
                })
            })
            .collect()
    });

    let elapsed = start.elapsed();
    merge_outcomes(outcomes)?;
    Ok(elapsed)
}

fn run_queue<F>(queue: Vec<PartitionView<'_>>, work: &F, abort: &CancellationToken) -> Outcome
where
    F: Fn(&mut PartitionView<'_>),
{
    for mut view in queue {
        if abort.is_cancelled() {
            return Outcome::Cancelled;
        }
        let partition = view.index();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| work(&mut view))) {
            abort.cancel();
            return Outcome::Failed {
                partition,
                reason: panic_message(payload.as_ref()),
            };
        }
    }
    Outcome::Done
}

/// Failures win over cancellation; among failures the lowest partition wins.
fn merge_outcomes(outcomes: Vec<Outcome>) -> Result<()> {
    let mut cancelled = false;
    let mut failure: Option<(usize, String)> = None;

    for outcome in outcomes {
        match outcome {
            Outcome::Done => {}
            Outcome::Cancelled => cancelled = true,
            Outcome::Failed { partition, reason } => {
                if failure.as_ref().is_none_or(|(p, _)| partition < *p) {
                    failure = Some((partition, reason));
                }
            }
        }
    }

    match (failure, cancelled) {
        (Some((partition, reason)), _) => Err(Error::WorkerFailure { partition, reason }),
        (None, true) => Err(Error::Cancelled),
        (None, false) => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn filled(rows: usize, cols: usize, threads: usize, max_workers: usize) -> Table {
        let mut table = Table::new(rows, cols);
        let plan = PartitionPlan::new(rows, cols, nz(threads));
        fill_parallel(&mut table, &plan, nz(max_workers), &CancellationToken::new()).unwrap();
        table
    }

    #[test]
    fn fills_every_cell_with_its_partition_marker() {
        let table = filled(6, 3, 3, 8);
        assert_eq!(
            table.to_nested(),
            vec![
                vec![1, 1, 1],
                vec![1, 1, 1],
                vec![2, 2, 2],
                vec![2, 2, 2],
                vec![3, 3, 3],
                vec![3, 3, 3],
            ]
        );
    }

    #[test]
    fn column_plans_fill_vertical_stripes() {
        let table = filled(2, 10, 5, 8);
        for row in table.rows_iter() {
            assert_eq!(row, &[1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
        }
    }

    #[test]
    fn worker_cap_does_not_change_layout() {
        for (rows, cols, threads) in [(7, 5, 7), (3, 11, 9), (16, 16, 5), (1, 40, 40)] {
            let reference = filled(rows, cols, threads, threads);
            for cap in 1..=threads {
                assert_eq!(
                    filled(rows, cols, threads, cap),
                    reference,
                    "{rows}x{cols}/{threads} with cap {cap}"
                );
            }
        }
    }

    #[test]
    fn worker_cap_bounds_thread_count() {
        let mut table = Table::new(64, 4);
        let plan = PartitionPlan::new(64, 4, nz(64));
        let threads = Mutex::new(HashSet::new());

        dispatch(
            &mut table,
            &plan,
            nz(3),
            &CancellationToken::new(),
            |view| {
                threads.lock().unwrap().insert(thread::current().id());
                view.fill();
            },
        )
        .unwrap();

        let distinct = threads.lock().unwrap().len();
        assert!(distinct <= 3, "{distinct} threads used with a cap of 3");
        assert!(table.as_slice().iter().all(|&c| c != 0));
    }

    #[test]
    fn empty_plan_spawns_nothing() {
        let mut table = Table::new(0, 9);
        let plan = PartitionPlan::new(0, 9, nz(4));
        let calls = AtomicUsize::new(0);

        dispatch(&mut table, &plan, nz(4), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn cancelled_token_stops_the_fill() {
        let mut table = Table::new(4, 4);
        let plan = PartitionPlan::new(4, 4, nz(4));
        let token = CancellationToken::new();
        token.cancel();

        let err = fill_parallel(&mut table, &plan, nz(4), &token).unwrap_err();
        assert_eq!(err, Error::Cancelled);
        assert!(table.as_slice().iter().all(|&c| c == 0));
    }

    #[test]
    fn cancel_mid_fill_leaves_later_partitions_untouched() {
        let mut table = Table::new(8, 2);
        let plan = PartitionPlan::new(8, 2, nz(8));
        let token = CancellationToken::new();

        // One worker runs partitions in order; it cancels after the third.
        let err = dispatch(&mut table, &plan, nz(1), &token, |view| {
            view.fill();
            if view.index() == 2 {
                token.cancel();
            }
        })
        .unwrap_err();

        assert_eq!(err, Error::Cancelled);
        let firsts: Vec<_> = table.rows_iter().map(|r| r[0]).collect();
        assert_eq!(firsts, vec![1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn panicking_partition_is_reported() {
        let mut table = Table::new(5, 5);
        let plan = PartitionPlan::new(5, 5, nz(5));

        let err = dispatch(&mut table, &plan, nz(5), &CancellationToken::new(), |view| {
            if view.index() == 3 {
                panic!("boom in partition 3");
            }
            view.fill();
        })
        .unwrap_err();

        assert_eq!(
            err,
            Error::WorkerFailure {
                partition: 3,
                reason: "boom in partition 3".to_string(),
            }
        );
    }

    #[test]
    fn lowest_failing_partition_wins() {
        let mut table = Table::new(6, 1);
        let plan = PartitionPlan::new(6, 1, nz(6));

        let err = dispatch(&mut table, &plan, nz(6), &CancellationToken::new(), |view| {
            if view.index() % 2 == 1 {
                panic!("odd partition {}", view.index());
            }
            view.fill();
        })
        .unwrap_err();

        match err {
            Error::WorkerFailure { partition, reason } => {
                assert_eq!(partition, 1);
                assert_eq!(reason, "odd partition 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failure_does_not_cancel_callers_token() {
        let mut table = Table::new(2, 2);
        let plan = PartitionPlan::new(2, 2, nz(2));
        let token = CancellationToken::new();

        let _ = dispatch(&mut table, &plan, nz(2), &token, |_| panic!("nope"));
        assert!(!token.is_cancelled());
    }
}
