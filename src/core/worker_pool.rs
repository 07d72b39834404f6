// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A fixed-size pool of worker threads fed through message passing.

use crate::macros::{log_debug, log_error, log_warn};
use crossbeam_channel::{unbounded, Receiver, Sender};
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Number of worker threads to spawn in a worker pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WorkerCount {
    /// Spawn the number of workers returned by
    /// [`std::thread::available_parallelism()`].
    #[default]
    AvailableParallelism,
    /// Spawn the given number of workers.
    Count(NonZeroUsize),
}

impl TryFrom<usize> for WorkerCount {
    type Error = <NonZeroUsize as TryFrom<usize>>::Error;

    fn try_from(worker_count: usize) -> Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(worker_count)?;
        Ok(WorkerCount::Count(count))
    }
}

impl WorkerCount {
    /// Resolves this into a concrete worker count, querying the host's
    /// available parallelism if needed.
    pub(crate) fn resolve(self) -> NonZeroUsize {
        match self {
            WorkerCount::AvailableParallelism => std::thread::available_parallelism()
                .expect("Getting the available parallelism failed"),
            WorkerCount::Count(count) => count,
        }
    }
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy, Default)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    #[default]
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. If CPU pinning isn't supported on this
    /// platform (or not implemented), opening a worker pool will panic.
    Always,
}

/// A task tagged with its submission sequence number.
struct Task<I> {
    ticket: u64,
    input: I,
}

/// A task outcome, either the job's output or the payload of a panic raised
/// while evaluating it.
type TaskResult<O> = (u64, std::thread::Result<O>);

/// A fixed set of long-lived worker threads processing submitted tasks.
///
/// Every worker runs the same job function. Tasks are tagged with a
/// monotonically increasing ticket at submission; [`recv()`](Self::recv)
/// retrieves results by ticket, so a single consumer can read them back in
/// submission order regardless of which worker finished first.
///
/// The pool is scoped to one terminal operation: dropping it closes the task
/// channel and joins every worker, on normal completion and on unwind alike.
pub(crate) struct WorkerPool<I, O> {
    /// Handles to all the worker threads in the pool.
    workers: Vec<WorkerHandle>,
    /// Sending half of the task channel, dropped first to signal termination.
    task_sender: Option<Sender<Task<I>>>,
    /// Receiving half of the result channel.
    results: Receiver<TaskResult<O>>,
    /// Ticket to assign to the next submitted task.
    next_ticket: Cell<u64>,
    /// Results that arrived ahead of the ticket currently being awaited.
    stash: RefCell<HashMap<u64, O>>,
}

/// Handle to a worker thread in the pool.
struct WorkerHandle {
    /// Thread handle object.
    handle: JoinHandle<()>,
}

impl<I: Send + 'static, O: Send + 'static> WorkerPool<I, O> {
    /// Spawns a pool of `num_workers` threads, each executing submitted tasks
    /// with the given job function.
    pub(crate) fn new(
        num_workers: NonZeroUsize,
        cpu_pinning: CpuPinningPolicy,
        job: impl Fn(I) -> O + Send + Sync + 'static,
    ) -> Self {
        let job: Arc<dyn Fn(I) -> O + Send + Sync> = Arc::new(job);
        let (task_sender, task_receiver) = unbounded::<Task<I>>();
        let (result_sender, results) = unbounded::<TaskResult<O>>();

        #[cfg(any(
            miri,
            not(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux"
            ))
        ))]
        match cpu_pinning {
            CpuPinningPolicy::No => (),
            CpuPinningPolicy::IfSupported => {
                log_warn!("Pinning threads to CPUs is not implemented on this platform.")
            }
            CpuPinningPolicy::Always => {
                panic!("Pinning threads to CPUs is not implemented on this platform.")
            }
        }

        let workers = (0..num_workers.get())
            .map(|id| {
                let context = WorkerContext {
                    #[cfg(feature = "log")]
                    id,
                    tasks: task_receiver.clone(),
                    results: result_sender.clone(),
                    job: job.clone(),
                };
                WorkerHandle {
                    handle: std::thread::spawn(move || {
                        pin_worker_thread(id, cpu_pinning);
                        context.run()
                    }),
                }
            })
            .collect();
        log_debug!("[main thread] Spawned workers");

        Self {
            workers,
            task_sender: Some(task_sender),
            results,
            next_ticket: Cell::new(0),
            stash: RefCell::new(HashMap::new()),
        }
    }
}

impl<I, O> WorkerPool<I, O> {
    /// Returns the number of worker threads that have been spawned in this
    /// pool.
    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Submits a task to the pool, returning the ticket under which its
    /// result can be retrieved.
    ///
    /// Tickets are assigned in strictly increasing submission order.
    pub(crate) fn submit(&self, input: I) -> u64 {
        let ticket = self.next_ticket.get();
        self.next_ticket.set(ticket + 1);
        let sender = self
            .task_sender
            .as_ref()
            .expect("worker pool already shut down");
        if sender.send(Task { ticket, input }).is_err() {
            self.disconnected();
        }
        ticket
    }

    /// Blocks until the result of the task with the given ticket is available
    /// and returns it.
    ///
    /// Results arriving for other tickets in the meantime are stashed for
    /// later [`recv()`](Self::recv) calls. If any worker reports a panic from
    /// the job function, the panic payload is resumed on the calling thread
    /// unchanged; unwinding drops the pool, which joins the workers.
    pub(crate) fn recv(&self, ticket: u64) -> O {
        if let Some(output) = self.stash.borrow_mut().remove(&ticket) {
            return output;
        }
        loop {
            let (finished, result) = match self.results.recv() {
                Ok(entry) => entry,
                Err(_) => self.disconnected(),
            };
            let output = match result {
                Ok(output) => output,
                Err(payload) => resume_unwind(payload),
            };
            if finished == ticket {
                return output;
            }
            self.stash.borrow_mut().insert(finished, output);
        }
    }

    /// Handles an unexpectedly disconnected channel: every worker has exited.
    ///
    /// Surfaces the first reported failure if there is one.
    fn disconnected(&self) -> ! {
        while let Ok((_ticket, result)) = self.results.try_recv() {
            if let Err(payload) = result {
                resume_unwind(payload);
            }
        }
        panic!("A worker thread disconnected unexpectedly");
    }
}

impl<I, O> Drop for WorkerPool<I, O> {
    /// Joins all the workers in the pool.
    #[allow(clippy::unused_enumerate_index)]
    fn drop(&mut self) {
        log_debug!("[main thread] Notifying workers to finish...");
        drop(self.task_sender.take());

        log_debug!("[main thread] Joining workers in the pool...");
        for (_i, worker) in self.workers.drain(..).enumerate() {
            let result = worker.handle.join();
            match result {
                Ok(_) => log_debug!("[main thread] Worker {_i} joined with result: {result:?}"),
                Err(_) => log_error!("[main thread] Worker {_i} joined with result: {result:?}"),
            }
        }
        log_debug!("[main thread] Joined workers.");
    }
}

/// Context object owned by a worker thread.
struct WorkerContext<I, O> {
    /// Worker index.
    #[cfg(feature = "log")]
    id: usize,
    /// Receiving half of the task channel, shared with the other workers.
    tasks: Receiver<Task<I>>,
    /// Sending half of the result channel.
    results: Sender<TaskResult<O>>,
    /// Job to run on each task.
    job: Arc<dyn Fn(I) -> O + Send + Sync>,
}

impl<I, O> WorkerContext<I, O> {
    /// Main loop run by this worker: process tasks until the channel closes
    /// or a task panics.
    fn run(&self) {
        while let Ok(task) = self.tasks.recv() {
            log_debug!("[worker {}] Processing task #{}", self.id, task.ticket);
            let result = catch_unwind(AssertUnwindSafe(|| (self.job)(task.input)));
            let panicked = result.is_err();
            if self.results.send((task.ticket, result)).is_err() {
                // The terminal operation is gone; nobody is left to report to.
                break;
            }
            if panicked {
                log_error!("[worker {}] Task #{} panicked", self.id, task.ticket);
                break;
            }
        }
        log_debug!("[worker {}] Exiting", self.id);
    }
}

/// Pins the calling worker thread to the CPU of the given index, according to
/// the policy.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn pin_worker_thread(id: usize, cpu_pinning: CpuPinningPolicy) {
    match cpu_pinning {
        CpuPinningPolicy::No => (),
        CpuPinningPolicy::IfSupported => {
            let mut cpu_set = CpuSet::new();
            if let Err(_e) = cpu_set.set(id) {
                log_warn!("Failed to set CPU affinity for worker #{id}: {_e}");
            } else if let Err(_e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
                log_warn!("Failed to set CPU affinity for worker #{id}: {_e}");
            } else {
                log_debug!("Pinned worker #{id} to CPU #{id}");
            }
        }
        CpuPinningPolicy::Always => {
            let mut cpu_set = CpuSet::new();
            if let Err(e) = cpu_set.set(id) {
                panic!("Failed to set CPU affinity for worker #{id}: {e}");
            } else if let Err(e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
                panic!("Failed to set CPU affinity for worker #{id}: {e}");
            } else {
                log_debug!("Pinned worker #{id} to CPU #{id}");
            }
        }
    }
}

/// Pinning is a no-op on platforms without `sched_setaffinity()`.
#[cfg(any(
    miri,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    ))
))]
fn pin_worker_thread(_id: usize, _cpu_pinning: CpuPinningPolicy) {}

#[cfg(test)]
mod test {
    use super::*;

    fn pool_of(num_workers: usize) -> WorkerPool<u64, u64> {
        WorkerPool::new(
            NonZeroUsize::new(num_workers).unwrap(),
            CpuPinningPolicy::No,
            |x| x * x,
        )
    }

    #[test]
    fn results_follow_submission_order() {
        let pool = pool_of(4);
        let tickets = (0..100u64).map(|x| pool.submit(x)).collect::<Vec<_>>();
        let outputs = tickets
            .into_iter()
            .map(|ticket| pool.recv(ticket))
            .collect::<Vec<_>>();
        assert_eq!(outputs, (0..100u64).map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn results_can_be_received_out_of_order() {
        let pool = pool_of(2);
        let first = pool.submit(3);
        let second = pool.submit(4);
        assert_eq!(pool.recv(second), 16);
        assert_eq!(pool.recv(first), 9);
    }

    #[test]
    fn tickets_increase_with_each_submission() {
        let pool = pool_of(1);
        let a = pool.submit(1);
        let b = pool.submit(2);
        assert!(b > a);
        pool.recv(a);
        pool.recv(b);
    }

    #[test]
    #[should_panic(expected = "arithmetic panic")]
    fn worker_panic_propagates_to_the_consumer() {
        let pool = WorkerPool::new(
            NonZeroUsize::new(4).unwrap(),
            CpuPinningPolicy::No,
            |x: u64| {
                if x == 13 {
                    panic!("arithmetic panic");
                }
                x
            },
        );
        let tickets = (0..20u64).map(|x| pool.submit(x)).collect::<Vec<_>>();
        for ticket in tickets {
            pool.recv(ticket);
        }
    }

    #[test]
    fn dropping_the_pool_joins_all_workers() {
        let pool = pool_of(8);
        assert_eq!(pool.num_workers(), 8);
        let ticket = pool.submit(5);
        assert_eq!(pool.recv(ticket), 25);
        // Workers with no more tasks must exit cleanly on drop.
    }

    #[test]
    fn worker_count_resolution() {
        assert_eq!(
            WorkerCount::try_from(3).unwrap().resolve(),
            NonZeroUsize::new(3).unwrap()
        );
        assert!(WorkerCount::try_from(0).is_err());
        assert!(WorkerCount::AvailableParallelism.resolve().get() >= 1);
    }
}
