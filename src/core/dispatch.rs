// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Order-preserving distribution of elements to the worker pool in fixed-size
//! chunks.

use super::pipeline::{AnyElement, CompiledOp, SourceElement, StageOutput};
use super::worker_pool::WorkerPool;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::Arc;

/// A unit of work submitted to the pool during one terminal operation.
pub(crate) enum Task {
    /// A contiguous run of source elements to push through the compiled
    /// pipeline operation, one by one.
    Chunk(Vec<SourceElement>),
    /// A pair of fold candidates to combine into one value.
    Combine(AnyElement, AnyElement),
}

/// The outcome of a [`Task`], mirroring its variants.
pub(crate) enum TaskOutput {
    /// Per-element outcomes of a chunk, in chunk order.
    Chunk(Vec<StageOutput>),
    /// The combined value of a pair.
    Combined(AnyElement),
}

/// A type-erased associative combinator for fold tasks.
pub(crate) type Combinator = Arc<dyn Fn(AnyElement, AnyElement) -> AnyElement + Send + Sync>;

/// The worker pool type shared by the dispatcher and the fold engine within
/// one terminal operation.
pub(crate) type StreamPool = WorkerPool<Task, TaskOutput>;

/// Builds the job function run by every worker of a terminal operation's
/// pool.
///
/// The combinator is only present for reducing terminals; other terminals
/// never submit [`Task::Combine`].
pub(crate) fn worker_job(
    op: CompiledOp,
    combinator: Option<Combinator>,
) -> impl Fn(Task) -> TaskOutput + Send + Sync + 'static {
    move |task| match task {
        Task::Chunk(elements) => {
            TaskOutput::Chunk(elements.into_iter().map(|element| op.apply(element)).collect())
        }
        Task::Combine(first, second) => match &combinator {
            Some(combine) => TaskOutput::Combined(combine(first, second)),
            None => unreachable!("combine task submitted to a pool without a combinator"),
        },
    }
}

/// Lazy iterator over the ordered element sequence produced by a worker pool.
///
/// The source is cut into consecutive chunks of the configured size and
/// submitted to the pool, keeping at most two chunks per worker in flight so
/// that unbounded sources are never materialized. Chunk results are consumed
/// strictly in submission order and filtered-out markers are dropped before
/// yielding, so the i-th yielded element corresponds positionally to the i-th
/// surviving input.
pub(crate) struct OrderedElements {
    /// Pool processing the chunks; shared with the fold engine for reducing
    /// terminals.
    pool: Rc<StreamPool>,
    /// Concatenated source sequence, type-erased.
    source: Box<dyn Iterator<Item = SourceElement>>,
    /// Number of elements per submitted chunk.
    chunk_size: usize,
    /// Maximum number of chunks in flight.
    window: usize,
    /// Tickets of submitted chunks, in submission order.
    in_flight: VecDeque<u64>,
    /// Elements of the chunk currently being yielded.
    ready: VecDeque<AnyElement>,
    /// Whether the source has run out of elements.
    exhausted: bool,
}

impl OrderedElements {
    /// Starts dispatching the given source on the pool.
    pub(crate) fn new(
        pool: Rc<StreamPool>,
        source: Box<dyn Iterator<Item = SourceElement>>,
        chunk_size: NonZeroUsize,
    ) -> Self {
        // Two in-flight chunks per worker.
        let window = pool.num_workers() * 2;
        Self {
            pool,
            source,
            chunk_size: chunk_size.get(),
            window,
            in_flight: VecDeque::new(),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Returns the pool this dispatcher submits to.
    pub(crate) fn pool(&self) -> &Rc<StreamPool> {
        &self.pool
    }

    /// Tops up the pool with chunks until the in-flight window is full or the
    /// source is exhausted.
    fn fill_window(&mut self) {
        while !self.exhausted && self.in_flight.len() < self.window {
            let chunk: Vec<SourceElement> = self.source.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                self.exhausted = true;
                return;
            }
            self.in_flight.push_back(self.pool.submit(Task::Chunk(chunk)));
        }
    }
}

impl Iterator for OrderedElements {
    type Item = AnyElement;

    fn next(&mut self) -> Option<AnyElement> {
        loop {
            if let Some(element) = self.ready.pop_front() {
                return Some(element);
            }
            self.fill_window();
            let ticket = self.in_flight.pop_front()?;
            match self.pool.recv(ticket) {
                TaskOutput::Chunk(outputs) => {
                    self.ready
                        .extend(outputs.into_iter().filter_map(|output| match output {
                            StageOutput::Value(value) => Some(value),
                            StageOutput::Filtered => None,
                        }));
                }
                TaskOutput::Combined(_) => {
                    unreachable!("chunk ticket yielded a combine result")
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::pipeline::{downcast, Stage};
    use crate::core::worker_pool::CpuPinningPolicy;

    fn dispatch(
        num_workers: usize,
        chunk_size: usize,
        stages: Vec<Stage>,
        source: impl Iterator<Item = i32> + 'static,
    ) -> Vec<i32> {
        let pool = Rc::new(StreamPool::new(
            NonZeroUsize::new(num_workers).unwrap(),
            CpuPinningPolicy::No,
            worker_job(CompiledOp::new(stages), None),
        ));
        let source = Box::new(source.map(|x| SourceElement::new(Box::new(x))));
        OrderedElements::new(pool, source, NonZeroUsize::new(chunk_size).unwrap())
            .map(downcast::<i32>)
            .collect()
    }

    #[test]
    fn output_order_equals_input_order() {
        let stages = vec![Stage::map(|x: i32| x * 2)];
        let expected = (0..500).map(|x| x * 2).collect::<Vec<_>>();
        assert_eq!(dispatch(4, 3, stages, 0..500), expected);
    }

    #[test]
    fn chunk_size_larger_than_input_is_fine() {
        assert_eq!(dispatch(2, 100, Vec::new(), 0..5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn filtered_markers_never_surface() {
        let stages = vec![Stage::filter(|x: &i32| x % 2 == 0)];
        assert_eq!(dispatch(3, 2, stages, 0..10), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert_eq!(dispatch(2, 1, Vec::new(), 0..0), Vec::<i32>::new());
    }

    #[test]
    fn unbounded_source_is_consumed_lazily() {
        let pool = Rc::new(StreamPool::new(
            NonZeroUsize::new(2).unwrap(),
            CpuPinningPolicy::No,
            worker_job(CompiledOp::new(vec![Stage::map(|x: i64| x + 1)]), None),
        ));
        let source = Box::new((0i64..).map(|x| SourceElement::new(Box::new(x))));
        let first = OrderedElements::new(pool, source, NonZeroUsize::new(4).unwrap())
            .map(downcast::<i64>)
            .take(10)
            .collect::<Vec<_>>();
        assert_eq!(first, (1..=10).collect::<Vec<_>>());
    }
}
