// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The fluent parallel stream API.

use crate::collectors::Collector;
use crate::core::{
    downcast, tournament_fold, worker_job, Combinator, CompiledOp, CpuPinningPolicy,
    OrderedElements, Partitions, SourceElement, Stage, StreamPool, WorkerCount,
};
use crate::error::EmptyReduction;
use crate::sequential::SequentialStream;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::Arc;

/// Configuration of a [`Stream`]'s worker pool.
///
/// ```
/// # use parastream::{CpuPinningPolicy, StreamConfig, WorkerCount};
/// # use std::num::NonZeroUsize;
/// let config = StreamConfig {
///     worker_count: WorkerCount::try_from(2).unwrap(),
///     chunk_size: NonZeroUsize::new(8).unwrap(),
///     cpu_pinning: CpuPinningPolicy::No,
/// };
/// ```
#[derive(Clone, Copy)]
pub struct StreamConfig {
    /// Number of worker threads to spawn per terminal operation. Defaults to
    /// the host's available parallelism.
    pub worker_count: WorkerCount,
    /// Number of consecutive elements dispatched to a worker as one unit.
    /// Defaults to 1.
    pub chunk_size: NonZeroUsize,
    /// Policy to pin worker threads to CPUs. Defaults to no pinning.
    pub cpu_pinning: CpuPinningPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            worker_count: WorkerCount::default(),
            chunk_size: NonZeroUsize::MIN,
            cpu_pinning: CpuPinningPolicy::default(),
        }
    }
}

/// A fluent, lazily-composed pipeline over a sequence of elements, executed
/// on a pool of worker threads.
///
/// Intermediate operations ([`map()`](Self::map), [`filter()`](Self::filter),
/// [`peek()`](Self::peek)) only append a stage to the pipeline and never
/// execute anything. A terminal operation compiles the stage chain into a
/// single per-element operation, opens a worker pool sized by the stream's
/// configuration, streams the source through it in chunks while preserving
/// the input order, and tears the pool down when it completes or fails. Pools
/// are never reused across terminal operations.
///
/// Everything handed to the pool (elements, transforms, predicates,
/// combinators) must be `Send + 'static`: workers only ever communicate with
/// the calling thread through submitted tasks and returned values.
///
/// ```
/// use parastream::Stream;
///
/// let doubled_evens = Stream::new(0..10u32)
///     .filter(|x| x % 2 == 0)
///     .map(|x| x * 2)
///     .iterator()
///     .collect::<Vec<_>>();
/// assert_eq!(doubled_evens, [0, 4, 8, 12, 16]);
/// ```
pub struct Stream<T> {
    /// Concatenated source sequence; every element records the stage index at
    /// which it enters the pipeline.
    source: Box<dyn Iterator<Item = SourceElement>>,
    /// Append-only stage chain; insertion order is application order.
    stages: Vec<Stage>,
    /// Worker count, resolved at construction.
    worker_count: NonZeroUsize,
    /// Number of elements per dispatched chunk.
    chunk_size: NonZeroUsize,
    /// CPU pinning policy for the worker pool.
    cpu_pinning: CpuPinningPolicy,
    /// Element type produced by the current stage chain.
    _element: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Stream<T> {
    /// Creates a stream over the given source with the default
    /// [`StreamConfig`].
    pub fn new<I>(source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self::with_config(StreamConfig::default(), source)
    }

    /// Creates a stream over the given source with an explicit configuration.
    ///
    /// The default worker count is resolved here, once, from the host's
    /// available parallelism; it is not re-queried later.
    pub fn with_config<I>(config: StreamConfig, source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self {
            source: Box::new(
                source
                    .into_iter()
                    .map(|element| SourceElement::new(Box::new(element))),
            ),
            stages: Vec::new(),
            worker_count: config.worker_count.resolve(),
            chunk_size: config.chunk_size,
            cpu_pinning: config.cpu_pinning,
            _element: PhantomData,
        }
    }

    /// Creates a stream over the concatenation of several sources, in order,
    /// with the default [`StreamConfig`].
    ///
    /// ```
    /// # use parastream::{collectors::to_vec, Stream};
    /// let elements = Stream::concat([vec![1, 2], vec![], vec![3]]).collect(to_vec());
    /// assert_eq!(elements, [1, 2, 3]);
    /// ```
    pub fn concat<S, I>(sources: I) -> Self
    where
        S: IntoIterator<Item = T> + 'static,
        S::IntoIter: 'static,
        I: IntoIterator<Item = S>,
        I::IntoIter: 'static,
    {
        Self::concat_with_config(StreamConfig::default(), sources)
    }

    /// Creates a stream over the concatenation of several sources, in order,
    /// with an explicit configuration.
    ///
    /// ```
    /// # use parastream::{collectors::to_vec, Stream, StreamConfig, WorkerCount};
    /// let mut config = StreamConfig::default();
    /// config.worker_count = WorkerCount::try_from(2).unwrap();
    /// let elements = Stream::concat_with_config(config, [0..3u32, 10..12]).collect(to_vec());
    /// assert_eq!(elements, [0, 1, 2, 10, 11]);
    /// ```
    pub fn concat_with_config<S, I>(config: StreamConfig, sources: I) -> Self
    where
        S: IntoIterator<Item = T> + 'static,
        S::IntoIter: 'static,
        I: IntoIterator<Item = S>,
        I::IntoIter: 'static,
    {
        Self::with_config(config, sources.into_iter().flat_map(S::into_iter))
    }

    /// Appends another source after the current one. This is an intermediate
    /// operation.
    ///
    /// Elements of the chained source enter the pipeline after the stages
    /// appended so far; stages appended later apply to every source alike.
    ///
    /// ```
    /// # use parastream::{collectors::to_vec, Stream};
    /// let elements = Stream::new(0..3u32).map(|x| x * 10).chain(100..102).collect(to_vec());
    /// assert_eq!(elements, [0, 10, 20, 100, 101]);
    /// ```
    pub fn chain<I>(mut self, source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let first_stage = self.stages.len();
        self.source = Box::new(self.source.chain(source.into_iter().map(move |element| {
            SourceElement {
                value: Box::new(element),
                first_stage,
            }
        })));
        self
    }

    /// Appends a transform stage. This is an intermediate operation: nothing
    /// executes until a terminal operation is called.
    pub fn map<U: Send + 'static>(
        mut self,
        transform: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Stream<U> {
        self.stages.push(Stage::map(transform));
        Stream {
            source: self.source,
            stages: self.stages,
            worker_count: self.worker_count,
            chunk_size: self.chunk_size,
            cpu_pinning: self.cpu_pinning,
            _element: PhantomData,
        }
    }

    /// Appends a filter stage keeping only the elements matching the
    /// predicate. This is an intermediate operation.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.stages.push(Stage::filter(predicate));
        self
    }

    /// Appends a stage that invokes the action on each element and passes the
    /// element through unchanged. This is an intermediate operation.
    ///
    /// The action runs on whichever worker processes the element, never on
    /// the calling thread.
    pub fn peek(self, action: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.map(move |element| {
            action(&element);
            element
        })
    }

    /// Compiles the stage chain, opens the worker pool and starts the ordered
    /// dispatch.
    fn dispatch(self, combinator: Option<Combinator>) -> OrderedElements {
        let op = CompiledOp::new(self.stages);
        let pool = Rc::new(StreamPool::new(
            self.worker_count,
            self.cpu_pinning,
            worker_job(op, combinator),
        ));
        OrderedElements::new(pool, self.source, self.chunk_size)
    }

    /// Runs the pipeline, returning a lazy iterator over the resulting
    /// elements in source order. This is a terminal operation.
    ///
    /// The worker pool lives inside the returned iterator and is torn down
    /// when the iterator is dropped, so an unbounded source can be consumed
    /// incrementally:
    ///
    /// ```
    /// # use parastream::Stream;
    /// let first = Stream::new(0u64..).map(|x| x * x).iterator().take(4).collect::<Vec<_>>();
    /// assert_eq!(first, [0, 1, 4, 9]);
    /// ```
    pub fn iterator(self) -> StreamIter<T> {
        StreamIter {
            inner: self.dispatch(None),
            _element: PhantomData,
        }
    }

    /// Runs the pipeline, returning a lazy iterator over fixed-size,
    /// order-preserving buckets of the resulting elements. The final bucket
    /// may be shorter than `size`. This is a terminal operation.
    pub fn partition_iterator(self, size: NonZeroUsize) -> Partitions<StreamIter<T>> {
        Partitions::new(self.iterator(), size)
    }

    /// Reduces the stream to a single value by combining adjacent elements
    /// with the given associative combinator, in parallel on the same worker
    /// pool that runs the stages. This is a terminal operation.
    ///
    /// The combinator must be associative; it need not be commutative. The
    /// result for a non-associative combinator is unspecified. An empty
    /// stream (after filtering) fails with [`EmptyReduction`].
    ///
    /// ```
    /// # use parastream::Stream;
    /// let sum = Stream::new(1..=100u64).reduce(|a, b| a + b).unwrap();
    /// assert_eq!(sum, 5050);
    /// ```
    pub fn reduce(
        self,
        combinator: impl Fn(T, T) -> T + Send + Sync + 'static,
    ) -> Result<T, EmptyReduction> {
        let combine: Combinator = Arc::new(move |first, second| {
            Box::new(combinator(downcast::<T>(first), downcast::<T>(second)))
        });
        let elements = self.dispatch(Some(combine));
        let pool = elements.pool().clone();
        let value = tournament_fold(elements, &pool)?;
        Ok(downcast::<T>(value))
    }

    /// Drains the stream, invoking the action on each element. This is a
    /// terminal operation.
    ///
    /// Like [`peek()`](Self::peek), the action runs on the workers.
    pub fn for_each(self, action: impl Fn(T) + Send + Sync + 'static) {
        for _ in self.map(move |element| action(element)).iterator() {}
    }

    /// Hands the ordered element sequence over to a [`SequentialStream`] for
    /// further single-threaded chaining. This is a terminal operation: all
    /// stages appended so far still run on the worker pool.
    pub fn sequential(self) -> SequentialStream<T> {
        SequentialStream::new(self.iterator())
    }

    /// Runs the pipeline and aggregates the ordered element sequence with the
    /// given collector. This is a terminal operation.
    ///
    /// ```
    /// # use parastream::{collectors::to_vec, Stream};
    /// let cubes = Stream::new(1..=4u64).map(|x| x * x * x).collect(to_vec());
    /// assert_eq!(cubes, [1, 8, 27, 64]);
    /// ```
    pub fn collect<C: Collector<T>>(self, collector: C) -> C::Output {
        collector.collect(self.iterator())
    }
}

impl<T: Ord + Send + 'static> Stream<T> {
    /// Returns the greatest element of the stream by its natural order, or
    /// [`EmptyReduction`] if the stream is empty. This is a terminal
    /// operation.
    ///
    /// ```
    /// # use parastream::Stream;
    /// assert_eq!(Stream::new([3, 1, 4, 1, 5]).max(), Ok(5));
    /// ```
    pub fn max(self) -> Result<T, EmptyReduction> {
        self.reduce(std::cmp::max)
    }

    /// Returns the smallest element of the stream by its natural order, or
    /// [`EmptyReduction`] if the stream is empty. This is a terminal
    /// operation.
    ///
    /// ```
    /// # use parastream::Stream;
    /// assert_eq!(Stream::new([3, 1, 4, 1, 5]).min(), Ok(1));
    /// ```
    pub fn min(self) -> Result<T, EmptyReduction> {
        self.reduce(std::cmp::min)
    }
}

/// Lazy iterator over a stream's resulting elements, in source order.
///
/// Returned by [`Stream::iterator()`]; owns the worker pool for the duration
/// of the iteration.
pub struct StreamIter<T> {
    /// Ordered, filtered dispatch output.
    inner: OrderedElements,
    /// Element type produced by the stream's stage chain.
    _element: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Iterator for StreamIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next().map(downcast::<T>)
    }
}
