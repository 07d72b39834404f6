// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The single-threaded stream, for chaining after the parallel stage.

use crate::collectors::Collector;
use crate::core::Partitions;
use std::num::NonZeroUsize;

/// A single-threaded stream with the same fluent surface as [`Stream`],
/// executing every operation lazily on the calling thread.
///
/// [`Stream::sequential()`](crate::Stream::sequential) hands its ordered
/// output over to this type; it can also be built directly from any iterator.
/// Since nothing crosses a thread boundary, elements and closures don't need
/// to be [`Send`].
///
/// [`Stream`]: crate::Stream
///
/// ```
/// use parastream::SequentialStream;
///
/// let total = SequentialStream::new(1..=4u64).map(|x| x * 10).reduce(0, |acc, x| acc + x);
/// assert_eq!(total, 100);
/// ```
pub struct SequentialStream<T> {
    /// Underlying lazy element sequence.
    source: Box<dyn Iterator<Item = T>>,
}

impl<T: 'static> SequentialStream<T> {
    /// Creates a sequential stream over the given source.
    pub fn new<I>(source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self {
            source: Box::new(source.into_iter()),
        }
    }

    /// Appends another source after the current one. This is an intermediate
    /// operation.
    pub fn chain<I>(self, source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self {
            source: Box::new(self.source.chain(source)),
        }
    }

    /// Maps elements using the supplied transform. This is an intermediate
    /// operation.
    pub fn map<U: 'static>(self, transform: impl Fn(T) -> U + 'static) -> SequentialStream<U> {
        SequentialStream {
            source: Box::new(self.source.map(transform)),
        }
    }

    /// Keeps only the elements matching the predicate. This is an
    /// intermediate operation.
    pub fn filter(self, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            source: Box::new(self.source.filter(predicate)),
        }
    }

    /// Invokes the action on each element as it is consumed, passing the
    /// element through unchanged. This is an intermediate operation.
    pub fn peek(self, action: impl Fn(&T) + 'static) -> Self {
        self.map(move |element| {
            action(&element);
            element
        })
    }

    /// Limits the stream to at most `count` elements. This is an intermediate
    /// operation.
    pub fn limit(self, count: usize) -> Self {
        Self {
            source: Box::new(self.source.take(count)),
        }
    }

    /// Returns an iterator over the stream's elements. This is a terminal
    /// operation.
    pub fn iterator(self) -> Box<dyn Iterator<Item = T>> {
        self.source
    }

    /// Returns an iterator over fixed-size, order-preserving buckets of the
    /// stream; the final bucket may be shorter. This is a terminal operation.
    pub fn partition_iterator(self, size: NonZeroUsize) -> Partitions<Box<dyn Iterator<Item = T>>> {
        Partitions::new(self.source, size)
    }

    /// Left-folds the stream from the given initial accumulator. This is a
    /// terminal operation.
    pub fn reduce<A>(self, initial: A, mut accumulate: impl FnMut(A, T) -> A) -> A {
        let mut accumulator = initial;
        for element in self.source {
            accumulator = accumulate(accumulator, element);
        }
        accumulator
    }

    /// Invokes the action on each element. This is a terminal operation.
    pub fn for_each(self, action: impl FnMut(T)) {
        self.source.for_each(action);
    }

    /// Returns the number of elements. This is a terminal operation.
    pub fn count(self) -> usize {
        self.source.count()
    }

    /// Aggregates the stream with the given collector. This is a terminal
    /// operation.
    pub fn collect<C: Collector<T>>(self, collector: C) -> C::Output {
        collector.collect(self.source)
    }
}

impl<T> IntoIterator for SequentialStream<T> {
    type Item = T;
    type IntoIter = Box<dyn Iterator<Item = T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.source
    }
}
