// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Iterator utilities shared by the stream types.

use std::num::NonZeroUsize;

/// Iterator over fixed-size, non-overlapping, order-preserving buckets of an
/// underlying iterator.
///
/// The final bucket may be shorter than the configured size if the source
/// length is not a multiple of it. Returned by
/// [`Stream::partition_iterator()`](crate::Stream::partition_iterator) and
/// [`SequentialStream::partition_iterator()`](crate::SequentialStream::partition_iterator).
pub struct Partitions<I: Iterator> {
    /// Underlying element iterator.
    inner: I,
    /// Bucket size.
    size: usize,
}

impl<I: Iterator> Partitions<I> {
    /// Wraps the given iterator into buckets of `size` elements.
    pub(crate) fn new(inner: I, size: NonZeroUsize) -> Self {
        Self {
            inner,
            size: size.get(),
        }
    }
}

impl<I: Iterator> Iterator for Partitions<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Vec<I::Item>> {
        let bucket: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if bucket.is_empty() {
            None
        } else {
            Some(bucket)
        }
    }
}
