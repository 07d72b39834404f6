// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Collectors aggregating a finished element sequence into a final value.

use std::collections::HashMap;
use std::hash::Hash;

/// An aggregation of an ordered element sequence into a final container or
/// value, used by [`Stream::collect()`](crate::Stream::collect) and
/// [`SequentialStream::collect()`](crate::SequentialStream::collect).
pub trait Collector<T> {
    /// The aggregated result type.
    type Output;

    /// Consumes the ordered element sequence and produces the result.
    fn collect<I: Iterator<Item = T>>(self, elements: I) -> Self::Output;
}

/// Collector gathering all elements into a [`Vec`], in order. Built by
/// [`to_vec()`].
pub struct ToVec;

/// Collects the stream into a [`Vec`], preserving the element order.
///
/// ```
/// # use parastream::{collectors::to_vec, Stream};
/// let elements = Stream::new(0..4u32).collect(to_vec());
/// assert_eq!(elements, [0, 1, 2, 3]);
/// ```
pub fn to_vec() -> ToVec {
    ToVec
}

impl<T> Collector<T> for ToVec {
    type Output = Vec<T>;

    fn collect<I: Iterator<Item = T>>(self, elements: I) -> Vec<T> {
        elements.collect()
    }
}

/// Collector grouping elements by a key. Built by [`grouping_by()`].
pub struct GroupingBy<F> {
    /// Key extraction function.
    key: F,
}

/// Collects the stream into a map from key to the elements sharing that key,
/// preserving the element order within each group.
///
/// ```
/// # use parastream::{collectors::grouping_by, Stream};
/// let by_parity = Stream::new(0..6u32).collect(grouping_by(|x| x % 2));
/// assert_eq!(by_parity[&0], [0, 2, 4]);
/// assert_eq!(by_parity[&1], [1, 3, 5]);
/// ```
pub fn grouping_by<T, K, F>(key: F) -> GroupingBy<F>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    GroupingBy { key }
}

impl<T, K, F> Collector<T> for GroupingBy<F>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    type Output = HashMap<K, Vec<T>>;

    fn collect<I: Iterator<Item = T>>(self, elements: I) -> HashMap<K, Vec<T>> {
        let mut groups: HashMap<K, Vec<T>> = HashMap::new();
        for element in elements {
            groups.entry((self.key)(&element)).or_default().push(element);
        }
        groups
    }
}
