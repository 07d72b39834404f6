// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Tournament reduction of an ordered element sequence on a worker pool.

use super::dispatch::{StreamPool, Task, TaskOutput};
use super::pipeline::AnyElement;
use crate::error::EmptyReduction;
use crate::macros::log_debug;

/// One entry of a fold round, either a dispatched pair or a singleton that
/// passes through unchanged.
enum Slot {
    /// Ticket of a pair sent to the pool.
    Pending(u64),
    /// Trailing unpaired element.
    Ready(AnyElement),
}

/// Reduces the given element sequence to a single value by pairwise rounds on
/// the pool.
///
/// Each round partitions the current sequence into adjacent pairs in order
/// (leaving a trailing singleton unpaired when the count is odd), combines
/// every pair on a worker, and keeps the round results in the same relative
/// order. The rounds are iterated over a resizable buffer, so arbitrarily
/// long inputs don't hit a recursion limit.
///
/// The combinator baked into the pool's job must be associative; it need not
/// be commutative. An empty input fails with [`EmptyReduction`].
pub(crate) fn tournament_fold(
    elements: impl Iterator<Item = AnyElement>,
    pool: &StreamPool,
) -> Result<AnyElement, EmptyReduction> {
    let mut current = fold_round(elements, pool);
    while current.len() > 1 {
        log_debug!("[main thread] Fold round over {} elements", current.len());
        current = fold_round(current.into_iter(), pool);
    }
    current.pop().ok_or(EmptyReduction)
}

/// Runs one round: dispatches adjacent pairs and collects the results in pair
/// order.
fn fold_round(
    mut elements: impl Iterator<Item = AnyElement>,
    pool: &StreamPool,
) -> Vec<AnyElement> {
    let mut slots = Vec::new();
    while let Some(first) = elements.next() {
        match elements.next() {
            Some(second) => {
                slots.push(Slot::Pending(pool.submit(Task::Combine(first, second))));
            }
            // A singleton is carried into the next round without invoking the
            // combinator.
            None => slots.push(Slot::Ready(first)),
        }
    }
    slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Pending(ticket) => match pool.recv(ticket) {
                TaskOutput::Combined(value) => value,
                TaskOutput::Chunk(_) => unreachable!("combine ticket yielded a chunk result"),
            },
            Slot::Ready(value) => value,
        })
        .collect()
}
