// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pipeline stages and their compilation into a single per-element operation.

use std::any::Any;
use std::sync::Arc;

/// A type-erased element flowing through the pipeline.
///
/// The typed [`Stream`](crate::Stream) facade guarantees that every boxed
/// value matches the element type expected by the next stage, so downcasts
/// inside the engine are infallible.
pub(crate) type AnyElement = Box<dyn Any + Send>;

/// Extracts the concrete value out of a type-erased element.
pub(crate) fn downcast<T: Any>(element: AnyElement) -> T {
    *element
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("type mismatch in pipeline element"))
}

/// One step of a pipeline: either an element transform or a filtering
/// predicate.
///
/// Stages are stored in an append-only sequence whose insertion order is the
/// application order.
pub(crate) enum Stage {
    /// Transforms an element into the next stage's element.
    Map(Box<dyn Fn(AnyElement) -> AnyElement + Send + Sync>),
    /// Decides whether an element continues down the pipeline.
    Filter(Box<dyn Fn(&dyn Any) -> bool + Send + Sync>),
}

impl Stage {
    /// Wraps a typed transform into a type-erased [`Stage::Map`].
    pub(crate) fn map<T, U>(transform: impl Fn(T) -> U + Send + Sync + 'static) -> Self
    where
        T: Any + Send,
        U: Any + Send,
    {
        Stage::Map(Box::new(move |element| {
            Box::new(transform(downcast::<T>(element)))
        }))
    }

    /// Wraps a typed predicate into a type-erased [`Stage::Filter`].
    pub(crate) fn filter<T: Any>(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Stage::Filter(Box::new(move |element| {
            let value = element
                .downcast_ref::<T>()
                .expect("type mismatch in pipeline element");
            predicate(value)
        }))
    }
}

/// A source element on its way into the pipeline, tagged with the stage index
/// at which it enters.
///
/// Elements of a chained source skip the stages appended before the chain
/// point; everything appended afterwards applies to all sources alike.
pub(crate) struct SourceElement {
    /// The type-erased element value.
    pub(crate) value: AnyElement,
    /// Index of the first stage to apply to this element.
    pub(crate) first_stage: usize,
}

impl SourceElement {
    /// Tags an element entering at the head of the pipeline.
    pub(crate) fn new(value: AnyElement) -> Self {
        Self {
            value,
            first_stage: 0,
        }
    }
}

/// Outcome of applying a [`CompiledOp`] to one element.
///
/// `Filtered` is a dedicated marker distinct from any legitimate element
/// value: an element that is itself a `None` of some `Option` type still
/// travels as a `Value`.
pub(crate) enum StageOutput {
    /// The element survived all stages, transformed.
    Value(AnyElement),
    /// Some filter stage rejected the element.
    Filtered,
}

/// An entire stage chain fused into a single per-element operation.
///
/// The chain is behind an [`Arc`] so that every worker shares it. Stages are
/// compiled fresh at each terminal operation.
#[derive(Clone)]
pub(crate) struct CompiledOp {
    stages: Arc<[Stage]>,
}

impl CompiledOp {
    /// Freezes the given stage sequence.
    pub(crate) fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Runs the stages left to right on one element, starting at the stage
    /// index the element entered at.
    ///
    /// The moment any filter predicate evaluates to false, the remaining
    /// stages are skipped and the element yields [`StageOutput::Filtered`].
    pub(crate) fn apply(&self, element: SourceElement) -> StageOutput {
        let mut value = element.value;
        for stage in self.stages.iter().skip(element.first_stage) {
            match stage {
                Stage::Map(transform) => value = transform(value),
                Stage::Filter(predicate) => {
                    if !predicate(value.as_ref()) {
                        return StageOutput::Filtered;
                    }
                }
            }
        }
        StageOutput::Value(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn apply_to(op: &CompiledOp, x: i32) -> StageOutput {
        op.apply(SourceElement::new(Box::new(x)))
    }

    #[test]
    fn empty_chain_is_identity() {
        let op = CompiledOp::new(Vec::new());
        match apply_to(&op, 42) {
            StageOutput::Value(value) => assert_eq!(downcast::<i32>(value), 42),
            StageOutput::Filtered => panic!("element was filtered by an empty chain"),
        }
    }

    #[test]
    fn stages_apply_in_insertion_order() {
        let op = CompiledOp::new(vec![
            Stage::map(|x: i32| x * 2),
            Stage::map(|x: i32| x + 1),
        ]);
        match apply_to(&op, 5) {
            StageOutput::Value(value) => assert_eq!(downcast::<i32>(value), 11),
            StageOutput::Filtered => panic!("element was unexpectedly filtered"),
        }
    }

    #[test]
    fn map_can_change_the_element_type() {
        let op = CompiledOp::new(vec![
            Stage::map(|x: i32| x.to_string()),
            Stage::map(|s: String| s.len()),
        ]);
        match apply_to(&op, 1234) {
            StageOutput::Value(value) => assert_eq!(downcast::<usize>(value), 4),
            StageOutput::Filtered => panic!("element was unexpectedly filtered"),
        }
    }

    #[test]
    fn matching_filter_passes_the_element_through() {
        let op = CompiledOp::new(vec![Stage::filter(|x: &i32| *x % 2 == 0)]);
        assert!(matches!(apply_to(&op, 4), StageOutput::Value(_)));
    }

    #[test]
    fn rejecting_filter_short_circuits_later_stages() {
        let op = CompiledOp::new(vec![
            Stage::filter(|x: &i32| *x % 2 == 0),
            Stage::map(|_: i32| -> i32 { panic!("stage after a rejecting filter must not run") }),
        ]);
        assert!(matches!(apply_to(&op, 3), StageOutput::Filtered));
    }

    #[test]
    fn entry_offset_skips_the_stages_before_the_chain_point() {
        let op = CompiledOp::new(vec![
            Stage::map(|x: i32| x * 2),
            Stage::map(|x: i32| x + 1),
        ]);
        let element = SourceElement {
            value: Box::new(5i32),
            first_stage: 1,
        };
        match op.apply(element) {
            StageOutput::Value(value) => assert_eq!(downcast::<i32>(value), 6),
            StageOutput::Filtered => panic!("element was unexpectedly filtered"),
        }
    }

    #[test]
    fn none_valued_elements_are_not_confused_with_filtered_ones() {
        let op = CompiledOp::new(vec![Stage::map(|x: Option<i32>| x)]);
        match op.apply(SourceElement::new(Box::new(Option::<i32>::None))) {
            StageOutput::Value(value) => assert_eq!(downcast::<Option<i32>>(value), None),
            StageOutput::Filtered => panic!("a None element is not a filtered element"),
        }
    }
}
