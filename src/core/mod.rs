// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Core engine: pipeline compilation, worker pool, ordered dispatch and
//! tournament fold.

mod dispatch;
mod fold;
mod pipeline;
mod util;
mod worker_pool;

pub use util::Partitions;
pub use worker_pool::{CpuPinningPolicy, WorkerCount};

pub(crate) use dispatch::{worker_job, Combinator, OrderedElements, StreamPool};
pub(crate) use fold::tournament_fold;
pub(crate) use pipeline::{downcast, CompiledOp, SourceElement, Stage};
