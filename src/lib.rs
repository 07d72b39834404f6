// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs, unsafe_code)]

pub mod collectors;
mod core;
mod error;
mod macros;
mod sequential;
mod stream;

pub use crate::core::{CpuPinningPolicy, Partitions, WorkerCount};
pub use error::EmptyReduction;
pub use sequential::SequentialStream;
pub use stream::{Stream, StreamConfig, StreamIter};
