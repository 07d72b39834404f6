// Copyright 2025 The parastream authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types surfaced by terminal operations.

use thiserror::Error;

/// Error returned when a reduction is attempted over zero elements.
///
/// [`reduce()`](crate::Stream::reduce), [`max()`](crate::Stream::max) and
/// [`min()`](crate::Stream::min) fail with this error when the stream is empty
/// once all filters have been applied: there is no valid single element to
/// return, and no default is assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot reduce an empty stream")]
pub struct EmptyReduction;
