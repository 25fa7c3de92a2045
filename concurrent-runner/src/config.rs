// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for concurrent test execution.
//!
//! Settings come from three layers, from lowest to highest precedence:
//!
//! 1. the defaults embedded in concurrent-runner ([`RunnerConfig::DEFAULT_CONFIG`]),
//! 2. a user config file with named profiles, and
//! 3. the [`ConcurrentSettings`] declared on each test operation.
//!
//! The result of layering is an [`ExecutionConfig`].

mod imp;
mod settings;
mod worker_count;

pub use imp::*;
pub use settings::*;
pub use worker_count::*;
