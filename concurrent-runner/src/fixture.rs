// Copyright (c) The concurrent-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test fixtures, hooks and test operations.
//!
//! These are the typed equivalents of what a host test framework would otherwise discover by
//! reflection: a zero-argument constructor for the fixture, the setup and teardown hooks in their
//! declared order, and the test bodies. Hooks and bodies "throw" by returning an error or by
//! panicking.

use crate::{
    config::ConcurrentSettings,
    errors::{BoxError, PanicError},
};
use debug_ignore::DebugIgnore;
use std::{error, fmt, sync::Arc};
use thiserror::Error;

/// The signature of a fixture constructor.
pub type ConstructorFn<F> = dyn Fn() -> Result<F, BoxError> + Send + Sync;

/// The signature of a hook or test body that runs against a fixture instance.
pub type FixtureFn<F> = dyn Fn(&mut F) -> Result<(), BoxError> + Send + Sync;

/// The signature of a suite-level hook, which doesn't have access to a fixture instance.
pub type SuiteFn = dyn Fn() -> Result<(), BoxError> + Send + Sync;

/// Signals that a test's preconditions weren't met, and that it should be skipped.
///
/// A hook or test body can skip by returning `Err(Skip)` (usually through [`assume`] and `?`), or
/// by panicking with `std::panic::panic_any(Skip::new(..))`. Skipped invocations are excluded
/// from pass/fail accounting.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("assumption violated: {reason}")]
pub struct Skip {
    reason: String,
}

impl Skip {
    /// Creates a new skip signal with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the reason for skipping.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Returns `Err(Skip)` if `condition` is false.
///
/// ```
/// use concurrent_runner::fixture::assume;
///
/// fn body() -> Result<(), concurrent_runner::errors::BoxError> {
///     assume(cfg!(unix), "requires a unix platform")?;
///     Ok(())
/// }
/// ```
pub fn assume(condition: bool, reason: impl Into<String>) -> Result<(), Skip> {
    if condition {
        Ok(())
    } else {
        Err(Skip::new(reason))
    }
}

/// How to construct a fixture, and the hooks to run around every test body.
#[derive_where::derive_where(Debug)]
pub struct Lifecycle<F> {
    constructor: DebugIgnore<Arc<ConstructorFn<F>>>,
    before: Vec<Hook<F>>,
    after: Vec<Hook<F>>,
}

impl<F> Lifecycle<F> {
    /// Creates a lifecycle with the given fixture constructor and no hooks.
    pub fn new<C>(constructor: C) -> Self
    where
        C: Fn() -> Result<F, BoxError> + Send + Sync + 'static,
    {
        Self {
            constructor: DebugIgnore(Arc::new(constructor)),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Adds a hook that runs on each fixture instance before the test body.
    ///
    /// Hooks run in the order they're added.
    pub fn before<H>(mut self, name: impl Into<String>, hook: H) -> Self
    where
        H: Fn(&mut F) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before.push(Hook::new(name, hook));
        self
    }

    /// Adds a hook that runs on each fixture instance after the test body.
    ///
    /// After hooks always run once the fixture has been constructed, even if a before hook or
    /// the body failed. They run in the order they're added.
    pub fn after<H>(mut self, name: impl Into<String>, hook: H) -> Self
    where
        H: Fn(&mut F) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.after.push(Hook::new(name, hook));
        self
    }

    /// Constructs a fresh fixture instance.
    pub(crate) fn construct(&self) -> Result<F, BoxError> {
        (self.constructor)()
    }

    pub(crate) fn before_hooks(&self) -> &[Hook<F>] {
        &self.before
    }

    pub(crate) fn after_hooks(&self) -> &[Hook<F>] {
        &self.after
    }
}

impl<F: Default + 'static> Lifecycle<F> {
    /// Creates a lifecycle that constructs fixtures through `Default`.
    pub fn from_default() -> Self {
        Self::new(|| Ok(F::default()))
    }
}

/// A named hook that runs against a fixture instance.
#[derive_where::derive_where(Debug)]
pub struct Hook<F> {
    name: String,
    func: DebugIgnore<Arc<FixtureFn<F>>>,
}

impl<F> Hook<F> {
    fn new<H>(name: impl Into<String>, func: H) -> Self
    where
        H: Fn(&mut F) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: DebugIgnore(Arc::new(func)),
        }
    }

    /// Returns the name of the hook.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, fixture: &mut F) -> Result<(), BoxError> {
        (self.func)(fixture)
    }
}

/// A named suite-level hook.
#[derive(Debug)]
pub struct SuiteHook {
    name: String,
    func: DebugIgnore<Box<SuiteFn>>,
}

impl SuiteHook {
    /// Returns the name of the hook.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self) -> Result<(), BoxError> {
        (self.func)()
    }
}

/// Describes the error a test body is expected to return.
///
/// When an expected error is declared, a body that completes normally fails, and a body that
/// returns a different error fails with both the expected and actual errors attached.
#[derive(Clone, Debug)]
pub struct ExpectedError {
    description: String,
    matcher: DebugIgnore<Arc<dyn Fn(&(dyn error::Error + 'static)) -> bool + Send + Sync>>,
}

impl ExpectedError {
    /// Expects an error of type `E`.
    ///
    /// Matches if the returned error is an `E`, or if any error in its
    /// [`source`](error::Error::source) chain is an `E`.
    pub fn of<E: error::Error + 'static>() -> Self {
        Self::new(std::any::type_name::<E>(), |error| {
            source_chain(error).any(|error| error.is::<E>())
        })
    }

    /// Expects the body to panic.
    pub fn panic() -> Self {
        Self::new("panic", |error| error.is::<PanicError>())
    }

    /// Expects the body to panic with a message containing `expected`.
    pub fn panic_containing(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        let description = format!("panic containing {expected:?}");
        Self::new(description, move |error| {
            error
                .downcast_ref::<PanicError>()
                .is_some_and(|panic| panic.message().contains(&expected))
        })
    }

    /// Expects an error matching a custom predicate.
    pub fn matching<M>(description: impl Into<String>, matcher: M) -> Self
    where
        M: Fn(&(dyn error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self::new(description, matcher)
    }

    fn new<M>(description: impl Into<String>, matcher: M) -> Self
    where
        M: Fn(&(dyn error::Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            matcher: DebugIgnore(Arc::new(matcher)),
        }
    }

    /// Returns a description of the expected error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns true if `error` matches this expectation.
    pub fn matches(&self, error: &(dyn error::Error + 'static)) -> bool {
        (self.matcher)(error)
    }
}

fn source_chain<'a>(
    error: &'a (dyn error::Error + 'static),
) -> impl Iterator<Item = &'a (dyn error::Error + 'static)> {
    std::iter::successors(Some(error), |error| error.source())
}

/// A single test operation: a named body plus how it should be executed.
#[derive_where::derive_where(Debug)]
pub struct TestOperation<F> {
    name: String,
    body: DebugIgnore<Arc<FixtureFn<F>>>,
    expected: Option<ExpectedError>,
    concurrency: Option<ConcurrentSettings>,
    ignored: bool,
}

impl<F> TestOperation<F> {
    /// Creates a new test operation that runs once, with ordinary semantics.
    pub fn new<B>(name: impl Into<String>, body: B) -> Self
    where
        B: Fn(&mut F) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: DebugIgnore(Arc::new(body)),
            expected: None,
            concurrency: None,
            ignored: false,
        }
    }

    /// Runs this operation concurrently with the given settings. Unset fields are filled in from
    /// the active profile.
    pub fn concurrent(mut self, settings: ConcurrentSettings) -> Self {
        self.concurrency = Some(settings);
        self
    }

    /// Declares the error the body is expected to return.
    pub fn expect_error(mut self, expected: ExpectedError) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Marks the operation as ignored: it is reported as ignored and never run.
    pub fn ignore(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Returns the name of this operation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the expected error, if one was declared.
    pub fn expected_error(&self) -> Option<&ExpectedError> {
        self.expected.as_ref()
    }

    /// Returns the concurrency settings, or `None` if the operation runs with ordinary semantics.
    pub fn concurrency(&self) -> Option<&ConcurrentSettings> {
        self.concurrency.as_ref()
    }

    /// Returns true if this operation is ignored.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub(crate) fn call(&self, fixture: &mut F) -> Result<(), BoxError> {
        (self.body)(fixture)
    }
}

/// Identifies a test case within a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TestCaseId<'a> {
    /// The name of the suite.
    pub suite: &'a str,

    /// The name of the test operation.
    pub name: &'a str,
}

impl fmt::Display for TestCaseId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.suite, self.name)
    }
}

/// A fixture type together with its test operations.
#[derive_where::derive_where(Debug)]
pub struct TestSuite<F> {
    name: String,
    lifecycle: Arc<Lifecycle<F>>,
    tests: Vec<Arc<TestOperation<F>>>,
    before_all: Vec<SuiteHook>,
    after_all: Vec<SuiteHook>,
}

impl<F> TestSuite<F> {
    /// Creates a new, empty suite.
    pub fn new(name: impl Into<String>, lifecycle: Lifecycle<F>) -> Self {
        Self {
            name: name.into(),
            lifecycle: Arc::new(lifecycle),
            tests: Vec::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
        }
    }

    /// Adds a test operation. Operations run in the order they're added.
    pub fn test(mut self, operation: TestOperation<F>) -> Self {
        self.tests.push(Arc::new(operation));
        self
    }

    /// Adds a hook that runs once before any test in the suite.
    pub fn before_all<H>(mut self, name: impl Into<String>, hook: H) -> Self
    where
        H: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before_all.push(SuiteHook {
            name: name.into(),
            func: DebugIgnore(Box::new(hook)),
        });
        self
    }

    /// Adds a hook that runs once after every test in the suite, even if tests failed.
    pub fn after_all<H>(mut self, name: impl Into<String>, hook: H) -> Self
    where
        H: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.after_all.push(SuiteHook {
            name: name.into(),
            func: DebugIgnore(Box::new(hook)),
        });
        self
    }

    /// Returns the name of the suite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the lifecycle shared by every test in the suite.
    pub fn lifecycle(&self) -> &Arc<Lifecycle<F>> {
        &self.lifecycle
    }

    /// Iterates over the test operations in declared order.
    pub fn tests(&self) -> impl ExactSizeIterator<Item = &Arc<TestOperation<F>>> + '_ {
        self.tests.iter()
    }

    pub(crate) fn before_all_hooks(&self) -> &[SuiteHook] {
        &self.before_all
    }

    pub(crate) fn after_all_hooks(&self) -> &[SuiteHook] {
        &self.after_all
    }
}
