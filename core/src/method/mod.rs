//! The method-object contract.
//!
//! A method object is constructed from a [`Handler`] - the [`Environment`] or
//! another method object - and copies the handler's [`Defaults`] at that moment.
//! Its single entry operation, [`Method::kernel`], runs the computation and stores
//! the outcome in a [`ResultSlot`]. Operations that take the solution as an
//! optional argument fall back to the slot, and fail with
//! [`Error::MissingResult`] if it is empty.
//!
//! [`Environment`]: crate::env::Environment

mod slot;

use std::sync::Arc;

pub use slot::{MethodState, ResultSlot};

use crate::{
    env::{Defaults, MaxMemory, OutputSink, Verbosity},
    error::{Error, Result},
    hf::RestrictedHartreeFockOutput,
    system::{ModelSystem, ProblemSize},
};

/// What kind of object a handler is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    Environment,
    /// A closed-shell mean-field method.
    Restricted,
    /// An open-shell mean-field method.
    Unrestricted,
    /// A correlation method built on top of a restricted reference.
    Correlated,
}

/// Anything a method object can be constructed from.
pub trait Handler {
    /// The problem description shared by the handler and its dependents.
    fn system(&self) -> &Arc<ModelSystem>;

    /// A snapshot of the handler's current defaults.
    fn defaults(&self) -> Defaults;

    fn kind(&self) -> HandlerKind;

    /// The restricted mean-field solution this handler can provide to later
    /// stages, if one has been computed.
    fn restricted_reference(&self) -> Option<Arc<RestrictedHartreeFockOutput>> {
        None
    }
}

/// A method object: configuration, a uniform entry operation and a cached result.
pub trait Method: Handler {
    type Output;

    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Runs the computation and caches its result.
    ///
    /// Every call recomputes from the current options and installs a new result.
    /// Results returned by earlier calls are never modified. On failure the result
    /// slot is left as it was.
    fn kernel(&mut self) -> Result<Arc<Self::Output>>;

    /// The cached result, or [`Error::MissingResult`] if `kernel` has not
    /// completed yet.
    fn result(&self) -> Result<&Arc<Self::Output>>;

    fn state(&self) -> MethodState;
}

/// Local copies of the defaults a method object inherited from its handler.
///
/// Changing them affects only this object (and objects constructed from it later).
pub trait Overrides {
    fn local_defaults(&self) -> &Defaults;

    fn local_defaults_mut(&mut self) -> &mut Defaults;

    fn verbosity(&self) -> Verbosity {
        self.local_defaults().verbosity
    }

    fn set_verbosity(&mut self, verbosity: Verbosity) -> &mut Self
    where
        Self: Sized,
    {
        self.local_defaults_mut().verbosity = verbosity;
        self
    }

    fn output(&self) -> &OutputSink {
        &self.local_defaults().output
    }

    fn set_output(&mut self, output: OutputSink) -> &mut Self
    where
        Self: Sized,
    {
        self.local_defaults_mut().output = output;
        self
    }

    fn max_memory(&self) -> MaxMemory {
        self.local_defaults().max_memory
    }

    fn set_max_memory(&mut self, megabytes: f64) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.local_defaults_mut().max_memory = MaxMemory::new(megabytes)?;
        Ok(self)
    }
}

/// State every method object carries: the shared problem, its fixed size, the
/// inherited defaults and the result slot.
#[derive(Debug)]
pub(crate) struct MethodCore<T> {
    pub(crate) system: Arc<ModelSystem>,
    pub(crate) size: ProblemSize,
    pub(crate) defaults: Defaults,
    pub(crate) slot: ResultSlot<T>,
}

impl<T> MethodCore<T> {
    pub(crate) fn new(handler: &(impl Handler + ?Sized)) -> Self {
        let system = Arc::clone(handler.system());
        Self {
            size: system.size(),
            system,
            defaults: handler.defaults(),
            slot: ResultSlot::new(),
        }
    }
}

/// Runs `kernel` on every method object and returns the outcomes in input order.
///
/// With the `rayon` feature, objects are solved in parallel; each object is owned
/// by exactly one worker while its kernel runs.
pub fn kernel_all<M>(methods: &mut [M]) -> Vec<Result<Arc<M::Output>>>
where
    M: Method + Send,
    M::Output: Send + Sync,
{
    #[cfg(feature = "rayon")]
    let outcomes = {
        use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};

        methods.par_iter_mut().map(|method| method.kernel()).collect()
    };

    #[cfg(not(feature = "rayon"))]
    let outcomes = methods.iter_mut().map(|method| method.kernel()).collect();

    outcomes
}

/// Builds the error for an operation that needed a result that is not there.
pub(crate) fn missing(method: &'static str, operation: &'static str) -> Error {
    Error::MissingResult { method, operation }
}
