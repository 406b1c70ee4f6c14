use std::sync::Arc;

use crate::error::Result;

/// Where a method object is in its lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MethodState {
    /// Options can be set, no result yet.
    Configured,
    /// The result slot holds the outcome of the current options.
    Solved,
    /// The result slot holds the outcome of options that have since changed.
    Stale,
}

/// Storage for the final result of a method object.
///
/// The slot is written only by the owning object's entry operation. A new
/// result replaces the shared handle, it never mutates a value that has already
/// been handed out.
#[derive(Debug)]
pub struct ResultSlot<T> {
    value: Option<Arc<T>>,
    stale: bool,
}

impl<T> ResultSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: None,
            stale: false,
        }
    }

    /// The cached result, or a `MissingResult` error naming `operation`.
    pub fn get(&self, method: &'static str, operation: &'static str) -> Result<&Arc<T>> {
        self.value
            .as_ref()
            .ok_or_else(|| super::missing(method, operation))
    }

    pub fn peek(&self) -> Option<&Arc<T>> {
        self.value.as_ref()
    }

    pub fn state(&self) -> MethodState {
        match (&self.value, self.stale) {
            (None, _) => MethodState::Configured,
            (Some(_), false) => MethodState::Solved,
            (Some(_), true) => MethodState::Stale,
        }
    }

    /// Stores the outcome of a completed entry operation.
    pub(crate) fn install(&mut self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.value = Some(Arc::clone(&value));
        self.stale = false;
        value
    }

    /// Records that options changed after the result was computed.
    pub(crate) fn mark_stale(&mut self) {
        if self.value.is_some() {
            self.stale = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut slot = ResultSlot::new();
        assert_eq!(slot.state(), MethodState::Configured);

        // changing options before the first solve does not make anything stale
        slot.mark_stale();
        assert_eq!(slot.state(), MethodState::Configured);

        let first = slot.install(1.0);
        assert_eq!(slot.state(), MethodState::Solved);

        slot.mark_stale();
        assert_eq!(slot.state(), MethodState::Stale);

        let second = slot.install(2.0);
        assert_eq!(slot.state(), MethodState::Solved);
        assert_eq!(*first, 1.0);
        assert_eq!(*second, 2.0);
    }

    #[test]
    fn empty_slot_reports_the_operation() {
        let slot = ResultSlot::<f64>::new();
        let err = slot.get("RHF", "make_rdm1").unwrap_err();
        assert!(err.is_missing_result());
        assert!(err.to_string().contains("make_rdm1"));
    }
}
