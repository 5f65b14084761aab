//! Post-fetch batch hooks.
//!
//! Hooks run on every fetched page, in registration order, before the
//! engine stamps its own fields onto the records.

use harvest_core::Record;
use std::fmt;

/// Transforms a page of records after it is fetched.
pub trait BatchHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "hook"
    }

    /// Returns the transformed batch.
    fn apply(&self, batch: Vec<Record>) -> Vec<Record>;
}

/// A [`BatchHook`] backed by a closure.
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(Vec<Record>) -> Vec<Record> + Send + Sync,
{
    /// Wraps `f` under `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> BatchHook for FnHook<F>
where
    F: Fn(Vec<Record>) -> Vec<Record> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, batch: Vec<Record>) -> Vec<Record> {
        (self.f)(batch)
    }
}

impl<F> fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").field("name", &self.name).finish()
    }
}

/// Runs `hooks` over `batch` in order.
pub fn apply_all(hooks: &[std::sync::Arc<dyn BatchHook>], batch: Vec<Record>) -> Vec<Record> {
    hooks.iter().fold(batch, |batch, hook| hook.apply(batch))
}
