//! Extension points around load and save.

use std::fmt;

use crate::domain::{PolicyStore, RuleRecord};

/// Rewrites rule rows on their way out of and into storage.
///
/// `on_load` sees every row read by a load before it reaches the model;
/// `on_save` sees each target's rows before they are inserted. Both default
/// to passing rows through untouched.
pub trait PolicyHooks: Send + Sync + fmt::Debug {
    /// Adjusts rows read from storage.
    fn on_load(&self, _store: &dyn PolicyStore, rules: Vec<RuleRecord>) -> Vec<RuleRecord> {
        rules
    }

    /// Adjusts rows about to be written by a save.
    fn on_save(&self, _store: &dyn PolicyStore, rules: Vec<RuleRecord>) -> Vec<RuleRecord> {
        rules
    }
}

/// Hooks that change nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl PolicyHooks for DefaultHooks {}
