// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Runtime context shared by all components of one pipeline execution.
//!
//! The context is an explicit value threaded through construction and
//! execution; there is no process-global or thread-local state, so two
//! compiled scripts running in one process stay isolated.

use crate::error::Error;
use crate::message::{Item, Value};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Pipeline-scoped state: a mutable variable store written by variable-set
/// segments, and a constant store that is immutable once compilation ends.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    variables: RwLock<HashMap<String, Vec<Item>>>,
    consts: RwLock<HashMap<String, Value>>,
}

impl RuntimeContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        RuntimeContext::default()
    }

    /// Returns a snapshot of the variable's items.
    pub fn get_var(&self, name: &str) -> Result<Vec<Item>, Error> {
        self.variables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownVariable {
                name: name.to_owned(),
            })
    }

    /// Replaces the variable's items.
    pub fn set_var(&self, name: &str, items: Vec<Item>) {
        let _ = self.variables.write().insert(name.to_owned(), items);
    }

    /// Appends one item to the variable, creating it if absent.
    pub fn append_var(&self, name: &str, item: Item) {
        self.variables
            .write()
            .entry(name.to_owned())
            .or_default()
            .push(item);
    }

    /// Resets the variable to an empty list.
    pub fn clear_var(&self, name: &str) {
        let _ = self.variables.write().insert(name.to_owned(), Vec::new());
    }

    /// Returns the constant bound to `name`, if any.
    #[must_use]
    pub fn get_const(&self, name: &str) -> Option<Value> {
        self.consts.read().get(name).cloned()
    }

    /// Returns true when a constant named `name` exists.
    #[must_use]
    pub fn has_const(&self, name: &str) -> bool {
        self.consts.read().contains_key(name)
    }

    /// Binds one constant. With `override_existing` false an existing
    /// binding is kept.
    pub fn add_const(&self, name: &str, value: Value, override_existing: bool) {
        let mut consts = self.consts.write();
        if override_existing || !consts.contains_key(name) {
            let _ = consts.insert(name.to_owned(), value);
        }
    }

    /// Binds a whole mapping of constants at once.
    pub fn add_consts(
        &self,
        mapping: impl IntoIterator<Item = (String, Value)>,
        override_existing: bool,
    ) {
        let mut consts = self.consts.write();
        for (name, value) in mapping {
            if override_existing || !consts.contains_key(&name) {
                let _ = consts.insert(name, value);
            }
        }
    }
}
