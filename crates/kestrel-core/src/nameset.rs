//! Evaluation environments.
//!
//! A nameset maps quarks to values and may chain to a parent. Lookups walk
//! outward until a binding is found; bindings always land in the nameset
//! they are made on.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{CoreError, CoreResult};
use crate::object::Value;
use crate::quark::{self, Quark};

/// Chained symbol bindings
#[derive(Default)]
pub struct Nameset {
    parent: Option<Arc<Nameset>>,
    bindings: RwLock<FxHashMap<Quark, Value>>,
}

impl Nameset {
    /// Create a root nameset
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a nameset whose lookups fall back to `parent`
    pub fn child(parent: &Arc<Nameset>) -> Self {
        Self {
            parent: Some(parent.clone()),
            bindings: RwLock::default(),
        }
    }

    /// Enclosing nameset
    pub fn parent(&self) -> Option<&Arc<Nameset>> {
        self.parent.as_ref()
    }

    /// Bind `quark` here, returning the value it replaces
    pub fn bind(&self, quark: Quark, value: Value) -> Option<Value> {
        self.bindings.write().insert(quark, value)
    }

    /// Intern `name` and bind it here
    pub fn bind_name(&self, name: &str, value: Value) -> Option<Value> {
        self.bind(quark::intern(name), value)
    }

    /// Remove a local binding
    pub fn unbind(&self, quark: Quark) -> Option<Value> {
        self.bindings.write().remove(&quark)
    }

    /// Value bound to `quark` here or in the nearest ancestor
    pub fn find(&self, quark: Quark) -> Option<Value> {
        let mut current = Some(self);
        while let Some(ns) = current {
            if let Some(value) = ns.bindings.read().get(&quark) {
                return Some(value.clone());
            }
            current = ns.parent.as_deref();
        }
        None
    }

    /// Like [`find`](Self::find), failing with unbound-symbol
    pub fn get(&self, quark: Quark) -> CoreResult<Value> {
        self.find(quark).ok_or_else(|| CoreError::unbound_symbol(quark))
    }

    /// Whether `quark` is bound here or in an ancestor
    pub fn exists(&self, quark: Quark) -> bool {
        self.find(quark).is_some()
    }

    /// Whether `quark` is bound in this nameset itself
    pub fn exists_local(&self, quark: Quark) -> bool {
        self.bindings.read().contains_key(&quark)
    }

    /// Number of local bindings
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Whether there are no local bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl std::fmt::Debug for Nameset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nameset")
            .field("bindings", &self.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
