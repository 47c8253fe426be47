//! Quark dispatch tables.
//!
//! Every object type owns one [`MethodTable`]: the quarks it declares locally
//! and the native method behind each of them, plus a link to its parent
//! type's table. A lookup that misses locally continues with the parent, so a
//! derived type answers every method of its ancestors.
//!
//! Tables are built once, inside a `LazyLock`, and never change afterwards;
//! readers need no locking.
//!
//! ## Usage
//!
//! ```ignore
//! static CONS_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
//!     MethodTable::builder("Cons")
//!         .parent(&OBJECT_METHODS)
//!         .method("length", Arity::Exact(0), cons_length)
//!         .method("add", Arity::Exact(1), cons_add)
//!         .build()
//! });
//! ```

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{CoreError, CoreResult};
use crate::evaluator::Evaluator;
use crate::nameset::Nameset;
use crate::object::{ObjRef, Value};
use crate::quark::{Quark, QuarkZone};

/// Native method signature: receiver, evaluator, environment, evaluated arguments.
pub type NativeMethod = fn(&ObjRef, &Evaluator, &Nameset, &[Value]) -> CoreResult<Value>;

/// Accepted argument counts for a native method
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` arguments
    Exact(usize),
    /// `n` or more arguments
    AtLeast(usize),
    /// Between `min` and `max` arguments, inclusive
    Between(usize, usize),
}

impl Arity {
    /// Check an argument count
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::AtLeast(n) => count >= n,
            Self::Between(min, max) => (min..=max).contains(&count),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
            Self::Between(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

/// One native method of a type
#[derive(Clone, Copy)]
pub struct MethodEntry {
    /// Method name
    pub quark: Quark,
    /// Accepted argument counts
    pub arity: Arity,
    /// Implementation
    pub func: NativeMethod,
}

impl MethodEntry {
    /// Check the arity and call the method
    pub fn invoke(
        &self,
        this: &ObjRef,
        ev: &Evaluator,
        ns: &Nameset,
        argv: &[Value],
    ) -> CoreResult<Value> {
        if !self.arity.accepts(argv.len()) {
            return Err(CoreError::Arity {
                method: self.quark.to_string(),
                expected: self.arity,
                got: argv.len(),
            });
        }
        (self.func)(this, ev, ns, argv)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("quark", &self.quark.to_string())
            .field("arity", &self.arity)
            .finish()
    }
}

/// Per-type dispatch table
pub struct MethodTable {
    type_name: &'static str,
    parent: Option<&'static MethodTable>,
    zone: QuarkZone,
    methods: FxHashMap<Quark, MethodEntry>,
}

impl MethodTable {
    /// Start building a table for `type_name`
    pub fn builder(type_name: &'static str) -> MethodTableBuilder {
        MethodTableBuilder::new(type_name)
    }

    /// Name of the type owning this table
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Parent type's table
    pub fn parent(&self) -> Option<&'static MethodTable> {
        self.parent
    }

    /// Quarks declared by this type itself
    pub fn zone(&self) -> &QuarkZone {
        &self.zone
    }

    /// Whether this type (and, with `recurse`, any ancestor) declares `quark`
    pub fn is_quark(&self, quark: Quark, recurse: bool) -> bool {
        if self.zone.contains(quark) {
            return true;
        }
        recurse && self.parent.is_some_and(|p| p.is_quark(quark, true))
    }

    /// Quarks declared by this type itself, in declaration order
    pub fn quarks(&self) -> impl Iterator<Item = Quark> + '_ {
        self.zone.iter()
    }

    /// Method declared by this type itself
    pub fn local(&self, quark: Quark) -> Option<&MethodEntry> {
        self.methods.get(&quark)
    }

    /// Find `quark` here or in the nearest ancestor declaring it
    pub fn find(&self, quark: Quark) -> Option<(&MethodTable, &MethodEntry)> {
        self.ancestors()
            .find_map(|table| table.local(quark).map(|entry| (table, entry)))
    }

    /// This table followed by its ancestors, nearest first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Invoke `quark` on `this`, delegating to ancestors when not local.
    pub fn dispatch(
        &self,
        this: &ObjRef,
        ev: &Evaluator,
        ns: &Nameset,
        quark: Quark,
        argv: &[Value],
    ) -> CoreResult<Value> {
        match self.find(quark) {
            Some((_, entry)) => entry.invoke(this, ev, ns, argv),
            None => {
                tracing::debug!(
                    target: "kestrel::dispatch",
                    method = %quark,
                    type_name = this.type_name(),
                    "unbound method"
                );
                Err(CoreError::unbound_method(quark, this.type_name()))
            }
        }
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("type_name", &self.type_name)
            .field("parent", &self.parent.map(|p| p.type_name))
            .field("methods", &self.zone.len())
            .finish()
    }
}

/// Iterator over a table and its ancestors
pub struct Ancestors<'a> {
    next: Option<&'a MethodTable>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a MethodTable;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.next?;
        self.next = table.parent;
        Some(table)
    }
}

/// Builder for a [`MethodTable`]
pub struct MethodTableBuilder {
    type_name: &'static str,
    parent: Option<&'static MethodTable>,
    zone: QuarkZone,
    methods: FxHashMap<Quark, MethodEntry>,
}

impl MethodTableBuilder {
    /// Create a builder for `type_name`
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            parent: None,
            zone: QuarkZone::new(),
            methods: FxHashMap::default(),
        }
    }

    /// Delegate unknown quarks to `parent`
    pub fn parent(mut self, parent: &'static MethodTable) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Declare a method. Declaring a name twice keeps the last definition.
    pub fn method(mut self, name: &str, arity: Arity, func: NativeMethod) -> Self {
        let quark = self.zone.intern(name);
        self.methods.insert(quark, MethodEntry { quark, arity, func });
        self
    }

    /// Finish the table
    pub fn build(self) -> MethodTable {
        tracing::trace!(
            target: "kestrel::dispatch",
            type_name = self.type_name,
            parent = self.parent.map(|p| p.type_name),
            methods = self.zone.len(),
            "method table built"
        );
        MethodTable {
            type_name: self.type_name,
            parent: self.parent,
            zone: self.zone,
            methods: self.methods,
        }
    }
}
