//! Interned symbols ("quarks")
//!
//! A quark is a small integer standing for a string. Interning the same
//! string always yields the same quark, so dispatch compares integers instead
//! of strings. The table is process-wide and append-only; ids are stable for
//! the life of the process but not across runs.

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::{CoreError, CoreResult};

/// Global symbol table
static SYMBOLS: LazyLock<SymbolTable> = LazyLock::new(SymbolTable::new);

/// Forward map plus reverse array.
///
/// New ids are assigned while the forward shard for the key is held, so two
/// threads interning the same fresh string agree on the id.
struct SymbolTable {
    forward: DashMap<Arc<str>, Quark>,
    reverse: RwLock<Vec<Arc<str>>>,
}

impl SymbolTable {
    fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: RwLock::new(Vec::new()),
        }
    }

    fn intern(&self, name: &str) -> Quark {
        if let Some(quark) = self.forward.get(name) {
            return *quark;
        }

        let key: Arc<str> = Arc::from(name);
        match self.forward.entry(key.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let mut reverse = self.reverse.write();
                let quark = Quark(reverse.len() as u32);
                reverse.push(key);
                drop(reverse);
                tracing::trace!(target: "kestrel::quark", name, id = quark.0, "interned");
                *entry.insert(quark)
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<Quark> {
        self.forward.get(name).map(|q| *q)
    }

    fn name(&self, quark: Quark) -> Option<Arc<str>> {
        self.reverse.read().get(quark.0 as usize).cloned()
    }

    fn len(&self) -> usize {
        self.reverse.read().len()
    }
}

/// An interned string identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Quark(u32);

impl Quark {
    /// Intern `name` (alias of [`intern`])
    pub fn intern(name: &str) -> Self {
        intern(name)
    }

    /// Rebuild a quark from its raw id. The id is not checked.
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Raw id of this quark
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// String this quark was interned from
    pub fn name(self) -> CoreResult<Arc<str>> {
        name_of(self)
    }
}

impl fmt::Display for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match SYMBOLS.name(*self) {
            Some(name) => f.write_str(&name),
            None => write!(f, "#<quark {}>", self.0),
        }
    }
}

/// Intern a string, returning its quark.
///
/// Idempotent: a second call with an equal string returns the same quark and
/// does not grow the table.
pub fn intern(name: &str) -> Quark {
    SYMBOLS.intern(name)
}

/// Quark for `name` if it was interned before
pub fn lookup(name: &str) -> Option<Quark> {
    SYMBOLS.lookup(name)
}

/// String for a quark produced by [`intern`]
pub fn name_of(quark: Quark) -> CoreResult<Arc<str>> {
    SYMBOLS
        .name(quark)
        .ok_or(CoreError::UnknownSymbol(quark.0))
}

/// Number of interned symbols
pub fn symbol_count() -> usize {
    SYMBOLS.len()
}

/// A type's local set of method quarks.
///
/// Zones are small (one entry per method a type adds), so membership is a
/// linear scan over inline storage.
#[derive(Clone, Default, Debug)]
pub struct QuarkZone {
    quarks: SmallVec<[Quark; 16]>,
}

impl QuarkZone {
    /// Create an empty zone
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name` and add it to the zone if missing
    pub fn intern(&mut self, name: &str) -> Quark {
        let quark = intern(name);
        self.insert(quark);
        quark
    }

    /// Add a quark, ignoring duplicates. Returns whether it was new.
    pub fn insert(&mut self, quark: Quark) -> bool {
        if self.contains(quark) {
            return false;
        }
        self.quarks.push(quark);
        true
    }

    /// Check membership
    pub fn contains(&self, quark: Quark) -> bool {
        self.quarks.iter().any(|q| *q == quark)
    }

    /// Number of quarks
    pub fn len(&self) -> usize {
        self.quarks.len()
    }

    /// Check if the zone is empty
    pub fn is_empty(&self) -> bool {
        self.quarks.is_empty()
    }

    /// Quarks in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Quark> + '_ {
        self.quarks.iter().copied()
    }
}
