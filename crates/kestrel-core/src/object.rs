//! The root object type.
//!
//! Every runtime value implements [`Object`] and travels as an [`ObjRef`]: a
//! shared handle with an atomic reference count. Cloning a handle adds a
//! holder, dropping it removes one, and the object is destroyed exactly once
//! when the last holder goes away. The null object is `None` in [`Value`].
//!
//! Mutable object state lives behind an [`ObjectCell`](crate::object_cell::ObjectCell):
//! readers share the lock, writers hold it exclusively.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::cons::Cons;
use crate::dispatch::{Arity, MethodTable};
use crate::error::{CoreError, CoreResult};
use crate::evaluator::Evaluator;
use crate::literal::{Boolean, Str};
use crate::nameset::Nameset;
use crate::quark::{self, Quark};
use crate::serial::Serial;

/// An object or null
pub type Value = Option<ObjRef>;

/// Conversions to `Any`, implemented for every object type.
pub trait AsAny: Any + Send + Sync {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;
    /// Convert a shared pointer to `Any`
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Behavior shared by every runtime value.
///
/// Methods that need the receiver's own handle (to return it, or pass it to
/// a native method) take it as `this`; `this` always points at `self`.
pub trait Object: AsAny {
    /// Type name used in diagnostics
    fn type_name(&self) -> &'static str;

    /// Dispatch table for this type
    fn method_table(&self) -> &'static MethodTable {
        &OBJECT_METHODS
    }

    /// Printable representation
    fn repr(&self) -> String {
        format!("<{}>", self.type_name())
    }

    /// Structural copy of this object
    fn clone_object(&self) -> CoreResult<ObjRef> {
        Err(CoreError::CloneUnsupported(self.type_name()))
    }

    /// Equality of externally observable state. Identity is checked by
    /// [`ObjRef::equals`] before this is called.
    fn equals(&self, _other: &dyn Object) -> bool {
        false
    }

    /// Evaluate this object. Literals evaluate to themselves.
    fn eval(&self, this: &ObjRef, _ev: &Evaluator, _ns: &Nameset) -> CoreResult<Value> {
        Ok(Some(this.clone()))
    }

    /// Apply this object as a function to an unevaluated argument form.
    fn apply(
        &self,
        _this: &ObjRef,
        _ev: &Evaluator,
        _ns: &Nameset,
        _args: Option<&Arc<Cons>>,
    ) -> CoreResult<Value> {
        Err(CoreError::NotCallable(self.type_name()))
    }

    /// Invoke a method by quark with evaluated arguments.
    fn apply_method(
        &self,
        this: &ObjRef,
        ev: &Evaluator,
        ns: &Nameset,
        quark: Quark,
        argv: &[Value],
    ) -> CoreResult<Value> {
        self.method_table().dispatch(this, ev, ns, quark, argv)
    }

    /// Serial view, for types that can be written to a stream
    fn as_serial(&self) -> Option<&dyn Serial> {
        None
    }
}

/// Shared handle to an object
#[derive(Clone)]
pub struct ObjRef(Arc<dyn Object>);

impl ObjRef {
    /// Wrap a new object; the handle is its only holder
    pub fn new<T: Object>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Wrap an existing shared pointer
    pub fn from_arc<T: Object>(object: Arc<T>) -> Self {
        Self(object)
    }

    /// Add a holder
    pub fn acquire(&self) -> Self {
        self.clone()
    }

    /// Remove this holder, destroying the object if it was the last one
    pub fn release(self) {
        drop(self);
    }

    /// Number of holders
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Borrow the object
    pub fn as_object(&self) -> &dyn Object {
        self.0.as_ref()
    }

    /// Type name of the object
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Printable representation
    pub fn repr(&self) -> String {
        self.0.repr()
    }

    /// Check the concrete type
    pub fn is<T: Object>(&self) -> bool {
        (*self.0).as_any().is::<T>()
    }

    /// Borrow as a concrete type
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    /// Shared pointer to the concrete type
    pub fn downcast<T: Object>(&self) -> Option<Arc<T>> {
        self.0.clone().into_any_arc().downcast::<T>().ok()
    }

    /// Identity or equal observable state
    pub fn equals(&self, other: &ObjRef) -> bool {
        self.ptr_eq(other) || self.0.equals(other.as_object())
    }

    /// Structural copy
    pub fn clone_object(&self) -> CoreResult<ObjRef> {
        self.0.clone_object()
    }

    /// Whether the object's type (or with `recurse` an ancestor) declares `quark`
    pub fn is_quark(&self, quark: Quark, recurse: bool) -> bool {
        self.0.method_table().is_quark(quark, recurse)
    }

    /// Evaluate the object
    pub fn eval(&self, ev: &Evaluator, ns: &Nameset) -> CoreResult<Value> {
        self.0.eval(self, ev, ns)
    }

    /// Apply the object to an unevaluated argument form
    pub fn apply(&self, ev: &Evaluator, ns: &Nameset, args: Option<&Arc<Cons>>) -> CoreResult<Value> {
        self.0.apply(self, ev, ns, args)
    }

    /// Invoke a method by quark
    pub fn apply_method(
        &self,
        ev: &Evaluator,
        ns: &Nameset,
        quark: Quark,
        argv: &[Value],
    ) -> CoreResult<Value> {
        self.0.apply_method(self, ev, ns, quark, argv)
    }

    /// Intern `name` and invoke it
    pub fn call_method(
        &self,
        ev: &Evaluator,
        ns: &Nameset,
        name: &str,
        argv: &[Value],
    ) -> CoreResult<Value> {
        self.apply_method(ev, ns, quark::intern(name), argv)
    }

    /// Serial view of the object
    pub fn as_serial(&self) -> Option<&dyn Serial> {
        self.0.as_serial()
    }
}

impl<T: Object> From<Arc<T>> for ObjRef {
    fn from(object: Arc<T>) -> Self {
        Self(object)
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.repr())
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Printable representation of a value, `nil` for null
pub fn repr_value(value: &Value) -> String {
    match value {
        Some(obj) => obj.repr(),
        None => "nil".to_string(),
    }
}

/// Equality of two values; null equals only null
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.equals(b),
        (None, None) => true,
        _ => false,
    }
}

/// Root dispatch table shared by every type
pub static OBJECT_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("Object")
        .method("repr", Arity::Exact(0), object_repr)
        .method("type-name", Arity::Exact(0), object_type_name)
        .method("clone", Arity::Exact(0), object_clone)
        .method("eql", Arity::Exact(1), object_eql)
        .build()
});

fn object_repr(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Some(Str::object(this.repr())))
}

fn object_type_name(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Some(Str::object(this.type_name())))
}

fn object_clone(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    this.clone_object().map(Some)
}

fn object_eql(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    let equal = argv[0].as_ref().is_some_and(|other| this.equals(other));
    Ok(Some(Boolean::object(equal)))
}

/// Intern `name` and invoke it on `this`
pub fn call_method(
    this: &ObjRef,
    ev: &Evaluator,
    ns: &Nameset,
    name: &str,
    argv: &[Value],
) -> CoreResult<Value> {
    this.call_method(ev, ns, name, argv)
}
