//! Self-evaluating literal objects: integers, booleans and strings.
//!
//! Literals evaluate to themselves. Their state sits behind an
//! [`ObjectCell`] so that deserialization can fill in a freshly constructed
//! instance.

use std::sync::LazyLock;

use crate::dispatch::{Arity, MethodTable};
use crate::error::{CoreError, CoreResult, SerialResult};
use crate::evaluator::Evaluator;
use crate::nameset::Nameset;
use crate::object::{OBJECT_METHODS, ObjRef, Object, Value};
use crate::object_cell::ObjectCell;
use crate::serial::{CORE_FAMILY, Serial, core_sid, wire};
use crate::stream::{InputStream, OutputStream};

/// Dispatch table shared by all literals
pub static LITERAL_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("Literal")
        .parent(&OBJECT_METHODS)
        .method("to-string", Arity::Exact(0), literal_to_string)
        .build()
});

fn literal_to_string(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    let text = match this.downcast_ref::<Str>() {
        Some(s) => s.to_string(),
        None => this.repr(),
    };
    Ok(Some(Str::object(text)))
}

fn type_mismatch(expected: &str, value: &Value) -> CoreError {
    let found = value.as_ref().map_or("nil", |v| v.type_name());
    CoreError::type_error(format!("expected {expected}, got {found}"))
}

// ============================================================================
// Integer
// ============================================================================

/// 64-bit signed integer
#[derive(Debug, Default)]
pub struct Integer {
    value: ObjectCell<i64>,
}

impl Integer {
    /// Create an integer
    pub fn new(value: i64) -> Self {
        Self {
            value: ObjectCell::new(value),
        }
    }

    /// Create an integer object
    pub fn object(value: i64) -> ObjRef {
        ObjRef::new(Self::new(value))
    }

    /// Current value
    pub fn value(&self) -> i64 {
        *self.value.read()
    }

    /// Extract an `i64` from a value
    pub fn from_value(value: &Value) -> CoreResult<i64> {
        value
            .as_ref()
            .and_then(|v| v.downcast_ref::<Integer>())
            .map(Integer::value)
            .ok_or_else(|| type_mismatch("Integer", value))
    }
}

static INTEGER_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("Integer")
        .parent(&LITERAL_METHODS)
        .method("add", Arity::Exact(1), integer_add)
        .method("sub", Arity::Exact(1), integer_sub)
        .method("mul", Arity::Exact(1), integer_mul)
        .method("zero-p", Arity::Exact(0), integer_zero_p)
        .build()
});

fn integer_binary(
    this: &ObjRef,
    argv: &[Value],
    name: &str,
    op: fn(i64, i64) -> Option<i64>,
) -> CoreResult<Value> {
    let lhs = Integer::from_value(&Some(this.clone()))?;
    let rhs = Integer::from_value(&argv[0])?;
    op(lhs, rhs)
        .map(|n| Some(Integer::object(n)))
        .ok_or_else(|| CoreError::type_error(format!("integer overflow in {name}")))
}

fn integer_add(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    integer_binary(this, argv, "add", i64::checked_add)
}

fn integer_sub(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    integer_binary(this, argv, "sub", i64::checked_sub)
}

fn integer_mul(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    integer_binary(this, argv, "mul", i64::checked_mul)
}

fn integer_zero_p(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    let n = Integer::from_value(&Some(this.clone()))?;
    Ok(Some(Boolean::object(n == 0)))
}

impl Object for Integer {
    fn type_name(&self) -> &'static str {
        "Integer"
    }

    fn method_table(&self) -> &'static MethodTable {
        &INTEGER_METHODS
    }

    fn repr(&self) -> String {
        self.value().to_string()
    }

    fn clone_object(&self) -> CoreResult<ObjRef> {
        Ok(Integer::object(self.value()))
    }

    fn equals(&self, other: &dyn Object) -> bool {
        other
            .as_any()
            .downcast_ref::<Integer>()
            .is_some_and(|o| o.value() == self.value())
    }

    fn as_serial(&self) -> Option<&dyn Serial> {
        Some(self)
    }
}

impl Serial for Integer {
    fn serial_did(&self) -> u16 {
        CORE_FAMILY
    }

    fn serial_sid(&self) -> u16 {
        core_sid::INTEGER
    }

    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        wire::write_i64(out, self.value())
    }

    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        let value = wire::read_i64(input)?;
        *self.value.write() = value;
        Ok(())
    }
}

// ============================================================================
// Boolean
// ============================================================================

/// Boolean
#[derive(Debug, Default)]
pub struct Boolean {
    value: ObjectCell<bool>,
}

impl Boolean {
    /// Create a boolean
    pub fn new(value: bool) -> Self {
        Self {
            value: ObjectCell::new(value),
        }
    }

    /// Create a boolean object
    pub fn object(value: bool) -> ObjRef {
        ObjRef::new(Self::new(value))
    }

    /// Current value
    pub fn value(&self) -> bool {
        *self.value.read()
    }

    /// Extract a `bool` from a value
    pub fn from_value(value: &Value) -> CoreResult<bool> {
        value
            .as_ref()
            .and_then(|v| v.downcast_ref::<Boolean>())
            .map(Boolean::value)
            .ok_or_else(|| type_mismatch("Boolean", value))
    }
}

static BOOLEAN_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("Boolean")
        .parent(&LITERAL_METHODS)
        .method("not", Arity::Exact(0), boolean_not)
        .build()
});

fn boolean_not(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    let b = Boolean::from_value(&Some(this.clone()))?;
    Ok(Some(Boolean::object(!b)))
}

impl Object for Boolean {
    fn type_name(&self) -> &'static str {
        "Boolean"
    }

    fn method_table(&self) -> &'static MethodTable {
        &BOOLEAN_METHODS
    }

    fn repr(&self) -> String {
        self.value().to_string()
    }

    fn clone_object(&self) -> CoreResult<ObjRef> {
        Ok(Boolean::object(self.value()))
    }

    fn equals(&self, other: &dyn Object) -> bool {
        other
            .as_any()
            .downcast_ref::<Boolean>()
            .is_some_and(|o| o.value() == self.value())
    }

    fn as_serial(&self) -> Option<&dyn Serial> {
        Some(self)
    }
}

impl Serial for Boolean {
    fn serial_did(&self) -> u16 {
        CORE_FAMILY
    }

    fn serial_sid(&self) -> u16 {
        core_sid::BOOLEAN
    }

    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        wire::write_bool(out, self.value())
    }

    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        let value = wire::read_bool(input)?;
        *self.value.write() = value;
        Ok(())
    }
}

// ============================================================================
// Str
// ============================================================================

/// UTF-8 string
#[derive(Debug, Default)]
pub struct Str {
    value: ObjectCell<String>,
}

impl Str {
    /// Create a string
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: ObjectCell::new(value.into()),
        }
    }

    /// Create a string object
    pub fn object(value: impl Into<String>) -> ObjRef {
        ObjRef::new(Self::new(value))
    }

    /// Borrow the text under the read lock
    pub fn as_str(&self) -> crate::object_cell::ObjectCellRef<'_, String> {
        self.value.read()
    }

    /// Number of characters
    pub fn char_count(&self) -> usize {
        self.value.with_read(|s| s.chars().count())
    }

    /// Extract a copy of the text from a value
    pub fn from_value(value: &Value) -> CoreResult<String> {
        value
            .as_ref()
            .and_then(|v| v.downcast_ref::<Str>())
            .map(|s| s.to_string())
            .ok_or_else(|| type_mismatch("String", value))
    }
}

impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

static STRING_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("String")
        .parent(&LITERAL_METHODS)
        .method("length", Arity::Exact(0), string_length)
        .method("concat", Arity::AtLeast(1), string_concat)
        .build()
});

fn string_length(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    let s = Str::from_value(&Some(this.clone()))?;
    Ok(Some(Integer::object(s.chars().count() as i64)))
}

fn string_concat(this: &ObjRef, _: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    let mut result = Str::from_value(&Some(this.clone()))?;
    for arg in argv {
        result.push_str(&Str::from_value(arg)?);
    }
    Ok(Some(Str::object(result)))
}

impl Object for Str {
    fn type_name(&self) -> &'static str {
        "String"
    }

    fn method_table(&self) -> &'static MethodTable {
        &STRING_METHODS
    }

    fn repr(&self) -> String {
        let text = self.as_str();
        let mut out = String::with_capacity(text.len() + 2);
        out.push('"');
        for ch in text.chars() {
            match ch {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }

    fn clone_object(&self) -> CoreResult<ObjRef> {
        Ok(Str::object(self.to_string()))
    }

    fn equals(&self, other: &dyn Object) -> bool {
        other
            .as_any()
            .downcast_ref::<Str>()
            .is_some_and(|o| *o.as_str() == *self.as_str())
    }

    fn as_serial(&self) -> Option<&dyn Serial> {
        Some(self)
    }
}

impl Serial for Str {
    fn serial_did(&self) -> u16 {
        CORE_FAMILY
    }

    fn serial_sid(&self) -> u16 {
        core_sid::STRING
    }

    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        wire::write_string(out, &self.as_str())
    }

    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        let value = wire::read_string(input)?;
        *self.value.write() = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::call_method;

    #[test]
    fn test_integer_methods() {
        let ev = Evaluator::new();
        let ns = Nameset::new();
        let five = Integer::object(5);

        let sum = call_method(&five, &ev, &ns, "add", &[Some(Integer::object(3))]).unwrap();
        assert_eq!(Integer::from_value(&sum).unwrap(), 8);

        let diff = call_method(&five, &ev, &ns, "sub", &[Some(Integer::object(7))]).unwrap();
        assert_eq!(Integer::from_value(&diff).unwrap(), -2);

        let zero = call_method(&Integer::object(0), &ev, &ns, "zero-p", &[]).unwrap();
        assert!(Boolean::from_value(&zero).unwrap());
    }

    #[test]
    fn test_integer_overflow() {
        let ev = Evaluator::new();
        let ns = Nameset::new();
        let max = Integer::object(i64::MAX);
        let err = call_method(&max, &ev, &ns, "add", &[Some(Integer::object(1))]).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn test_integer_rejects_wrong_type() {
        let ev = Evaluator::new();
        let ns = Nameset::new();
        let err = call_method(&Integer::object(1), &ev, &ns, "add", &[Some(Str::object("x"))])
            .unwrap_err();
        assert_eq!(err.to_string(), "type-error: expected Integer, got String");
        let err = call_method(&Integer::object(1), &ev, &ns, "add", &[None]).unwrap_err();
        assert_eq!(err.to_string(), "type-error: expected Integer, got nil");
    }

    #[test]
    fn test_arity_checked() {
        let ev = Evaluator::new();
        let ns = Nameset::new();
        let err = call_method(&Integer::object(1), &ev, &ns, "add", &[]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Arity { expected: Arity::Exact(1), got: 0, .. }
        ));
    }

    #[test]
    fn test_literal_inheritance() {
        let ev = Evaluator::new();
        let ns = Nameset::new();
        let to_string = crate::quark::intern("to-string");
        let flag = Boolean::object(true);
        assert!(flag.is_quark(to_string, true));
        assert!(!flag.is_quark(to_string, false));
        let text = call_method(&flag, &ev, &ns, "to-string", &[]).unwrap();
        assert_eq!(Str::from_value(&text).unwrap(), "true");

        let negated = call_method(&flag, &ev, &ns, "not", &[]).unwrap();
        assert!(!Boolean::from_value(&negated).unwrap());
    }

    #[test]
    fn test_string_methods() {
        let ev = Evaluator::new();
        let ns = Nameset::new();
        let s = Str::object("héllo");
        let len = call_method(&s, &ev, &ns, "length", &[]).unwrap();
        assert_eq!(Integer::from_value(&len).unwrap(), 5);

        let joined = call_method(
            &s,
            &ev,
            &ns,
            "concat",
            &[Some(Str::object(", ")), Some(Str::object("world"))],
        )
        .unwrap();
        assert_eq!(Str::from_value(&joined).unwrap(), "héllo, world");

        let raw = call_method(&Str::object("a\"b"), &ev, &ns, "to-string", &[]).unwrap();
        assert_eq!(Str::from_value(&raw).unwrap(), "a\"b");
    }

    #[test]
    fn test_repr_and_equality() {
        assert_eq!(Str::object("a\"b\n").repr(), "\"a\\\"b\\n\"");
        assert_eq!(Integer::object(-3).repr(), "-3");
        assert_eq!(Boolean::object(false).repr(), "false");
        assert!(Integer::object(4).equals(&Integer::object(4)));
        assert!(!Integer::object(4).equals(&Str::object("4")));
        assert!(Str::object("x").equals(&Str::object("x")));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Integer::object(10);
        let copy = original.clone_object().unwrap();
        assert!(!copy.ptr_eq(&original));
        assert!(copy.equals(&original));
        assert_eq!(original.ref_count(), 1);
    }
}
