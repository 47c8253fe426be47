//! Symbols resolved against the evaluation environment.

use std::sync::LazyLock;

use crate::dispatch::{Arity, MethodTable};
use crate::error::{CoreResult, SerialResult};
use crate::evaluator::Evaluator;
use crate::literal::Str;
use crate::nameset::Nameset;
use crate::object::{OBJECT_METHODS, ObjRef, Object, Value};
use crate::object_cell::ObjectCell;
use crate::quark::{self, Quark};
use crate::serial::{CORE_FAMILY, Serial, core_sid, wire};
use crate::stream::{InputStream, OutputStream};

/// A symbol. Evaluates to its binding in the current nameset.
#[derive(Debug)]
pub struct Lexical {
    quark: ObjectCell<Quark>,
}

impl Lexical {
    /// Create a symbol for `name`
    pub fn new(name: &str) -> Self {
        Self {
            quark: ObjectCell::new(quark::intern(name)),
        }
    }

    /// Create a symbol object for `name`
    pub fn object(name: &str) -> ObjRef {
        ObjRef::new(Self::new(name))
    }

    /// Interned name
    pub fn quark(&self) -> Quark {
        *self.quark.read()
    }
}

static LEXICAL_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("Lexical")
        .parent(&OBJECT_METHODS)
        .method("symbol-name", Arity::Exact(0), lexical_symbol_name)
        .build()
});

fn lexical_symbol_name(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Some(Str::object(this.repr())))
}

impl Object for Lexical {
    fn type_name(&self) -> &'static str {
        "Lexical"
    }

    fn method_table(&self) -> &'static MethodTable {
        &LEXICAL_METHODS
    }

    fn repr(&self) -> String {
        self.quark().to_string()
    }

    fn clone_object(&self) -> CoreResult<ObjRef> {
        Ok(ObjRef::new(Self {
            quark: ObjectCell::new(self.quark()),
        }))
    }

    fn equals(&self, other: &dyn Object) -> bool {
        other
            .as_any()
            .downcast_ref::<Lexical>()
            .is_some_and(|o| o.quark() == self.quark())
    }

    fn eval(&self, _this: &ObjRef, _ev: &Evaluator, ns: &Nameset) -> CoreResult<Value> {
        ns.get(self.quark())
    }

    fn as_serial(&self) -> Option<&dyn Serial> {
        Some(self)
    }
}

// Quark ids are process-local, so the name goes on the wire
impl Serial for Lexical {
    fn serial_did(&self) -> u16 {
        CORE_FAMILY
    }

    fn serial_sid(&self) -> u16 {
        core_sid::LEXICAL
    }

    fn write_state(&self, out: &mut dyn OutputStream) -> SerialResult<()> {
        wire::write_string(out, &self.repr())
    }

    fn read_state(&self, input: &mut dyn InputStream) -> SerialResult<()> {
        let name = wire::read_string(input)?;
        *self.quark.write() = quark::intern(&name);
        Ok(())
    }
}
