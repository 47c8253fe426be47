//! Native functions callable from evaluated code.
//!
//! A special builtin receives its argument forms unevaluated and decides
//! what to evaluate (`quote`, `if`). A strict builtin receives the evaluated
//! arguments.

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::cons::Cons;
use crate::dispatch::{Arity, MethodTable};
use crate::error::{CoreError, CoreResult};
use crate::evaluator::Evaluator;
use crate::lexical::Lexical;
use crate::literal::{Boolean, Integer, Str};
use crate::nameset::Nameset;
use crate::object::{OBJECT_METHODS, ObjRef, Object, Value};
use crate::quark::{self, Quark};

/// Function receiving unevaluated argument forms
pub type NativeFn =
    Arc<dyn Fn(&Evaluator, &Nameset, Option<&Arc<Cons>>) -> CoreResult<Value> + Send + Sync>;

/// Function receiving evaluated arguments
pub type StrictFn = Arc<dyn Fn(&Evaluator, &Nameset, &[Value]) -> CoreResult<Value> + Send + Sync>;

#[derive(Clone)]
enum Body {
    Special(NativeFn),
    Strict(StrictFn),
}

/// A named native function
#[derive(Clone)]
pub struct Builtin {
    name: Quark,
    body: Body,
}

impl Builtin {
    /// Builtin that receives its argument forms unevaluated
    pub fn special<F>(name: &str, f: F) -> ObjRef
    where
        F: Fn(&Evaluator, &Nameset, Option<&Arc<Cons>>) -> CoreResult<Value> + Send + Sync + 'static,
    {
        ObjRef::new(Self {
            name: quark::intern(name),
            body: Body::Special(Arc::new(f)),
        })
    }

    /// Builtin that receives evaluated arguments
    pub fn strict<F>(name: &str, f: F) -> ObjRef
    where
        F: Fn(&Evaluator, &Nameset, &[Value]) -> CoreResult<Value> + Send + Sync + 'static,
    {
        ObjRef::new(Self {
            name: quark::intern(name),
            body: Body::Strict(Arc::new(f)),
        })
    }

    /// Function name
    pub fn name(&self) -> Quark {
        self.name
    }

    /// Whether arguments arrive unevaluated
    pub fn is_special(&self) -> bool {
        matches!(self.body, Body::Special(_))
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name.to_string())
            .field("special", &self.is_special())
            .finish()
    }
}

static BUILTIN_METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    MethodTable::builder("Builtin")
        .parent(&OBJECT_METHODS)
        .method("name", Arity::Exact(0), builtin_name)
        .method("special-p", Arity::Exact(0), builtin_special_p)
        .build()
});

fn receiver(this: &ObjRef) -> CoreResult<&Builtin> {
    this.downcast_ref::<Builtin>()
        .ok_or_else(|| CoreError::type_error(format!("expected Builtin, got {}", this.type_name())))
}

fn builtin_name(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Some(Str::object(receiver(this)?.name.to_string())))
}

fn builtin_special_p(this: &ObjRef, _: &Evaluator, _: &Nameset, _: &[Value]) -> CoreResult<Value> {
    Ok(Some(Boolean::object(receiver(this)?.is_special())))
}

impl Object for Builtin {
    fn type_name(&self) -> &'static str {
        "Builtin"
    }

    fn method_table(&self) -> &'static MethodTable {
        &BUILTIN_METHODS
    }

    fn repr(&self) -> String {
        format!("<builtin {}>", self.name)
    }

    fn clone_object(&self) -> CoreResult<ObjRef> {
        Ok(ObjRef::new(self.clone()))
    }

    fn apply(
        &self,
        _this: &ObjRef,
        ev: &Evaluator,
        ns: &Nameset,
        args: Option<&Arc<Cons>>,
    ) -> CoreResult<Value> {
        match &self.body {
            Body::Special(f) => f(ev, ns, args),
            Body::Strict(f) => {
                let argv = ev.eval_args(args, ns)?;
                f(ev, ns, &argv)
            }
        }
    }
}

// ============================================================================
// Core forms
// ============================================================================

/// Unevaluated argument forms, checked against `arity`
fn forms(name: &str, args: Option<&Arc<Cons>>, arity: Arity) -> CoreResult<Vec<Value>> {
    let forms = args.map(|a| a.to_vec()).unwrap_or_default();
    if !arity.accepts(forms.len()) {
        return Err(CoreError::Arity {
            method: name.to_string(),
            expected: arity,
            got: forms.len(),
        });
    }
    Ok(forms)
}

/// Truth test: everything except null and `false` is true
pub fn is_truthy(value: &Value) -> bool {
    match value {
        None => false,
        Some(object) => object
            .downcast_ref::<Boolean>()
            .is_none_or(|b| b.value()),
    }
}

fn quote(_: &Evaluator, _: &Nameset, args: Option<&Arc<Cons>>) -> CoreResult<Value> {
    let mut forms = forms("quote", args, Arity::Exact(1))?;
    Ok(forms.swap_remove(0))
}

fn if_form(ev: &Evaluator, ns: &Nameset, args: Option<&Arc<Cons>>) -> CoreResult<Value> {
    let forms = forms("if", args, Arity::Between(2, 3))?;
    if is_truthy(&ev.eval(&forms[0], ns)?) {
        ev.eval(&forms[1], ns)
    } else {
        match forms.get(2) {
            Some(alternative) => ev.eval(alternative, ns),
            None => Ok(None),
        }
    }
}

fn const_form(ev: &Evaluator, ns: &Nameset, args: Option<&Arc<Cons>>) -> CoreResult<Value> {
    let forms = forms("const", args, Arity::Exact(2))?;
    let symbol = forms[0]
        .as_ref()
        .and_then(|f| f.downcast_ref::<Lexical>())
        .map(Lexical::quark)
        .ok_or_else(|| CoreError::type_error("const expects a symbol to bind"))?;
    let value = ev.eval(&forms[1], ns)?;
    ns.bind(symbol, value.clone());
    Ok(value)
}

fn list(_: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    Ok(Cons::from_values(argv.iter().cloned()).map(ObjRef::from))
}

fn sum(_: &Evaluator, _: &Nameset, argv: &[Value]) -> CoreResult<Value> {
    let mut total: i64 = 0;
    for arg in argv {
        total = total
            .checked_add(Integer::from_value(arg)?)
            .ok_or_else(|| CoreError::type_error("integer overflow in +"))?;
    }
    Ok(Some(Integer::object(total)))
}

/// Bind the core forms in `ns`: `quote`, `if`, `const`, `list` and `+`
pub fn install_core_forms(ns: &Nameset) {
    ns.bind_name("quote", Some(Builtin::special("quote", quote)));
    ns.bind_name("if", Some(Builtin::special("if", if_form)));
    ns.bind_name("const", Some(Builtin::special("const", const_form)));
    ns.bind_name("list", Some(Builtin::strict("list", list)));
    ns.bind_name("+", Some(Builtin::strict("+", sum)));
    tracing::debug!(target: "kestrel::eval", bindings = ns.len(), "core forms installed");
}
