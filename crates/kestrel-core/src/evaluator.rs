//! The evaluator: eval/apply over cons cells.
//!
//! Evaluating a non-cons object asks the object itself (literals return
//! themselves, symbols look themselves up). Evaluating a cons cell depends on
//! its kind:
//!
//! - a block evaluates each element in order and yields the last result;
//! - a normal cell evaluates its `car` to an operator and applies it to the
//!   unevaluated `cdr`. A null operator yields null.
//!
//! A cell with a monitor attached is evaluated while holding it, so a shared
//! form runs on one thread at a time. The monitor is reentrant: the thread
//! holding it may evaluate the same form again.

use std::cell::Cell;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::cons::Cons;
use crate::error::{CoreError, CoreResult};
use crate::nameset::Nameset;
use crate::object::{ObjRef, Value};
use crate::quark::Quark;

/// Evaluation context for one thread of execution
#[derive(Debug, Default)]
pub struct Evaluator {
    config: EngineConfig,
    depth: Cell<usize>,
}

/// Depth frame, released on every exit path
struct Frame<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

impl Evaluator {
    /// Create an evaluator with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an evaluator with `config`
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            depth: Cell::new(0),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current nesting of `eval` calls
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    fn enter(&self) -> CoreResult<Frame<'_>> {
        let depth = self.depth.get();
        if depth >= self.config.max_eval_depth {
            tracing::warn!(
                target: "kestrel::eval",
                limit = self.config.max_eval_depth,
                "evaluation depth exceeded"
            );
            return Err(CoreError::StackOverflow(self.config.max_eval_depth));
        }
        self.depth.set(depth + 1);
        Ok(Frame { depth: &self.depth })
    }

    /// Evaluate a form. Null evaluates to null.
    pub fn eval(&self, form: &Value, ns: &Nameset) -> CoreResult<Value> {
        let Some(object) = form else {
            return Ok(None);
        };
        let _frame = self.enter()?;
        object.eval(self, ns)
    }

    /// Evaluate a cons cell
    pub fn eval_cons(&self, cell: &Cons, ns: &Nameset) -> CoreResult<Value> {
        let _monitor = cell.monitor().map(|m| m.lock());
        if cell.is_block() {
            self.check_cycle(cell)?;
            let mut result = None;
            for form in cell.iter() {
                result = self.eval(&form, ns)?;
            }
            return Ok(result);
        }
        match self.eval(&cell.car(), ns)? {
            Some(operator) => operator.apply(self, ns, cell.cdr().as_ref()),
            None => Ok(None),
        }
    }

    /// Evaluate each element of `args` into a new list
    pub fn eval_list(&self, args: Option<&Arc<Cons>>, ns: &Nameset) -> CoreResult<Option<Arc<Cons>>> {
        Ok(Cons::from_values(self.eval_args(args, ns)?))
    }

    /// Evaluate each element of `args`
    pub fn eval_args(&self, args: Option<&Arc<Cons>>, ns: &Nameset) -> CoreResult<Vec<Value>> {
        let Some(args) = args else {
            return Ok(Vec::new());
        };
        self.check_cycle(args)?;
        args.iter().map(|form| self.eval(&form, ns)).collect()
    }

    fn check_cycle(&self, cell: &Cons) -> CoreResult<()> {
        if self.config.detect_cycles && cell.is_cyclic() {
            return Err(CoreError::CyclicList);
        }
        Ok(())
    }

    /// Invoke a method by quark
    pub fn apply_method(
        &self,
        object: &ObjRef,
        ns: &Nameset,
        quark: Quark,
        argv: &[Value],
    ) -> CoreResult<Value> {
        object.apply_method(self, ns, quark, argv)
    }

    /// Invoke a method by name
    pub fn call_method(
        &self,
        object: &ObjRef,
        ns: &Nameset,
        name: &str,
        argv: &[Value],
    ) -> CoreResult<Value> {
        object.call_method(self, ns, name, argv)
    }
}
