//! Evaluator Integration Tests
//!
//! Cons evaluation end to end: core forms, blocks, shared forms guarded by a
//! monitor, and the evaluation depth limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kestrel_core::object::repr_value;
use kestrel_core::{
    Builtin, Cons, ConsKind, CoreError, EngineConfig, Evaluator, Integer, Lexical, Nameset, ObjRef,
    Value, install_core_forms,
};

fn sym(name: &str) -> Value {
    Some(Lexical::object(name))
}

fn int(n: i64) -> Value {
    Some(Integer::object(n))
}

fn form(values: Vec<Value>) -> Value {
    Cons::from_values(values).map(ObjRef::from)
}

fn block(values: Vec<Value>) -> Value {
    Cons::list(ConsKind::Block, values).map(ObjRef::from)
}

fn core_env() -> Nameset {
    let ns = Nameset::new();
    install_core_forms(&ns);
    ns
}

// ============================================================================
// Cons Scenario
// ============================================================================

#[test]
fn test_list_of_three() {
    assert_ne!(kestrel_core::intern("add"), kestrel_core::intern("get"));

    let list = Cons::new(int(1));
    list.add(int(2)).unwrap();
    list.add(int(3)).unwrap();
    assert_eq!(list.length(), 3);
    assert_eq!(repr_value(&Some(list.clone().into())), "(1 2 3)");
    assert_eq!(Integer::from_value(&list.get(1).unwrap()).unwrap(), 2);
    assert!(matches!(
        list.get(5),
        Err(CoreError::IndexOutOfRange { index: 5, length: 3 })
    ));
    assert!(list.nth(5).is_none());
    assert_eq!(Integer::from_value(&list.car()).unwrap(), 1);
    assert_eq!(list.cdr().map(|c| c.length()), Some(2));
}

#[test]
fn test_built_with_add() {
    let list = Cons::new(int(0));
    for n in 1..100 {
        list.add(int(n)).unwrap();
    }
    assert_eq!(list.length(), 100);
    assert_eq!(list.iter().count(), 100);
    assert_eq!(Integer::from_value(&list.nth(99)).unwrap(), 99);
}

// ============================================================================
// Forms
// ============================================================================

#[test]
fn test_application_evaluates_operator_and_arguments() {
    let ev = Evaluator::new();
    let ns = core_env();
    ns.bind_name("eval-it-y", int(40));
    let sum = form(vec![sym("+"), sym("eval-it-y"), form(vec![sym("+"), int(1), int(1)])]);
    assert_eq!(Integer::from_value(&ev.eval(&sum, &ns).unwrap()).unwrap(), 42);
}

#[test]
fn test_block_runs_in_order() {
    let ev = Evaluator::new();
    let ns = core_env();
    let program = block(vec![
        form(vec![sym("const"), sym("eval-it-a"), int(1)]),
        form(vec![sym("const"), sym("eval-it-b"), form(vec![sym("+"), sym("eval-it-a"), int(10)])]),
        form(vec![sym("list"), sym("eval-it-a"), sym("eval-it-b")]),
    ]);
    let result = ev.eval(&program, &ns).unwrap();
    assert_eq!(repr_value(&result), "(1 11)");
}

#[test]
fn test_unbound_symbol_in_argument() {
    let ev = Evaluator::new();
    let ns = core_env();
    let bad = form(vec![sym("+"), int(1), sym("eval-it-missing")]);
    let err = ev.eval(&bad, &ns).unwrap_err();
    assert_eq!(err.to_string(), "unbound-symbol: eval-it-missing");
    assert_eq!(ev.depth(), 0);
}

#[test]
fn test_child_nameset_shadows() {
    let ev = Evaluator::new();
    let root = Arc::new(core_env());
    root.bind_name("eval-it-v", int(1));
    let child = Nameset::child(&root);
    child.bind_name("eval-it-v", int(2));
    let expr = form(vec![sym("+"), sym("eval-it-v"), int(0)]);
    assert_eq!(Integer::from_value(&ev.eval(&expr, &child).unwrap()).unwrap(), 2);
    assert_eq!(Integer::from_value(&ev.eval(&expr, &root).unwrap()).unwrap(), 1);
}

#[test]
fn test_cyclic_arguments_refused_unless_disabled() {
    let ev = Evaluator::new();
    let ns = core_env();
    let args = Cons::from_values([int(1)]).unwrap();
    args.set_cdr(Some(args.clone()));
    let call = Cons::pair(sym("+"), Some(args.clone()));
    assert!(matches!(
        ev.eval(&Some(call.into()), &ns),
        Err(CoreError::CyclicList)
    ));
    args.set_cdr(None);

    let lenient = Evaluator::with_config(EngineConfig::default().with_detect_cycles(false));
    let call = form(vec![sym("+"), int(1), int(2)]);
    assert_eq!(Integer::from_value(&lenient.eval(&call, &ns).unwrap()).unwrap(), 3);
}

// ============================================================================
// Depth Limit
// ============================================================================

#[test]
fn test_runaway_recursion_overflows() {
    let ev = Evaluator::with_config(EngineConfig::default().with_max_eval_depth(64));
    let ns = core_env();
    // (eval-it-loop) evaluates itself again forever
    let call = form(vec![sym("eval-it-loop")]);
    let again = call.clone();
    ns.bind_name(
        "eval-it-loop",
        Some(Builtin::special("eval-it-loop", move |ev, ns, _| ev.eval(&again, ns))),
    );
    assert!(matches!(ev.eval(&call, &ns), Err(CoreError::StackOverflow(64))));
    assert_eq!(ev.depth(), 0);

    // The evaluator is usable after the overflow
    let sum = form(vec![sym("+"), int(2), int(2)]);
    assert_eq!(Integer::from_value(&ev.eval(&sum, &ns).unwrap()).unwrap(), 4);
    ns.bind_name("eval-it-loop", None);
}

// ============================================================================
// Monitors
// ============================================================================

#[test]
fn test_synchronized_form_runs_on_one_thread_at_a_time() {
    const ROUNDS: usize = 200;

    let ns = core_env();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let (active, overlaps, calls) = (active.clone(), overlaps.clone(), calls.clone());
        ns.bind_name(
            "eval-it-guarded",
            Some(Builtin::strict("eval-it-guarded", move |_, _, _| {
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::yield_now();
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(None)
            })),
        );
    }

    let shared = Cons::list(
        ConsKind::Block,
        [form(vec![sym("eval-it-guarded")]), form(vec![sym("eval-it-guarded")])],
    )
    .unwrap();
    shared.make_synchronized();
    let shared: Value = Some(shared.into());

    std::thread::scope(|s| {
        for _ in 0..2 {
            let (ns, shared) = (&ns, &shared);
            s.spawn(move || {
                let ev = Evaluator::new();
                for _ in 0..ROUNDS {
                    ev.eval(shared, ns).unwrap();
                }
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 2 * 2 * ROUNDS);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_monitor_released_when_evaluation_fails() {
    let ns = core_env();
    let shared = Cons::list(
        ConsKind::Block,
        [form(vec![sym("+"), int(1), int(2)]), sym("eval-it-late-binding")],
    )
    .unwrap();
    shared.make_synchronized();
    let value: Value = Some(shared.clone().into());

    let err = Evaluator::new().eval(&value, &ns).unwrap_err();
    assert!(matches!(err, CoreError::UnboundSymbol(_)));

    std::thread::scope(|s| {
        s.spawn(|| {
            let monitor = shared.monitor().unwrap();
            assert!(monitor.try_lock().is_some());

            ns.bind_name("eval-it-late-binding", int(7));
            let result = Evaluator::new().eval(&value, &ns).unwrap();
            assert_eq!(repr_value(&result), "7");
        });
    });
}

#[test]
fn test_monitor_is_reentrant() {
    let ev = Evaluator::new();
    let ns = core_env();
    let entries = Arc::new(AtomicUsize::new(0));
    {
        let entries = entries.clone();
        ns.bind_name(
            "eval-it-reenter",
            Some(Builtin::special("eval-it-reenter", move |ev, ns, _| {
                if entries.fetch_add(1, Ordering::SeqCst) == 0 {
                    let again = ns.get(kestrel_core::intern("eval-it-shared"))?;
                    ev.eval(&again, ns)?;
                }
                Ok(None)
            })),
        );
    }
    let shared = Cons::block(form(vec![sym("eval-it-reenter")]));
    shared.make_synchronized();
    ns.bind_name("eval-it-shared", Some(shared.clone().into()));

    ev.eval(&Some(shared.into()), &ns).unwrap();
    assert_eq!(entries.load(Ordering::SeqCst), 2);
    ns.bind_name("eval-it-shared", None);
}
