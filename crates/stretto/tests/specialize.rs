//! Behavior of the specialization guard and the square-peg recovery path.

use pretty_assertions::assert_eq;
use stretto::{Library, Primitive, Value, ast};

const COMPILE_RUNS: usize = 16;

#[test]
fn guard_routes_mismatched_arguments_through_the_generic_entry() {
    // even-ish(x) = (= x 0) specializes to int after int-only profiling, but
    // equality is generic: a string argument must keep working, through the
    // guard's generic route, with the same result the interpreter gave.
    let mut lib = Library::new();
    let x = ast::var("x");
    let is_zero = lib
        .define(
            "is-zero",
            ast::lambda(&[x.clone()], ast::prim2(Primitive::Eq, ast::get(&x), ast::int(0))),
        )
        .unwrap();
    // Profile with integers only, so the function specializes to int.
    for _ in 0..COMPILE_RUNS {
        assert_eq!(is_zero.call1(Value::Int(0)).unwrap(), Value::Bool(true));
    }
    // A string argument fails the guard and must run generically, with the
    // same result the interpreter would give.
    assert_eq!(is_zero.call1(Value::str("nope")).unwrap(), Value::Bool(false));
    assert_eq!(is_zero.call1(Value::Int(3)).unwrap(), Value::Bool(false));
}

#[test]
fn square_peg_returns_retry_with_the_original_arguments() {
    // classify(x) = (if (< x 0) "negative" x) — profiled with non-negative
    // ints it specializes to an int return; a negative argument then trips
    // the return checkpoint and must be retried generically, exactly once,
    // producing the string.
    let mut lib = Library::new();
    let x = ast::var("x");
    let classify = lib
        .define(
            "classify",
            ast::lambda(
                &[x.clone()],
                ast::if_(
                    ast::prim2(Primitive::Lt, ast::get(&x), ast::int(0)),
                    ast::str_("negative"),
                    ast::get(&x),
                ),
            ),
        )
        .unwrap();
    for i in 0..COMPILE_RUNS as i64 {
        assert_eq!(classify.call1(Value::Int(i)).unwrap(), Value::Int(i));
    }
    assert_eq!(classify.call1(Value::Int(-5)).unwrap(), Value::str("negative"));
    // And the specialized fast path still works afterwards.
    assert_eq!(classify.call1(Value::Int(5)).unwrap(), Value::Int(5));
}

#[test]
fn mutual_recursion_compiles_as_callers_and_callees() {
    // is-even/is-odd, each defined as its own unit calling the other.
    let mut lib = Library::new();
    let n = ast::var("n");
    let odd_ref = lib.self_ref("is-odd");
    let is_even = lib
        .define(
            "is-even",
            ast::lambda(
                &[n.clone()],
                ast::if_(
                    ast::prim2(Primitive::Eq, ast::get(&n), ast::int(0)),
                    ast::bool_(true),
                    ast::call(odd_ref, vec![ast::prim2(Primitive::Sub, ast::get(&n), ast::int(1))]),
                ),
            ),
        )
        .unwrap();
    let n2 = ast::var("n");
    let even_ref = lib.self_ref("is-even");
    lib.define(
        "is-odd",
        ast::lambda(
            &[n2.clone()],
            ast::if_(
                ast::prim2(Primitive::Eq, ast::get(&n2), ast::int(0)),
                ast::bool_(false),
                ast::call(even_ref, vec![ast::prim2(Primitive::Sub, ast::get(&n2), ast::int(1))]),
            ),
        ),
    )
    .unwrap();
    for _ in 0..COMPILE_RUNS {
        assert_eq!(is_even.call1(Value::Int(8)).unwrap(), Value::Bool(true));
        assert_eq!(is_even.call1(Value::Int(9)).unwrap(), Value::Bool(false));
    }
}

#[test]
fn profile_report_shows_observed_parameter_kinds() {
    let mut lib = Library::new();
    let x = ast::var("x");
    let id = lib.define("identity", ast::lambda(&[x.clone()], ast::get(&x))).unwrap();
    id.call1(Value::Int(3)).unwrap();
    id.call1(Value::Int(4)).unwrap();
    let report = id.profile_report();
    assert_eq!(report.invocations, 2);
    assert_eq!(report.params.len(), 1);
    assert_eq!(report.params[0].observed, Some(stretto::Kind::Int));

    id.call1(Value::str("mixed")).unwrap();
    let report = id.profile_report();
    assert_eq!(report.params[0].observed, Some(stretto::Kind::Ref));
}

#[test]
fn monomorphic_reference_profiles_are_detected() {
    let mut lib = Library::new();
    let x = ast::var("x");
    let id = lib.define("mono", ast::lambda(&[x.clone()], ast::get(&x))).unwrap();
    let only = Value::str("the one object");
    id.call1(only.clone()).unwrap();
    id.call1(only.clone()).unwrap();
    assert!(id.profile_report().params[0].monomorphic);
    id.call1(Value::str("another")).unwrap();
    assert!(!id.profile_report().params[0].monomorphic);
}

#[test]
fn redefinition_takes_effect_for_new_lookups() {
    let mut lib = Library::new();
    let first = lib.define("v", ast::lambda(&[], ast::int(1))).unwrap();
    let second = lib.define("v", ast::lambda(&[], ast::int(2))).unwrap();
    assert_eq!(first.call0().unwrap(), Value::Int(1));
    assert_eq!(second.call0().unwrap(), Value::Int(2));
    assert_eq!(lib.get("v").unwrap().call0().unwrap(), Value::Int(2));
}

#[test]
fn compilation_is_idempotent_under_repeated_hot_calls() {
    let mut lib = Library::new();
    let x = ast::var("x");
    let twice = lib
        .define(
            "twice",
            ast::lambda(&[x.clone()], ast::prim2(Primitive::Mul, ast::get(&x), ast::int(2))),
        )
        .unwrap();
    // Far past the threshold: the unit compiles once and every later call
    // must keep producing the same results.
    for i in 0..(COMPILE_RUNS as i64 * 8) {
        assert_eq!(twice.call1(Value::Int(i)).unwrap(), Value::Int(i * 2));
    }
}
