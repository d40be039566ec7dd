//! Closure creation, capture, and independence across execution tiers.

use pretty_assertions::assert_eq;
use stretto::{Library, Primitive, Value, ast};

const COMPILE_RUNS: usize = 16;

#[test]
fn closures_capture_their_argument_and_stay_independent() {
    let mut lib = Library::new();
    let x = ast::var("x");
    let make = lib
        .define("make", ast::lambda(&[x.clone()], ast::lambda(&[], ast::get(&x))))
        .unwrap();

    let int_closure = make.call1(Value::Int(42)).unwrap();
    let str_closure = make.call1(Value::str("hello")).unwrap();
    assert_eq!(int_closure.call0().unwrap(), Value::Int(42));
    assert_eq!(str_closure.call0().unwrap(), Value::str("hello"));
    // The two closures do not share state.
    assert_eq!(int_closure.call0().unwrap(), Value::Int(42));

    // Drive both the maker and the closures past the threshold and check
    // the same facts against compiled code.
    for _ in 0..COMPILE_RUNS {
        let c = make.call1(Value::Int(7)).unwrap();
        assert_eq!(c.call0().unwrap(), Value::Int(7));
    }
    let late = make.call1(Value::str("still works")).unwrap();
    assert_eq!(late.call0().unwrap(), Value::str("still works"));
    assert_eq!(int_closure.call0().unwrap(), Value::Int(42));
}

#[test]
fn capture_reads_the_supplier_at_creation_time() {
    // let t = x; let c = (lambda () t); set t "changed"; c
    // The closure must keep the value `t` had when it was created.
    let mut lib = Library::new();
    let x = ast::var("x");
    let t = ast::local("t");
    let c = ast::local("c");
    let body = ast::let_(
        &t,
        ast::get(&x),
        ast::let_(
            &c,
            ast::lambda(&[], ast::get(&t)),
            ast::block(vec![ast::set(&t, ast::str_("changed")), ast::get(&c)]),
        ),
    );
    let make = lib.define("snapshot", ast::lambda(&[x.clone()], body)).unwrap();
    for _ in 0..COMPILE_RUNS {
        let closure = make.call1(Value::Int(5)).unwrap();
        assert_eq!(closure.call0().unwrap(), Value::Int(5));
    }
}

#[test]
fn curried_addition_threads_captures_through_levels() {
    let mut lib = Library::new();
    let a = ast::var("a");
    let b = ast::var("b");
    let make_adder = lib
        .define(
            "make-adder",
            ast::lambda(
                &[a.clone()],
                ast::lambda(&[b.clone()], ast::prim2(Primitive::Add, ast::get(&a), ast::get(&b))),
            ),
        )
        .unwrap();
    for i in 0..COMPILE_RUNS as i64 {
        let add_i = make_adder.call1(Value::Int(i)).unwrap();
        assert_eq!(add_i.call1(Value::Int(40)).unwrap(), Value::Int(40 + i));
    }
}

#[test]
fn doubly_nested_closures_reach_the_outermost_binding() {
    // make(x) = (lambda () (lambda () x)); the innermost closure reads `x`
    // through two levels of copied variables.
    let mut lib = Library::new();
    let x = ast::var("x");
    let make = lib
        .define(
            "deep",
            ast::lambda(&[x.clone()], ast::lambda(&[], ast::lambda(&[], ast::get(&x)))),
        )
        .unwrap();
    for _ in 0..COMPILE_RUNS {
        let outer = make.call1(Value::Int(11)).unwrap();
        let inner = outer.call0().unwrap();
        assert_eq!(inner.call0().unwrap(), Value::Int(11));
    }
}

#[test]
fn immediately_invoked_lambdas_are_plain_calls() {
    // ((lambda (y) (+ y 1)) 41)
    let mut lib = Library::new();
    let y = ast::var("y");
    let f = lib
        .define(
            "iife",
            ast::lambda(
                &[],
                ast::call(
                    ast::lambda(&[y.clone()], ast::prim2(Primitive::Add, ast::get(&y), ast::int(1))),
                    vec![ast::int(41)],
                ),
            ),
        )
        .unwrap();
    for _ in 0..COMPILE_RUNS {
        assert_eq!(f.call0().unwrap(), Value::Int(42));
    }
}
