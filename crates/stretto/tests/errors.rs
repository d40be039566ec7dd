//! The user-visible failure surfaces: definition-time compile errors and
//! runtime errors, in every tier.

use pretty_assertions::assert_eq;
use stretto::{CompileError, Error, Kind, Library, Primitive, Value, ast};

#[test]
fn unbound_variables_are_rejected_at_definition() {
    let mut lib = Library::new();
    let ghost = ast::var("ghost");
    let err = lib.define("bad", ast::lambda(&[], ast::get(&ghost))).unwrap_err();
    assert_eq!(
        err,
        Error::Compile(CompileError::UnboundVariable("ghost".to_owned()))
    );
}

#[test]
fn shadowing_is_rejected_at_definition() {
    let mut lib = Library::new();
    let x = ast::var("x");
    let inner = ast::local("x");
    let err = lib
        .define(
            "bad-shadow",
            ast::lambda(&[x.clone()], ast::let_(&inner, ast::int(1), ast::get(&inner))),
        )
        .unwrap_err();
    assert_eq!(
        err,
        Error::Compile(CompileError::ShadowedVariable("x".to_owned()))
    );
}

#[test]
fn call_targets_must_be_closures_or_function_references() {
    let mut lib = Library::new();
    let err = lib
        .define("bad-call", ast::lambda(&[], ast::call(ast::int(3), vec![])))
        .unwrap_err();
    assert_eq!(err, Error::Compile(CompileError::UnexpectedCallTarget));
}

#[test]
fn non_lambda_definitions_are_rejected() {
    let mut lib = Library::new();
    let err = lib.define("just-a-number", ast::int(3)).unwrap_err();
    assert_eq!(err, Error::Compile(CompileError::NotALambda));
}

#[test]
fn host_level_invocation_of_non_callables_raises() {
    let err = Value::Int(3).call1(Value::Int(4)).unwrap_err();
    assert_eq!(err.to_string(), "value of kind `int` is not callable");
}

#[test]
fn arity_mismatches_raise() {
    let mut lib = Library::new();
    let f = lib.define("nullary", ast::lambda(&[], ast::int(1))).unwrap();
    let err = f.call1(Value::Int(9)).unwrap_err();
    assert_eq!(err.to_string(), "`nullary` takes 0 argument(s), got 1");
}

#[test]
fn calling_an_undefined_reference_raises() {
    let mut lib = Library::new();
    let missing = lib.self_ref("missing");
    let f = lib
        .define("calls-missing", ast::lambda(&[], ast::call(missing, vec![])))
        .unwrap();
    let err = f.call0().unwrap_err();
    assert_eq!(err.to_string(), "called function was never defined");
}

#[test]
fn while_conditions_must_be_boolean_at_runtime() {
    let mut lib = Library::new();
    let f = lib
        .define("bad-while", ast::lambda(&[], ast::while_(ast::str_("loop?"), ast::int(1))))
        .unwrap();
    let err = f.call0().unwrap_err();
    assert_eq!(err.to_string(), "condition must be a boolean, got `ref`");
}

#[test]
fn statically_bad_conditions_surface_when_compilation_trips() {
    // The condition is an integer constant: every interpreted call raises a
    // runtime error, and the call that crosses the threshold surfaces the
    // inferencer's compile error instead. The unit stays on the plain
    // interpreter afterwards.
    let mut lib = Library::new();
    let f = lib
        .define(
            "bad-cond",
            ast::lambda(&[], ast::if_(ast::int(1), ast::int(2), ast::int(3))),
        )
        .unwrap();
    for _ in 0..9 {
        let err = f.call0().unwrap_err();
        assert!(matches!(err, Error::Runtime(_)), "expected runtime error, got {err}");
    }
    let err = f.call0().unwrap_err();
    assert_eq!(err, Error::Compile(CompileError::BadConditionType(Kind::Int)));
    let err = f.call0().unwrap_err();
    assert!(matches!(err, Error::Runtime(_)), "expected runtime error, got {err}");
}

#[test]
fn runaway_recursion_is_bounded() {
    let mut lib = Library::new();
    let n = ast::var("n");
    let this = lib.self_ref("forever");
    let f = lib
        .define(
            "forever",
            ast::lambda(
                &[n.clone()],
                ast::call(this, vec![ast::prim2(Primitive::Add, ast::get(&n), ast::int(1))]),
            ),
        )
        .unwrap();
    let err = f.call1(Value::Int(0)).unwrap_err();
    assert_eq!(err.to_string(), "maximum call depth exceeded");
}

#[test]
fn primitive_kind_errors_carry_both_operand_kinds() {
    let mut lib = Library::new();
    let x = ast::var("x");
    let f = lib
        .define(
            "add-one",
            ast::lambda(&[x.clone()], ast::prim2(Primitive::Add, ast::get(&x), ast::int(1))),
        )
        .unwrap();
    let err = f.call1(Value::Bool(true)).unwrap_err();
    assert_eq!(err.to_string(), "`+` expects integer operands, got `bool` and `int`");
}
