//! Live functions re-run their bodies when a call site re-runs, and a
//! root return resolves to a value the embedder can see.

use reflex::ast::{BinaryOp, build};
use reflex::testing::TestProgram;
use reflex::value::Value;

fn globals(n: f64) -> Value {
    Value::object([
        ("x", Value::object([("n", Value::Number(n))])),
        ("out", Value::object([] as [(&str, Value); 0])),
    ])
}

fn doubler_program() -> reflex::ast::Program {
    // function double(n) { return n * 2 }
    // out.d = double(x.n);
    build::program(vec![
        build::function_decl(
            "double",
            vec![build::pat_ident("n")],
            vec![build::return_(Some(build::binary(
                BinaryOp::Mul,
                build::ident("n"),
                build::num(2.0),
            )))],
        ),
        build::member_assign_stmt(
            build::path(&["out", "d"]),
            build::call(build::ident("double"), vec![build::path(&["x", "n"])]),
        ),
    ])
}

#[test]
fn cold_run_calls_through() {
    let t = TestProgram::run(&doubler_program(), globals(3.0));
    t.assert_eq("out.d", Value::Number(6.0));
}

#[test]
fn an_argument_change_reruns_the_call_site() {
    let t = TestProgram::run(&doubler_program(), globals(3.0));

    t.mutate("x.n", Value::Number(5.0));
    t.assert_eq("out.d", Value::Number(10.0));
    assert_eq!(t.reruns().len(), 1);
}

#[test]
fn a_root_return_yields_the_cold_run_value() {
    // return x.n * 2;
    let program = build::program(vec![build::return_(Some(build::binary(
        BinaryOp::Mul,
        build::path(&["x", "n"]),
        build::num(2.0),
    )))]);
    let (t, result) = TestProgram::run_with_result(&program, globals(3.0));
    assert_eq!(result, Value::Number(6.0));

    let rethreaded = t.mutate("x.n", Value::Number(10.0));
    assert_eq!(rethreaded, Some(Value::Number(20.0)));
}
