//! End-to-end source → stdout scenarios and the negative diagnostic
//! scenarios from spec §8, driven through the public `paracl` crate API.

use std::io::Cursor;

use paracl::diagnostic::ErrorKind;
use paracl::driver::compile_source;
use paracl::vm::Vm;

fn run(source: &str, input: &str) -> String {
    let image = compile_source(source).unwrap_or_else(|errs| {
        panic!("{source:?} should compile, got: {errs:?}");
    });
    let mut output = Vec::new();
    let mut vm = Vm::new(image, Cursor::new(input.as_bytes().to_vec()), &mut output);
    vm.run_to_completion()
        .unwrap_or_else(|err| panic!("{source:?} should run cleanly, got: {err}"));
    String::from_utf8(output).unwrap()
}

#[test]
fn scenario_1_operator_precedence() {
    assert_eq!(run("print 2 + 3 * 4;", ""), "14\n");
}

#[test]
fn scenario_2_assignment_and_rebinding() {
    assert_eq!(
        run("a = 10; b = a; a = a + 1; print a; print b;", ""),
        "11\n10\n"
    );
}

#[test]
fn scenario_3_while_accumulator() {
    assert_eq!(
        run(
            "i = 0; s = 0; while (i < 5) { s = s + i; i = i + 1; } print s;",
            ""
        ),
        "10\n"
    );
}

#[test]
fn scenario_4_input_driven_branch() {
    assert_eq!(
        run("x = ?; if (x > 0) print x; else print -x;", "-7"),
        "7\n"
    );
}

#[test]
fn scenario_5_break_stops_loop_at_five() {
    assert_eq!(
        run(
            "i = 0; while (i < 10) { if (i == 5) break; i = i + 1; } print i;",
            ""
        ),
        "5\n"
    );
}

#[test]
fn scenario_6_continue_skips_one_addend() {
    assert_eq!(
        run(
            "i = 0; sum = 0; while (i < 5) { i = i + 1; if (i == 3) continue; sum = sum + i; } print sum;",
            ""
        ),
        "12\n"
    );
}

#[test]
fn negative_undeclared_identifier() {
    let errs = compile_source("print undefined;").unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].kind, ErrorKind::UndeclaredIdentifier);
    assert_eq!(errs[0].detail, "undefined");
}

#[test]
fn negative_break_outside_loop() {
    let errs = compile_source("break;").unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].kind, ErrorKind::OutOfLoopStatement);
}

#[test]
fn negative_unassignable_literal() {
    // `x` is pre-declared so the RHS analyzes clean, isolating the single
    // `UnassignableExpression` the literal target produces.
    let errs = compile_source("x = 0; 5 = x;").unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].kind, ErrorKind::UnassignableExpression);
    assert_eq!(errs[0].detail, "5");
}

#[test]
fn determinism_same_source_same_input_same_output() {
    let source = "i = 0; s = 0; while (i < 100) { s = s + i; i = i + 1; } print s;";
    let first = run(source, "");
    let second = run(source, "");
    assert_eq!(first, second);
    assert_eq!(first, "4950\n");
}

#[test]
fn assignment_in_nested_block_binds_to_the_enclosing_declaration() {
    // `x` is already live in the outer scope when the block is analyzed, so
    // `x = 2` rebinds that same declaration rather than shadowing it — this
    // language has no block-scoped shadowing, only first-assignment scoping.
    let output = run(
        "x = 1; { x = 2; print x; } print x;",
        "",
    );
    assert_eq!(output, "2\n2\n");
}
