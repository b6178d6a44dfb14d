//! Snippet tests for the whole compiler pipeline: source
//! text in, printed IR (or a diagnostic) out.

use grackle::{compiler, common::ErrorKind, lower::Program, Source};

/// Compiles a snippet to a verified, printed module.
fn compile(source: &str) -> Program {
    let ast = compiler::parse(Source::source(source))
        .unwrap_or_else(|e| panic!("parse failed: {}", e));
    let program = Program::create(&ast, "snippet")
        .unwrap_or_else(|e| panic!("lowering failed: {}", e));
    if let Err(e) = program.verify() {
        panic!("verifier rejected:\n{}\n{}", program.irgen(), e);
    }
    program
}

fn ir(source: &str) -> String {
    compile(source).irgen()
}

/// Lowers a snippet expecting a translate error, and
/// returns it.
fn translate_error(source: &str) -> grackle::Error {
    let ast = compiler::parse(Source::source(source)).expect("snippet should parse");
    match Program::create(&ast, "snippet") {
        Ok(program) => panic!("expected an error, got:\n{}", program.irgen()),
        Err(e) => e,
    }
}

#[test]
fn identity_function_keeps_declared_types() {
    let text = ir("(){ id = (x#type:i32){|> x;}#rettype:i32; |> id(42); }");
    // the eager path materializes exactly the written
    // signature and the call feeds it the literal
    assert!(text.contains("(i32 42)"), "{}", text);
    assert!(text.contains("define i32"), "{}", text);
}

#[test]
fn eager_parameters_match_attributes_in_order() {
    let text =
        ir("(){ f = (x#type:i32, y#type:double){|> y;}#rettype:double; |> f(1, 2.5); }");
    assert!(text.contains("(i32 %0, double %1)"), "{}", text);
}

#[test]
fn variable_assignment_and_addition() {
    let text = ir("(){ test = 1; |> test + 1; }");
    assert!(text.contains("%test = alloca i32"), "{}", text);
    assert!(text.contains("store i32 1, i32* %test"), "{}", text);
    assert!(text.contains("add i32"), "{}", text);
    assert!(text.contains("ret i32"), "{}", text);
}

#[test]
fn array_indexing_through_constant_index() {
    let text = ir("(){ a = [10, 20, 30]; |> a[1]; }");
    assert!(text.contains("alloca [3 x i32]"), "{}", text);
    assert!(
        text.contains("getelementptr inbounds [3 x i32]"),
        "{}",
        text
    );
    assert!(text.contains("ret i32"), "{}", text);
}

#[test]
fn constant_index_out_of_range_is_an_error() {
    let e = translate_error("(){ a = [10, 20, 30]; |> a[3]; }");
    assert_eq!(e.kind, ErrorKind::Translate);
    assert!(e.message.contains("Index 3 is out of range"), "{}", e);
}

#[test]
fn structure_method_receives_the_receiver_last() {
    let text = ir("(){ s = [add: (x, y){|> x + y;}]; |> s.:add(3, 4); }");
    // the materialized method takes (x, y, receiver)
    assert!(text.contains("i32 %0, i32 %1"), "{}", text);
    assert!(text.contains("call i32"), "{}", text);
    assert!(text.contains("(i32 3, i32 4,"), "{}", text);
}

#[test]
fn operator_overload_on_structure_receiver() {
    let text = ir("(){ s = [+: (a, b){|> a + 100;}]; |> s + 3; }");
    assert!(text.contains("call i32"), "{}", text);
    // and the primitive lowering still runs inside the
    // method body
    assert!(text.contains("add i32"), "{}", text);
}

#[test]
fn conditional_value_branches_route_through_a_slot() {
    let text = ir("(){ |> 1 < 2 ? 100 : 200; }");
    assert!(text.contains("icmp slt i32 1, 2"), "{}", text);
    assert!(text.contains("br i1"), "{}", text);
    assert!(text.contains("store i32 100"), "{}", text);
    assert!(text.contains("store i32 200"), "{}", text);
    assert!(text.contains("ret i32"), "{}", text);
}

#[test]
fn conditional_scope_branches_that_both_return_have_no_merge() {
    let text = ir("(){ 1 > 2 ? {|> 10;} : {|> 20;}; }");
    assert!(text.contains("br i1"), "{}", text);
    // both arms terminate, so no plain branch (and no
    // merge block) survives
    assert!(!text.contains("br label"), "{}", text);
}

#[test]
fn conditional_scope_branches_that_fall_through_merge() {
    let text = ir("(){ c = 1 < 2; c ? { x = 1; } : { y = 2; }; |> 3; }");
    let merges = text.matches("br label").count();
    assert!(merges >= 2, "expected two merge branches:\n{}", text);
}

#[test]
fn scope_call_lands_as_blocks() {
    let text = ir("(){ sc = { 1 + 1; }; sc(); |> 5; }");
    assert!(text.contains("br label"), "{}", text);
    assert!(text.contains("ret i32 5"), "{}", text);
}

#[test]
fn import_ir_declares_and_calls_foreign_functions() {
    let dir = std::env::temp_dir().join(format!("grackle-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let ext = dir.join("ext.ll");
    std::fs::write(
        &ext,
        "define i32 @foo(i32 %x) {\nentry:\n  ret i32 %x\n}\n",
    )
    .unwrap();

    let source = format!(
        "(){{ m = @import#ir:\"{}\"; |> m.foo(5); }}",
        ext.display()
    );
    let program = compile(&source);
    let text = program.irgen();
    assert!(text.contains("declare i32 @foo(i32)"), "{}", text);
    assert!(text.contains("(i32 5)"), "{}", text);
}

#[test]
fn importing_the_same_ir_twice_does_not_duplicate_declarations() {
    let dir = std::env::temp_dir().join(format!("grackle-test2-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let ext = dir.join("twice.ll");
    std::fs::write(&ext, "declare i32 @bar(i32)\n").unwrap();

    let source = format!(
        "(){{ m = @import#ir:\"{p}\"#link:ext; n = @import#ir:\"{p}\"#link:ext; |> m.bar(1) + n.bar(2); }}",
        p = ext.display()
    );
    let program = compile(&source);
    let text = program.irgen();
    assert_eq!(text.matches("declare i32 @bar(i32)").count(), 1, "{}", text);
    assert!(program.link_libraries().contains(&"ext".to_string()));
}

#[test]
fn import_module_shares_the_current_module() {
    let dir = std::env::temp_dir().join(format!("grackle-test4-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let lib = dir.join("lib.gk");
    std::fs::write(&lib, "(){ |> 7; }\n").unwrap();

    let source = format!("(){{ l = @import#m:\"{}\"; |> l(); }}", lib.display());
    let text = compile(&source).irgen();
    assert!(text.contains("ret i32 7"), "{}", text);
}

#[test]
fn undeclared_variable_reports_its_location() {
    let e = translate_error("(){ |> a + 1; }");
    assert_eq!(e.kind, ErrorKind::Translate);
    assert_eq!(e.message, "\"a\" has not declared in this scope");
    assert_eq!(e.span.line(), 1);
    assert_eq!(e.span.column(), 7);
}

#[test]
fn heap_assignment_arms_the_gc_prelude() {
    let program = compile("(){ h#heap = 5; |> h; }");
    let text = program.irgen();
    assert!(text.contains("declare void @GC_init()"), "{}", text);
    assert!(text.contains("declare i8* @GC_malloc(i64)"), "{}", text);
    assert!(text.contains("call void @GC_init()"), "{}", text);
    assert!(program.link_libraries().contains(&"gc".to_string()));
}

#[test]
fn pow_uses_the_integer_intrinsic_for_integer_exponents() {
    let program = compile("(){ |> 2 ** 3; }");
    let text = program.irgen();
    assert!(text.contains("llvm.powi.f64.i32"), "{}", text);
    assert!(text.contains("fptosi"), "{}", text);
    assert!(program.link_libraries().contains(&"m".to_string()));
}

#[test]
fn float_promotion_in_mixed_arithmetic() {
    let text = ir("(){ t = 1 + 2.5; |> 3; }");
    assert!(text.contains("sitofp i32 1 to double"), "{}", text);
    assert!(text.contains("fadd double"), "{}", text);
    assert!(text.contains("%t = alloca double"), "{}", text);
}

#[test]
fn survey_functions_never_reach_the_module() {
    let text = ir("(){ f = (x){|> x + 1;}; |> f(1) + f(2); }");
    assert!(!text.contains("entry_survey"), "{}", text);
    // the lazy function materialized once per call site
    assert!(text.contains("define i32"), "{}", text);
}

#[test]
fn assigning_call_writes_back_into_the_receiver() {
    let text = ir("(){ v = [n: 1, b: (s){|> s;}]; v.=b(); |> v.n; }");
    // the method hands the aggregate back and the call
    // result memcpys into the base
    assert!(text.contains("llvm.memcpy"), "{}", text);
    assert!(text.contains("ret i32"), "{}", text);
}

#[test]
fn string_literals_intern_globals() {
    let text = ir("(){ t = \"hi\\n\"; |> 0; }");
    assert!(text.contains("c\"hi\\0A\\00\""), "{}", text);
}

#[test]
fn lazy_argument_to_c_style_call_is_rejected() {
    let dir = std::env::temp_dir().join(format!("grackle-test3-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let ext = dir.join("cfn.ll");
    std::fs::write(&ext, "declare i32 @takes(i32)\n").unwrap();

    let source = format!(
        "(){{ m = @import#ir:\"{}\"; |> m.takes((x){{|> x;}}); }}",
        ext.display()
    );
    let ast = compiler::parse(Source::source(&source)).unwrap();
    let e = Program::create(&ast, "snippet").unwrap_err();
    assert_eq!(e.message, "Cannot pass a lazy value to c-style functions");
}

#[test]
fn arity_mismatch_on_lazy_call() {
    let e = translate_error("(){ f = (x, y){|> x;}; |> f(1); }");
    assert!(
        e.message.contains("required 2 but supplied 1"),
        "{}",
        e.message
    );
}

#[test]
fn mismatched_return_types_are_rejected() {
    let e = translate_error("(){ f = (x){ x ? {|> 1;} : {|> 2.5;}; }; |> f(1); }");
    assert_eq!(e.message, "All return values must have the same type");
}

#[test]
fn declared_return_type_must_match_the_inferred_one() {
    let e = translate_error("(){ f = (x#type:i32){|> x;}#rettype:double#lazy; |> f(1); }");
    assert!(
        e.message.starts_with("Return type doesn't match"),
        "{}",
        e.message
    );
}

#[test]
fn mixed_conditional_arms_are_rejected() {
    let e = translate_error("(){ |> 1 < 2 ? {|> 1;} : 200; }");
    assert!(
        e.message.contains("incompatible value types"),
        "{}",
        e.message
    );
}

#[test]
fn calling_a_plain_integer_is_rejected() {
    let e = translate_error("(){ a = 1; |> a(1); }");
    assert!(
        e.message.contains("Cannot call a non-pointer value"),
        "{}",
        e.message
    );
}

#[test]
fn assigning_to_a_literal_is_rejected() {
    let e = translate_error("(){ 1 = 2; }");
    assert_eq!(e.message, "An integer constant is not to be assigned");
}

#[test]
fn scope_with_arguments_is_rejected() {
    let e = translate_error("(){ sc = { 1; }; sc(2); }");
    assert_eq!(e.message, "Calling scope with arguments is not allowed");
}

#[test]
fn top_level_must_be_a_function() {
    let ast = compiler::parse(Source::source("{ 1; }")).unwrap();
    let e = Program::create(&ast, "snippet").unwrap_err();
    assert_eq!(e.message, "Top-level value must be function");
}

#[test]
fn optimizer_sweeps_dead_code_after_returns() {
    let mut program = compile("(){ |> 1; 2 + 3; }");
    program.optimize(1, 1);
    let text = program.irgen();
    assert!(!text.contains("add i32 2, 3"), "{}", text);
}

#[test]
fn top_level_formals_receive_the_entry_arguments() {
    let text = ir("(argc, argv){ |> argc; }");
    assert!(text.contains("(i32 %0, i8** %1)"), "{}", text);
    assert!(text.contains("call i32"), "{}", text);
}

#[test]
fn self_reference_through_pre_variable() {
    // `@self` rewrites to the `__self` slot every function
    // body carries
    let text = ir("(){ g = (n){ me = @self; |> n + 1; }; |> g(4); }");
    assert!(text.contains("%__self = alloca"), "{}", text);
    assert!(text.contains("%me = alloca"), "{}", text);
}
