use tac_compiler::{compile_tac_to_mips, parse_tac, CodegenOptions, CompileError};

// ── Fatal input errors ───────────────────────────────────────────────────
// Every error is terminal: there is no recovery or partial output.

#[test]
fn unknown_opcode_is_malformed_input() {
    let result = parse_tac("1, frobnicate, x\n");
    assert!(matches!(
        result,
        Err(CompileError::MalformedInput { .. })
    ));
}

#[test]
fn bad_line_number_is_malformed_input() {
    let result = parse_tac("first, =, a, 1\n");
    assert!(matches!(
        result,
        Err(CompileError::MalformedInput { .. })
    ));
}

#[test]
fn unresolved_label_is_malformed_input() {
    let src = "1, func, main\n2, jmp, NOWHERE\n3, ret\n";
    let result = compile_tac_to_mips(src, None, &CodegenOptions::default());
    match result {
        Err(CompileError::MalformedInput { message, .. }) => {
            assert!(message.contains("NOWHERE"), "message names the label");
        }
        other => panic!("expected malformed input, got {other:?}"),
    }
}

#[test]
fn missing_entry_point_is_fatal() {
    let src = "1, declInt, x\n2, func, helper\n3, ret\n";
    let result = compile_tac_to_mips(src, None, &CodegenOptions::default());
    assert!(matches!(result, Err(CompileError::MissingEntryPoint)));
}

#[test]
fn runtime_builds_need_no_entry_point() {
    let src = "1, declInt, x\n2, func, helper\n3, ret\n";
    let opts = CodegenOptions { optimize: true, runtime: true };
    let asm = compile_tac_to_mips(src, None, &opts).expect("runtime build compiles");
    assert!(asm.contains("helper:"));
}

#[test]
fn array_declaration_without_length_is_rejected() {
    let src = "1, decl, arr\n2, func, main\n3, ret\n";
    let result = compile_tac_to_mips(src, None, &CodegenOptions::default());
    assert!(matches!(
        result,
        Err(CompileError::MalformedInput { .. })
    ));
}

#[test]
fn huge_integer_literal_is_rejected() {
    let src = "1, func, main\n2, =, x, 99999999999999999999999\n3, ret\n";
    let result = compile_tac_to_mips(src, None, &CodegenOptions::default());
    assert!(matches!(
        result,
        Err(CompileError::MalformedInput { .. })
    ));
}

#[test]
fn huge_literal_in_destination_position_is_rejected() {
    // `printint` and `ret` carry literals in the destination field, which
    // bypasses operand classification; the range check must still fire.
    for src in [
        "1, func, main\n2, printint, 99999999999999999999999\n3, ret\n",
        "1, func, main\n2, ret, 99999999999999999999999\n",
    ] {
        let result = compile_tac_to_mips(src, None, &CodegenOptions::default());
        assert!(
            matches!(result, Err(CompileError::MalformedInput { .. })),
            "expected malformed input for {src:?}"
        );
    }
}
