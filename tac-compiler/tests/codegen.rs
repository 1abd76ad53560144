use tac_compiler::{compile_tac_to_mips, CodegenOptions};

fn compile(src: &str) -> String {
    compile_tac_to_mips(src, None, &CodegenOptions::default()).expect("compilation failed")
}

fn line_index(asm: &str, needle: &str) -> usize {
    asm.lines()
        .position(|l| l.contains(needle))
        .unwrap_or_else(|| panic!("`{needle}` not found in:\n{asm}"))
}

// ── Data segment ─────────────────────────────────────────────────────────

#[test]
fn declaration_sizing() {
    let asm = compile(
        "1, decl, arr, 3\n\
         2, declStr, s, \"hi\"\n\
         3, declInt, x\n\
         4, func, main\n\
         5, ret\n",
    );
    assert!(asm.contains(".data"));
    let arr_line = asm.lines().find(|l| l.starts_with("arr:")).expect("arr");
    assert!(arr_line.contains(".space 12"), "3 words reserve 12 bytes");
    let s_line = asm.lines().find(|l| l.starts_with("s:")).expect("s");
    assert!(s_line.contains(".asciiz \"hi\""));
    let x_line = asm.lines().find(|l| l.starts_with("x:")).expect("x");
    assert!(x_line.contains(".word 0"));
}

#[test]
fn duplicate_declarations_emit_once() {
    let asm = compile(
        "1, declInt, x\n\
         2, declInt, x\n\
         3, func, main\n\
         4, ret\n",
    );
    let count = asm.lines().filter(|l| l.starts_with("x:")).count();
    assert_eq!(count, 1);
}

// ── I/O syscalls ─────────────────────────────────────────────────────────

#[test]
fn printstr_uses_the_print_string_syscall() {
    let asm = compile(
        "1, declStr, msg, \"hello\"\n\
         2, func, main\n\
         3, printstr, msg\n\
         4, ret\n",
    );
    let la = line_index(&asm, "la $a0, msg");
    let li = line_index(&asm, "li $v0, 4");
    let sc = line_index(&asm, "syscall");
    assert!(la < sc && li < sc, "argument and selector set before syscall");
}

#[test]
fn scanint_captures_the_result() {
    let asm = compile(
        "1, declInt, x\n\
         2, func, main\n\
         3, scanint, x\n\
         4, ret\n",
    );
    let li = line_index(&asm, "li $v0, 5");
    let sc = line_index(&asm, "syscall");
    let mv = line_index(&asm, ", $v0");
    assert!(li < sc && sc < mv, "result moved out after the syscall");
}

// ── Control flow and flushing ────────────────────────────────────────────

#[test]
fn dirty_registers_flush_before_a_branch() {
    let asm = compile(
        "1, declInt, a\n\
         2, declInt, b\n\
         3, func, main\n\
         4, =, a, 1\n\
         5, =, b, 2\n\
         6, beq, L1, a, b\n\
         7, label, L1\n\
         8, ret\n",
    );
    let branch = line_index(&asm, "beq");
    let store_a = asm
        .lines()
        .position(|l| l.trim_start().starts_with("sw") && l.ends_with(", a"))
        .expect("store of a");
    let store_b = asm
        .lines()
        .position(|l| l.trim_start().starts_with("sw") && l.ends_with(", b"))
        .expect("store of b");
    assert!(store_a < branch, "a stored before control leaves the block");
    assert!(store_b < branch, "b stored before control leaves the block");
}

#[test]
fn call_saves_and_restores_the_return_address() {
    let asm = compile(
        "1, declInt, x\n\
         2, func, foo\n\
         3, ret\n\
         4, func, main\n\
         5, =, x, 3\n\
         6, call, foo\n\
         7, ret\n",
    );
    let save = line_index(&asm, "sw $ra, 0($sp)");
    let jal = line_index(&asm, "jal foo");
    let restore = line_index(&asm, "lw $ra, 0($sp)");
    assert!(save < jal && jal < restore);

    // Caller-saves: the dirty `x` reaches memory before the call.
    let store_x = asm
        .lines()
        .position(|l| l.trim_start().starts_with("sw") && l.ends_with(", x"))
        .expect("store of x");
    assert!(store_x < jal);
}

#[test]
fn functions_are_terminated_with_end_directives() {
    let asm = compile(
        "1, func, foo\n\
         2, ret\n\
         3, func, main\n\
         4, ret\n",
    );
    let foo = line_index(&asm, "foo:");
    let end_foo = line_index(&asm, ".end foo");
    let main = line_index(&asm, "main:");
    let end_main = line_index(&asm, ".end main");
    assert!(foo < end_foo && end_foo < main && main < end_main);
}

#[test]
fn global_initialization_runs_at_the_top_of_main() {
    let asm = compile(
        "1, declInt, g\n\
         2, =, g, 42\n\
         3, func, main\n\
         4, printint, g\n\
         5, ret\n",
    );
    let main = line_index(&asm, "main:");
    let init = line_index(&asm, ", 42");
    assert!(init > main, "global init is spliced after the entry label");
    let print = line_index(&asm, "li $v0, 1");
    assert!(init < print, "init precedes the body");
}

#[test]
fn prelude_is_spliced_into_the_text_segment() {
    let src = "1, func, main\n2, ret\n";
    let asm = compile_tac_to_mips(src, Some("# runtime blob"), &CodegenOptions::default())
        .expect("compile");
    let text = line_index(&asm, ".text");
    let blob = line_index(&asm, "# runtime blob");
    let main = line_index(&asm, "main:");
    assert!(text < blob && blob < main);
}

// ── Arrays ───────────────────────────────────────────────────────────────

#[test]
fn constant_index_folds_into_the_label() {
    let asm = compile(
        "1, decl, arr, 4\n\
         2, declInt, x\n\
         3, func, main\n\
         4, from, x, arr, 2\n\
         5, ret\n",
    );
    assert!(asm.contains("lw $t0, arr+8"), "element 2 lives 8 bytes in:\n{asm}");
}

#[test]
fn variable_index_scales_through_a_scratch_register() {
    let asm = compile(
        "1, decl, arr, 4\n\
         2, declInt, i\n\
         3, declInt, x\n\
         4, func, main\n\
         5, =, i, 1\n\
         6, from, x, arr, i\n\
         7, into, arr, i, x\n\
         8, ret\n",
    );
    assert!(asm.contains("sll "), "index scaled by 4");
    assert!(asm.contains("arr($"), "indexed addressing through a register");
}

// ── Determinism ──────────────────────────────────────────────────────────

#[test]
fn output_is_reproducible() {
    let src = "\
1, declInt, a
2, declInt, b
3, declInt, c
4, declInt, d
5, declInt, e
6, func, main
7, =, a, 1
8, =, b, 2
9, =, c, 3
10, =, d, 4
11, =, e, 5
12, +, a, a, b
13, +, c, c, d
14, beq, L1, a, c
15, label, L1
16, printint, e
17, ret
";
    let first = compile(src);
    for _ in 0..10 {
        assert_eq!(compile(src), first, "output must not depend on map order");
    }
}

#[test]
fn optimization_can_be_disabled() {
    let src = "\
1, func, main
2, beq, L1, x, 1
3, jmp, L2
4, label, L1
5, printint, x
6, label, L2
7, ret
";
    let opts = CodegenOptions { optimize: false, runtime: false };
    let unopt = compile_tac_to_mips(src, None, &opts).expect("compile");
    assert!(unopt.contains("L1:"), "no folding without optimization");

    let opt = compile(src);
    assert!(!opt.contains("L1:"), "folding removes the intermediate label");
    assert!(opt.contains("bne"), "condition negated");
}
