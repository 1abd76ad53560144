use tac_compiler::backend::block;
use tac_compiler::backend::cfg::Program;
use tac_compiler::backend::dataflow;
use tac_compiler::parse_tac;
use std::collections::HashSet;

// ── Block partitioning ───────────────────────────────────────────────────

const SAMPLE: &str = "\
1, declInt, x
2, func, main
3, =, x, 5
4, beq, L1, x, 5
5, =, x, 6
6, label, L1
7, printint, x
8, ret
";

#[test]
fn partition_round_trips_the_statement_stream() {
    let stmts = parse_tac(SAMPLE).expect("parse");
    let prog = Program::from_statements(stmts.clone()).expect("link");
    let rebuilt = block::flatten(prog.blocks);
    assert_eq!(rebuilt, stmts);
}

#[test]
fn every_boundary_is_a_label_or_follows_a_terminator() {
    let stmts = parse_tac(SAMPLE).expect("parse");
    let prog = Program::from_statements(stmts).expect("link");
    assert!(prog.blocks.len() >= 3, "sample should split into several blocks");

    for i in 1..prog.blocks.len() {
        let starts_labelled = prog.blocks[i].label().is_some();
        let prev_terminated = prog.blocks[i - 1]
            .stmts
            .last()
            .is_some_and(|s| s.op.is_terminator());
        assert!(
            starts_labelled || prev_terminated,
            "block {i} starts mid-run"
        );
    }
}

#[test]
fn conditional_branch_has_two_successors() {
    let stmts = parse_tac(SAMPLE).expect("parse");
    let prog = Program::from_statements(stmts).expect("link");
    let branch_block = prog
        .blocks
        .iter()
        .position(|b| b.terminator().is_some())
        .expect("branch block");
    let b = &prog.blocks[branch_block];
    assert!(b.fallthrough.is_some(), "branch block falls through");
    assert!(b.branch_target.is_some(), "branch block has a branch target");
    let target = b.branch_target.unwrap();
    assert!(prog.blocks[target].label() == Some("L1"));
}

#[test]
fn undefined_label_is_rejected() {
    let stmts = parse_tac("1, func, main\n2, jmp, NOWHERE\n").expect("parse");
    assert!(Program::from_statements(stmts).is_err());
}

// ── Data-flow fixpoint ───────────────────────────────────────────────────

const LOOPY: &str = "\
1, declInt, i
2, declInt, n
3, func, main
4, =, i, 0
5, label, LOOP
6, +, i, i, 1
7, blt, LOOP, i, 10
8, =, n, i
9, ret
";

#[test]
fn fixpoint_satisfies_the_transfer_equations() {
    let stmts = parse_tac(LOOPY).expect("parse");
    let mut prog = Program::from_statements(stmts).expect("link");
    let passes = dataflow::analyze(&mut prog.blocks);
    assert!(passes >= 1);

    for (i, b) in prog.blocks.iter().enumerate() {
        // IN[n] = ⋃ OUT[p]
        let mut expected_in: HashSet<String> = HashSet::new();
        for &p in &b.predecessors {
            expected_in.extend(prog.blocks[p].dataflow.out_set.iter().cloned());
        }
        assert_eq!(b.dataflow.in_set, expected_in, "IN mismatch at block {i}");

        // OUT[n] = GEN[n] ∪ (IN[n] − KILL[n])
        let mut expected_out = b.dataflow.gen.clone();
        expected_out.extend(
            b.dataflow
                .in_set
                .difference(&b.dataflow.kill)
                .cloned(),
        );
        assert_eq!(b.dataflow.out_set, expected_out, "OUT mismatch at block {i}");
    }
}

#[test]
fn plain_assignment_kills_a_declaration() {
    let stmts = parse_tac(LOOPY).expect("parse");
    let mut prog = Program::from_statements(stmts).expect("link");
    dataflow::analyze(&mut prog.blocks);

    let loop_block = prog
        .blocks
        .iter()
        .position(|b| b.label() == Some("LOOP"))
        .expect("loop block");
    let in_set = &prog.blocks[loop_block].dataflow.in_set;
    // `n` is declared and never plainly assigned on the way in, so its
    // declaration reaches the loop; `i` is killed by `i = 0`.
    assert!(in_set.contains("n"), "declaration of `n` should reach LOOP");
    assert!(!in_set.contains("i"), "`i = 0` kills the declaration of `i`");
}
