// This test suite covers the CFG structural operations: successor and
// predecessor derivation, unreachable-block pruning and its idempotence,
// the conditional-branch collapse that keeps at most one edge between two
// blocks, and the structural error paths for misplaced phis and phis whose
// incoming edges disagree with the predecessor set.

//! CFG structure tests.

mod common;

use cfg_liveness_core::{AnalysisError, Function, Inst, InstKind, Operand, Type};

#[test]
fn pruning_unreachable_blocks_is_idempotent() {
    common::init_logging();
    let mut f = Function::new("pruned");
    let entry = f.make_block("entry");
    let reached = f.make_block("reached");
    let orphan = f.make_block("orphan");
    f.append_inst(entry, Inst::br(reached));
    f.append_inst(reached, Inst::ret(None));
    f.append_inst(orphan, Inst::ret(None));

    f.compute_edges().unwrap();
    assert_eq!(f.num_blocks(), 2);
    let names: Vec<_> = f.blocks().iter().map(|b| b.name()).collect();
    let edges: Vec<_> = f
        .blocks()
        .iter()
        .map(|b| (b.in_edges().to_vec(), b.out_edges().to_vec()))
        .collect();
    // Dense reindexing happened.
    for (i, b) in f.blocks().iter().enumerate() {
        assert_eq!(b.index().index(), i);
    }

    f.compute_edges().unwrap();
    assert_eq!(names, f.blocks().iter().map(|b| b.name()).collect::<Vec<_>>());
    assert_eq!(
        edges,
        f.blocks()
            .iter()
            .map(|b| (b.in_edges().to_vec(), b.out_edges().to_vec()))
            .collect::<Vec<_>>()
    );
}

#[test]
fn equal_branch_targets_collapse() {
    let mut f = Function::new("collapse");
    let c = f.make_variable(Type::I32, "c");
    f.add_arg(c);
    let entry = f.make_block("entry");
    let next = f.make_block("next");
    f.append_inst(entry, Inst::br_cond(Operand::Var(c), next, next));
    f.append_inst(next, Inst::ret(None));
    f.compute_edges().unwrap();

    let entry_block = &f.blocks()[0];
    assert_eq!(entry_block.out_edges().len(), 1);
    match entry_block.insts()[0].kind() {
        InstKind::Br { targets } => {
            assert_eq!(targets.len(), 1);
            // The collapsed branch is unconditional and reads nothing.
            assert!(entry_block.insts()[0].srcs().is_empty());
        }
        other => panic!("expected a branch, got {:?}", other),
    }
}

#[test]
fn phi_with_missing_edge_is_a_structural_error() {
    common::init_logging();
    let mut f = Function::new("badphi");
    let y = f.make_variable(Type::I32, "y");
    let z = f.make_variable(Type::I32, "z");
    let c = f.make_variable(Type::I32, "c");
    f.add_arg(y);
    f.add_arg(c);
    let entry = f.make_block("entry");
    let left = f.make_block("left");
    let right = f.make_block("right");
    let merge = f.make_block("merge");
    f.append_inst(entry, Inst::br_cond(Operand::Var(c), left, right));
    f.append_inst(left, Inst::br(merge));
    f.append_inst(right, Inst::br(merge));
    // Only one incoming operand for a two-predecessor block.
    let mut phi = Inst::phi(z);
    phi.phi_add_argument(Operand::Var(y), left);
    f.append_inst(merge, phi);
    f.append_inst(merge, Inst::ret(Some(Operand::Var(z))));

    f.compute_edges().unwrap();
    let err = f.validate_phis().unwrap_err();
    assert_eq!(
        err,
        AnalysisError::PhiPredecessorMismatch { block: 3, have: 1, want: 2 }
    );
    assert!(f.has_error());
}

#[test]
fn phi_after_regular_instructions_sets_the_error_flag() {
    let mut f = Function::new("misplaced");
    let a = f.make_variable(Type::I32, "a");
    let z = f.make_variable(Type::I32, "z");
    f.add_arg(a);
    let entry = f.make_block("entry");
    f.append_inst(entry, Inst::assign(z, Operand::Var(a)));
    f.append_inst(entry, Inst::phi(z));
    assert!(f.has_error());
    assert!(f.error_message().unwrap().contains("phi"));
}

#[test]
fn missing_terminator_is_reported() {
    let mut f = Function::new("noterm");
    let a = f.make_variable(Type::I32, "a");
    let z = f.make_variable(Type::I32, "z");
    f.add_arg(a);
    let entry = f.make_block("entry");
    f.append_inst(entry, Inst::assign(z, Operand::Var(a)));
    let err = f.compute_edges().unwrap_err();
    assert_eq!(err, AnalysisError::MissingTerminator { block: 0 });
    assert!(f.has_error());
}
