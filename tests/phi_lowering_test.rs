// This test suite validates phi elimination, one of the trickier parts of
// leaving SSA form. It covers the naive load/store path and the advanced
// edge-splitting path on a diamond merge, verifying by interpretation that
// the lowered code still selects the correct value along each path; the
// two-phi swap cycle that forces the parallel-copy resolver to break a
// permutation through a temporary; the incremental liveness update that
// folds edge-split blocks into an existing interval solution without a
// full recomputation; and the wide-operand hooks that split a 64-bit copy
// into lo/hi halves.

//! Phi elimination tests.

mod common;

use std::collections::HashMap;

use bumpalo::Bump;
use cfg_liveness_core::{
    compute_multiblock, lower_phis_advanced, lower_phis_naive, validate_liveness, DefaultPhiHooks,
    Function, Inst, Liveness, LivenessMode, Operand, PhiLoweringHooks, Type, VarId,
};

/// int sel(int c, int y, int y2) { return c ? y : y2; }
///
/// built as a diamond whose merge block selects with a phi.
fn build_diamond_phi() -> (Function, VarId, VarId, VarId) {
    let mut f = Function::new("sel");
    let c = f.make_variable(Type::I32, "c");
    let y = f.make_variable(Type::I32, "y");
    let y2 = f.make_variable(Type::I32, "y2");
    let z = f.make_variable(Type::I32, "z");
    f.add_arg(c);
    f.add_arg(y);
    f.add_arg(y2);
    let entry = f.make_block("entry");
    let left = f.make_block("left");
    let right = f.make_block("right");
    let merge = f.make_block("merge");
    f.append_inst(entry, Inst::br_cond(Operand::Var(c), left, right));
    f.append_inst(left, Inst::br(merge));
    f.append_inst(right, Inst::br(merge));
    let mut phi = Inst::phi(z);
    phi.phi_add_argument(Operand::Var(y), left);
    phi.phi_add_argument(Operand::Var(y2), right);
    f.append_inst(merge, phi);
    f.append_inst(merge, Inst::ret(Some(Operand::Var(z))));
    f.compute_edges().unwrap();
    f.validate_phis().unwrap();
    (f, c, y, y2)
}

/// Two values swapped around a loop that runs a fixed number of
/// iterations, plus a counter phi. The swap forms a permutation cycle on
/// the back edge.
///
///   p = 1; q = 2; k = 2;
///   do { k2 = k - 1; swap(p, q); k = k2; } while (k2);  // one swap
///   return p;
fn build_swap_loop() -> (Function, VarId, VarId) {
    let mut f = Function::new("swap");
    let p = f.make_variable(Type::I32, "p");
    let q = f.make_variable(Type::I32, "q");
    let k = f.make_variable(Type::I32, "k");
    let k2 = f.make_variable(Type::I32, "k2");
    let entry = f.make_block("entry");
    let body = f.make_block("loop");
    let exit = f.make_block("exit");
    f.append_inst(entry, Inst::br(body));
    let mut phi_p = Inst::phi(p);
    phi_p.phi_add_argument(Operand::ConstInt(1), entry);
    phi_p.phi_add_argument(Operand::Var(q), body);
    f.append_inst(body, phi_p);
    let mut phi_q = Inst::phi(q);
    phi_q.phi_add_argument(Operand::ConstInt(2), entry);
    phi_q.phi_add_argument(Operand::Var(p), body);
    f.append_inst(body, phi_q);
    let mut phi_k = Inst::phi(k);
    phi_k.phi_add_argument(Operand::ConstInt(2), entry);
    phi_k.phi_add_argument(Operand::Var(k2), body);
    f.append_inst(body, phi_k);
    f.append_inst(body, Inst::arith(k2, &[Operand::Var(k), Operand::ConstInt(-1)]));
    f.append_inst(body, Inst::br_cond(Operand::Var(k2), body, exit));
    f.append_inst(exit, Inst::ret(Some(Operand::Var(p))));
    f.compute_edges().unwrap();
    f.validate_phis().unwrap();
    (f, p, q)
}

fn no_live_phis(f: &Function) -> bool {
    f.blocks().iter().all(|b| !b.has_live_phis())
}

#[test]
fn naive_lowering_preserves_the_selected_value() {
    common::init_logging();
    let (mut f, c, y, y2) = build_diamond_phi();
    lower_phis_naive(&mut f);
    assert!(no_live_phis(&f));

    let mut env = HashMap::from([(c, 1), (y, 10), (y2, 20)]);
    assert_eq!(common::interpret(&f, &mut env), Some(10));
    let mut env = HashMap::from([(c, 0), (y, 10), (y2, 20)]);
    assert_eq!(common::interpret(&f, &mut env), Some(20));

    // Lowering again is a no-op.
    let insts_before: usize = f.blocks().iter().map(|b| b.insts().len()).sum();
    lower_phis_naive(&mut f);
    let insts_after: usize = f.blocks().iter().map(|b| b.insts().len()).sum();
    assert_eq!(insts_before, insts_after);

    // The lowered function passes a full interval liveness pass.
    f.renumber_instructions();
    compute_multiblock(&mut f);
    let arena = Bump::new();
    let mut live = Liveness::new(&arena, &mut f, LivenessMode::Intervals).unwrap();
    live.run(&mut f).unwrap();
    assert!(validate_liveness(&f));
    assert!(!f.has_error());
}

#[test]
fn advanced_lowering_preserves_the_selected_value() {
    common::init_logging();
    let (mut f, c, y, y2) = build_diamond_phi();
    let blocks_before = f.num_blocks();
    lower_phis_advanced(&mut f, None, &mut DefaultPhiHooks).unwrap();
    assert!(no_live_phis(&f));
    // Each edge needs exactly one copy from a single-successor
    // predecessor, so no edge is split.
    assert_eq!(f.num_blocks(), blocks_before);

    let mut env = HashMap::from([(c, 1), (y, 10), (y2, 20)]);
    assert_eq!(common::interpret(&f, &mut env), Some(10));
    let mut env = HashMap::from([(c, 0), (y, 10), (y2, 20)]);
    assert_eq!(common::interpret(&f, &mut env), Some(20));
}

#[test]
fn swap_cycle_is_broken_through_a_temporary() {
    common::init_logging();
    let (mut f, p, q) = build_swap_loop();

    // Reference semantics straight from the phis.
    let mut env = HashMap::new();
    let expected = common::interpret(&f, &mut env);
    assert_eq!(expected, Some(2));
    assert_eq!(env.get(&p), Some(&2));
    assert_eq!(env.get(&q), Some(&1));

    let blocks_before = f.num_blocks();
    lower_phis_advanced(&mut f, None, &mut DefaultPhiHooks).unwrap();
    assert!(no_live_phis(&f));
    // Both the entry edge and the back edge carry three simultaneous
    // copies, so both were split.
    assert_eq!(f.num_blocks(), blocks_before + 2);
    for b in &f.blocks()[blocks_before..] {
        assert!(b.needs_placement());
    }

    let mut env = HashMap::new();
    assert_eq!(common::interpret(&f, &mut env), expected);
    assert_eq!(env.get(&p), Some(&2));
    assert_eq!(env.get(&q), Some(&1));
}

#[test]
fn incremental_liveness_update_stays_consistent() {
    common::init_logging();
    let (mut f, p, _q) = build_swap_loop();
    f.renumber_instructions();
    compute_multiblock(&mut f);
    let arena = Bump::new();
    let mut live = Liveness::new(&arena, &mut f, LivenessMode::Intervals).unwrap();
    live.run(&mut f).unwrap();
    assert!(validate_liveness(&f));

    lower_phis_advanced(&mut f, Some(&mut live), &mut DefaultPhiHooks).unwrap();
    assert!(no_live_phis(&f));
    assert!(!f.has_error());
    // The patched solution still satisfies the validator without a full
    // recomputation.
    assert!(validate_liveness(&f));

    let mut env = HashMap::new();
    assert_eq!(common::interpret(&f, &mut env), Some(2));
    assert_eq!(env.get(&p), Some(&2));
}

#[test]
fn incremental_update_covers_in_predecessor_copies() {
    common::init_logging();
    let (mut f, c, y, y2) = build_diamond_phi();
    f.renumber_instructions();
    compute_multiblock(&mut f);
    let arena = Bump::new();
    let mut live = Liveness::new(&arena, &mut f, LivenessMode::Intervals).unwrap();
    live.run(&mut f).unwrap();
    assert!(validate_liveness(&f));

    let blocks_before = f.num_blocks();
    lower_phis_advanced(&mut f, Some(&mut live), &mut DefaultPhiHooks).unwrap();
    assert!(no_live_phis(&f));
    // Single copies landed in the predecessors; nothing was split.
    assert_eq!(f.num_blocks(), blocks_before);
    assert!(validate_liveness(&f));

    let mut env = HashMap::from([(c, 1), (y, 10), (y2, 20)]);
    assert_eq!(common::interpret(&f, &mut env), Some(10));
    let mut env = HashMap::from([(c, 0), (y, 10), (y2, 20)]);
    assert_eq!(common::interpret(&f, &mut env), Some(20));
}

/// Splits 64-bit operands into explicit lo/hi halves.
struct WideHooks {
    halves: HashMap<VarId, (VarId, VarId)>,
}

impl PhiLoweringHooks for WideHooks {
    fn split_wide(
        &mut self,
        func: &mut Function,
        op: Operand,
        _ty: Type,
    ) -> Option<(Operand, Operand)> {
        match op {
            Operand::Var(v) => {
                let (lo, hi) = match self.halves.get(&v) {
                    Some(&pair) => pair,
                    None => {
                        let lo_name = format!("{}_lo", func.var(v).name());
                        let hi_name = format!("{}_hi", func.var(v).name());
                        let lo = func.make_variable(Type::I32, &lo_name);
                        let hi = func.make_variable(Type::I32, &hi_name);
                        self.halves.insert(v, (lo, hi));
                        (lo, hi)
                    }
                };
                Some((Operand::Var(lo), Operand::Var(hi)))
            }
            Operand::ConstInt(c) => Some((
                Operand::ConstInt(c & 0xffff_ffff),
                Operand::ConstInt(c >> 32),
            )),
            Operand::Undef => Some((Operand::Undef, Operand::Undef)),
        }
    }

    fn materialize_undef(&mut self, _func: &mut Function, _ty: Type) -> Operand {
        Operand::ConstInt(0)
    }
}

#[test]
fn wide_phi_copies_split_into_halves() {
    common::init_logging();
    // long pick(int c, long a) { return c ? a : <undef>; }
    let mut f = Function::new("pick");
    let c = f.make_variable(Type::I32, "c");
    let a = f.make_variable(Type::I64, "a");
    let z = f.make_variable(Type::I64, "z");
    f.add_arg(c);
    f.add_arg(a);
    let entry = f.make_block("entry");
    let left = f.make_block("left");
    let right = f.make_block("right");
    let merge = f.make_block("merge");
    f.append_inst(entry, Inst::br_cond(Operand::Var(c), left, right));
    f.append_inst(left, Inst::br(merge));
    f.append_inst(right, Inst::br(merge));
    let mut phi = Inst::phi(z);
    phi.phi_add_argument(Operand::Var(a), left);
    phi.phi_add_argument(Operand::Undef, right);
    f.append_inst(merge, phi);
    f.append_inst(merge, Inst::ret(Some(Operand::Var(z))));
    f.compute_edges().unwrap();
    f.validate_phis().unwrap();

    let mut hooks = WideHooks { halves: HashMap::new() };
    let blocks_before = f.num_blocks();
    lower_phis_advanced(&mut f, None, &mut hooks).unwrap();
    assert!(no_live_phis(&f));
    // One wide phi expands to two copies per edge, which forces both
    // edges to be split.
    assert_eq!(f.num_blocks(), blocks_before + 2);
    for b in &f.blocks()[blocks_before..] {
        let copies = b.insts().iter().filter(|i| i.dest().is_some()).count();
        assert_eq!(copies, 2);
    }
    // The undef side was materialized as zero halves.
    let (z_lo, z_hi) = hooks.halves[&z];
    let undef_block = &f.blocks()[blocks_before + 1];
    let dests: Vec<_> = undef_block.insts().iter().filter_map(|i| i.dest()).collect();
    assert_eq!(dests, vec![z_lo, z_hi]);
    for inst in undef_block.insts().iter().filter(|i| i.dest().is_some()) {
        assert_eq!(inst.srcs(), &[Operand::ConstInt(0)]);
    }
}
