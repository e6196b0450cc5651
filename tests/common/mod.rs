//! Shared test helpers: logging setup and a tiny CFG interpreter.

#![allow(dead_code)]

use std::collections::HashMap;

use cfg_liveness_core::{BlockId, Function, InstKind, Operand, VarId};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Executes `func` from the entry block until a return, following branches
/// against the current environment. `env` seeds the initial variable
/// values (arguments) and holds the final values afterwards.
///
/// Semantics are just enough for the lowering tests: `Assign` copies,
/// `Arith` is a wrapping sum of its operands, a two-target branch takes
/// the first target when its condition is non-zero, and phis read all
/// their inputs before any of them writes, selected by the block control
/// arrived from.
pub fn interpret(func: &Function, env: &mut HashMap<VarId, i64>) -> Option<i64> {
    let mut prev: Option<BlockId> = None;
    let mut block = func.entry();
    for _ in 0..10_000 {
        let b = func.block(block);
        let mut phi_writes = Vec::new();
        if let Some(p) = prev {
            for phi in b.phis() {
                if phi.is_deleted() {
                    continue;
                }
                if let (Some(dest), Some(op)) = (phi.dest(), phi.phi_operand_for(p)) {
                    phi_writes.push((dest, eval(env, op)));
                }
            }
        }
        for (dest, val) in phi_writes {
            env.insert(dest, val);
        }
        let mut next = None;
        for inst in b.insts() {
            if inst.is_deleted() {
                continue;
            }
            match inst.kind() {
                InstKind::Assign | InstKind::Arith => {
                    let val = inst
                        .srcs()
                        .iter()
                        .map(|&s| eval(env, s))
                        .fold(0i64, i64::wrapping_add);
                    if let Some(d) = inst.dest() {
                        env.insert(d, val);
                    }
                }
                InstKind::FakeDef => {
                    if let Some(d) = inst.dest() {
                        env.insert(d, 0);
                    }
                }
                InstKind::FakeUse => {}
                InstKind::Br { targets } => {
                    let taken = if targets.len() == 1 || inst.srcs().is_empty() {
                        targets[0]
                    } else if eval(env, inst.srcs()[0]) != 0 {
                        targets[0]
                    } else {
                        targets[1]
                    };
                    next = Some(taken);
                    break;
                }
                InstKind::Ret => {
                    return inst.srcs().first().map(|&s| eval(env, s));
                }
                InstKind::Phi { .. } => panic!("phi in the regular instruction list"),
            }
        }
        prev = Some(block);
        block = next?;
    }
    None
}

fn eval(env: &HashMap<VarId, i64>, op: Operand) -> i64 {
    match op {
        Operand::Var(v) => *env.get(&v).unwrap_or(&0),
        Operand::ConstInt(c) => c,
        Operand::Undef => 0,
    }
}
