//! Optimization passes over lowered functions.
//!
//! The IR is a straight line of instructions per function, so the classic
//! per-function pipeline reduces to constant folding, common-subexpression
//! elimination, and dead-code elimination. Passes rewrite in place and must
//! preserve semantics; callers hand a finished function over and trust the
//! result.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::trace;

use crate::ir::{ult, Function, Inst, ValueId};

pub trait Pass {
    fn name(&self) -> &'static str;

    /// Rewrite `func` in place; report whether anything changed.
    fn run(&self, func: &mut Function) -> bool;
}

pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    /// The standard pipeline: fold constants, merge duplicate
    /// computations, drop unused values.
    pub fn standard() -> Self {
        PassManager {
            passes: vec![Box::new(InstCombine), Box::new(Cse), Box::new(Dce)],
        }
    }

    /// A manager that leaves functions untouched.
    pub fn empty() -> Self {
        PassManager { passes: Vec::new() }
    }

    pub fn run(&self, func: &mut Function) {
        for pass in &self.passes {
            if pass.run(func) {
                trace!(pass = pass.name(), function = func.name(), "pass changed function");
            }
        }
    }
}

fn rewrite_operands(inst: &mut Inst, replace: &HashMap<ValueId, ValueId>) {
    let subst = |id: &mut ValueId| {
        if let Some(target) = replace.get(id) {
            *id = *target;
        }
    };
    match inst {
        Inst::FConst(_) => {}
        Inst::FAdd(a, b) | Inst::FSub(a, b) | Inst::FMul(a, b) | Inst::FCmpULt(a, b) => {
            subst(a);
            subst(b);
        }
        Inst::UiToFp(a) => subst(a),
        Inst::Call { args, .. } => {
            for arg in args {
                subst(arg);
            }
        }
    }
}

/// Folds instructions whose operands are all constants.
struct InstCombine;

impl Pass for InstCombine {
    fn name(&self) -> &'static str {
        "instcombine"
    }

    fn run(&self, func: &mut Function) -> bool {
        let arity = func.arity() as u32;
        let mut changed = false;

        fn constant(insts: &[Inst], arity: u32, id: ValueId) -> Option<f64> {
            if id.0 < arity {
                return None;
            }
            match insts[(id.0 - arity) as usize] {
                Inst::FConst(value) => Some(value),
                _ => None,
            }
        }

        for index in 0..func.insts.len() {
            let folded = match &func.insts[index] {
                Inst::FAdd(a, b) => constant(&func.insts, arity, *a)
                    .zip(constant(&func.insts, arity, *b))
                    .map(|(lhs, rhs)| lhs + rhs),
                Inst::FSub(a, b) => constant(&func.insts, arity, *a)
                    .zip(constant(&func.insts, arity, *b))
                    .map(|(lhs, rhs)| lhs - rhs),
                Inst::FMul(a, b) => constant(&func.insts, arity, *a)
                    .zip(constant(&func.insts, arity, *b))
                    .map(|(lhs, rhs)| lhs * rhs),
                Inst::FCmpULt(a, b) => constant(&func.insts, arity, *a)
                    .zip(constant(&func.insts, arity, *b))
                    .map(|(lhs, rhs)| if ult(lhs, rhs) { 1.0 } else { 0.0 }),
                Inst::UiToFp(a) => constant(&func.insts, arity, *a),
                Inst::FConst(_) | Inst::Call { .. } => None,
            };
            if let Some(value) = folded {
                func.insts[index] = Inst::FConst(value);
                changed = true;
            }
        }
        changed
    }
}

/// Reuses the result of an earlier identical pure instruction. The
/// superseded instruction is left in place for [`Dce`] to collect.
struct Cse;

#[derive(PartialEq, Eq, Hash)]
enum InstKey {
    FConst(u64),
    FAdd(u32, u32),
    FSub(u32, u32),
    FMul(u32, u32),
    FCmpULt(u32, u32),
    UiToFp(u32),
}

fn ordered(a: ValueId, b: ValueId) -> (u32, u32) {
    if a.0 <= b.0 {
        (a.0, b.0)
    } else {
        (b.0, a.0)
    }
}

fn key_of(inst: &Inst) -> Option<InstKey> {
    match inst {
        Inst::FConst(value) => Some(InstKey::FConst(value.to_bits())),
        // addition and multiplication commute; canonicalize the operand
        // order so `a + b` and `b + a` unify
        Inst::FAdd(a, b) => {
            let (a, b) = ordered(*a, *b);
            Some(InstKey::FAdd(a, b))
        }
        Inst::FMul(a, b) => {
            let (a, b) = ordered(*a, *b);
            Some(InstKey::FMul(a, b))
        }
        Inst::FSub(a, b) => Some(InstKey::FSub(a.0, b.0)),
        Inst::FCmpULt(a, b) => Some(InstKey::FCmpULt(a.0, b.0)),
        Inst::UiToFp(a) => Some(InstKey::UiToFp(a.0)),
        // calls may reach native code; never merged
        Inst::Call { .. } => None,
    }
}

impl Pass for Cse {
    fn name(&self) -> &'static str {
        "cse"
    }

    fn run(&self, func: &mut Function) -> bool {
        let arity = func.arity() as u32;
        let mut seen: HashMap<InstKey, ValueId> = HashMap::new();
        let mut replace: HashMap<ValueId, ValueId> = HashMap::new();
        let mut changed = false;

        for index in 0..func.insts.len() {
            let id = ValueId(arity + index as u32);
            rewrite_operands(&mut func.insts[index], &replace);
            if let Some(key) = key_of(&func.insts[index]) {
                match seen.entry(key) {
                    Entry::Occupied(prior) => {
                        replace.insert(id, *prior.get());
                        changed = true;
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                }
            }
        }

        if let Some(target) = replace.get(&func.ret) {
            func.ret = *target;
        }
        changed
    }
}

/// Drops instructions whose results are never used. Calls are kept; they
/// may reach native code.
struct Dce;

impl Pass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&self, func: &mut Function) -> bool {
        let arity = func.arity() as u32;
        let count = func.insts.len();
        let mut live = vec![false; count];

        fn mark(live: &mut [bool], arity: u32, id: ValueId) {
            if id.0 >= arity {
                live[(id.0 - arity) as usize] = true;
            }
        }

        mark(&mut live, arity, func.ret);
        // operands always refer backwards, so one reverse sweep settles
        // liveness
        for index in (0..count).rev() {
            if let Inst::Call { .. } = func.insts[index] {
                live[index] = true;
            }
            if !live[index] {
                continue;
            }
            match &func.insts[index] {
                Inst::FConst(_) => {}
                Inst::FAdd(a, b) | Inst::FSub(a, b) | Inst::FMul(a, b) | Inst::FCmpULt(a, b) => {
                    mark(&mut live, arity, *a);
                    mark(&mut live, arity, *b);
                }
                Inst::UiToFp(a) => mark(&mut live, arity, *a),
                Inst::Call { args, .. } => {
                    for arg in args {
                        mark(&mut live, arity, *arg);
                    }
                }
            }
        }

        if live.iter().all(|&alive| alive) {
            return false;
        }

        // renumber the survivors
        let mut remap: HashMap<ValueId, ValueId> = HashMap::new();
        let mut kept = Vec::new();
        for (index, mut inst) in func.insts.drain(..).enumerate() {
            if !live[index] {
                continue;
            }
            rewrite_operands(&mut inst, &remap);
            remap.insert(
                ValueId(arity + index as u32),
                ValueId(arity + kept.len() as u32),
            );
            kept.push(inst);
        }
        func.insts = kept;
        if let Some(target) = remap.get(&func.ret) {
            func.ret = *target;
        }
        true
    }
}
