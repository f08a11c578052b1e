//! The target-independent intermediate representation.
//!
//! A function body in the language is a single expression, so a lowered
//! function is a straight line of instructions in SSA form: value ids
//! `0..arity` name the parameters, every instruction's result takes the
//! next id, and one of the values is designated as the return value.

use std::fmt;

use indexmap::IndexMap;

/// Dense value numbering inside one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    FConst(f64),
    FAdd(ValueId, ValueId),
    FSub(ValueId, ValueId),
    FMul(ValueId, ValueId),
    /// Unordered less-than: true when either operand is NaN. Produces 1.0
    /// or 0.0.
    FCmpULt(ValueId, ValueId),
    /// Carries a comparison result into the numeric domain.
    UiToFp(ValueId),
    Call { callee: String, args: Vec<ValueId> },
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::FConst(value) => write!(f, "fconst {}", value),
            Inst::FAdd(a, b) => write!(f, "fadd {}, {}", a, b),
            Inst::FSub(a, b) => write!(f, "fsub {}, {}", a, b),
            Inst::FMul(a, b) => write!(f, "fmul {}, {}", a, b),
            Inst::FCmpULt(a, b) => write!(f, "fcmp ult {}, {}", a, b),
            Inst::UiToFp(a) => write!(f, "uitofp {}", a),
            Inst::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(ValueId::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "call @{}({})", callee, args)
            }
        }
    }
}

/// The semantics of [`Inst::FCmpULt`], shared by the optimizer's constant
/// folder and the execution engine.
pub(crate) fn ult(lhs: f64, rhs: f64) -> bool {
    lhs.is_nan() || rhs.is_nan() || lhs < rhs
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<String>,
}

impl Signature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A fully lowered function body.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub signature: Signature,
    pub insts: Vec<Inst>,
    pub ret: ValueId,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn arity(&self) -> usize {
        self.signature.arity()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .signature
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| format!("v{}: {}", index, param))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "define @{}({}) {{", self.name(), params)?;
        for (index, inst) in self.insts.iter().enumerate() {
            writeln!(f, "  v{} = {}", self.arity() + index, inst)?;
        }
        writeln!(f, "  ret {}", self.ret)?;
        write!(f, "}}")
    }
}

/// Incrementally numbers instructions for one function body.
pub struct FunctionBuilder {
    signature: Signature,
    insts: Vec<Inst>,
}

impl FunctionBuilder {
    pub fn new(signature: Signature) -> Self {
        FunctionBuilder {
            signature,
            insts: Vec::new(),
        }
    }

    pub fn push(&mut self, inst: Inst) -> ValueId {
        let id = ValueId((self.signature.arity() + self.insts.len()) as u32);
        self.insts.push(inst);
        id
    }

    pub fn finish(self, ret: ValueId) -> Function {
        Function {
            signature: self.signature,
            insts: self.insts,
            ret,
        }
    }
}

/// One compilation unit: the batch of declarations and lowered functions
/// handed to the execution engine atomically, and removable from it again
/// as a whole.
#[derive(Debug, Clone, Default)]
pub struct Unit {
    /// Every signature visible inside the unit, including the defined ones.
    pub decls: IndexMap<String, Signature>,
    pub funcs: IndexMap<String, Function>,
}

impl Unit {
    pub fn new() -> Self {
        Unit::default()
    }

    /// Declare a signature. Idempotent: re-declaring a name replaces the
    /// stored signature.
    pub fn declare(&mut self, signature: Signature) {
        self.decls.insert(signature.name.clone(), signature);
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.decls.get(name)
    }

    pub fn define(&mut self, func: Function) {
        self.funcs.insert(func.name().to_string(), func);
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sig in self.decls.values() {
            if self.funcs.contains_key(&sig.name) {
                continue;
            }
            writeln!(f, "declare @{}({})", sig.name, sig.params.join(", "))?;
        }
        for func in self.funcs.values() {
            writeln!(f, "{}", func)?;
        }
        Ok(())
    }
}
