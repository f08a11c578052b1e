use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{Expression, Function, Prototype};
use crate::ir::{FunctionBuilder, Inst, Signature, Unit, ValueId};
use crate::opt::PassManager;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable '{0}' referenced")]
    UnknownVariable(String),
    #[error("invalid binary operator '{0}'")]
    InvalidOperator(char),
    #[error("unknown function '{0}' called")]
    UnknownFunction(String),
    #[error("invalid number of arguments in call to '{name}': expected {expected}, found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("function '{0}' already has a body and cannot be redefined")]
    Redefinition(String),
}

/// The process-lifetime view of every function signature seen so far.
///
/// Each compilation unit is sealed and compiled independently, so a call
/// to a function defined in an earlier unit re-declares its signature into
/// the live unit from here. The defined-name set backs redefinition
/// detection: a name may be declared any number of times but given a body
/// at most once.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    protos: IndexMap<String, Prototype>,
    defined: HashSet<String>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        SymbolRegistry::default()
    }

    /// Record the most recently seen prototype for a name, replacing any
    /// earlier one.
    pub fn register(&mut self, proto: Prototype) {
        self.protos.insert(proto.name.clone(), proto);
    }

    pub fn prototype(&self, name: &str) -> Option<&Prototype> {
        self.protos.get(name)
    }

    pub fn mark_defined(&mut self, name: &str) {
        self.defined.insert(name.to_string());
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }
}

fn signature_of(proto: &Prototype) -> Signature {
    Signature {
        name: proto.name.clone(),
        params: proto.params.clone(),
    }
}

/// Lowers syntax trees into the live compilation unit.
pub struct Codegen {
    unit: Unit,
    named_values: HashMap<String, ValueId>,
}

impl Codegen {
    pub fn new() -> Self {
        Codegen {
            unit: Unit::new(),
            named_values: HashMap::new(),
        }
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Seal the live unit for handoff and open a fresh one.
    pub fn take_unit(&mut self) -> Unit {
        std::mem::take(&mut self.unit)
    }

    /// Declare a prototype in the live unit. Idempotent and re-derivable
    /// from the stored prototype alone, which is how calls into already
    /// sealed units are resolved.
    pub fn declare(&mut self, proto: &Prototype) {
        self.unit.declare(signature_of(proto));
    }

    /// Resolve a callee's arity against the live unit first, then the
    /// global registry — re-declaring the signature locally in the latter
    /// case so the sealed unit stays self-describing.
    fn callee_arity(&mut self, registry: &SymbolRegistry, callee: &str) -> Option<usize> {
        if let Some(sig) = self.unit.signature(callee) {
            return Some(sig.arity());
        }
        let proto = registry.prototype(callee)?.clone();
        let arity = proto.params.len();
        self.declare(&proto);
        Some(arity)
    }

    fn lower_expr(
        &mut self,
        builder: &mut FunctionBuilder,
        registry: &SymbolRegistry,
        expr: &Expression,
    ) -> Result<ValueId, CodegenError> {
        match expr {
            Expression::Number(value) => Ok(builder.push(Inst::FConst(*value))),
            Expression::Variable(name) => self
                .named_values
                .get(name)
                .copied()
                .ok_or_else(|| CodegenError::UnknownVariable(name.clone())),
            Expression::Binary(op, lhs, rhs) => {
                // operands lower left to right; the order is fixed so the
                // generated code is deterministic
                let lhs = self.lower_expr(builder, registry, lhs)?;
                let rhs = self.lower_expr(builder, registry, rhs)?;
                match op {
                    '+' => Ok(builder.push(Inst::FAdd(lhs, rhs))),
                    '-' => Ok(builder.push(Inst::FSub(lhs, rhs))),
                    '*' => Ok(builder.push(Inst::FMul(lhs, rhs))),
                    '<' => {
                        let cmp = builder.push(Inst::FCmpULt(lhs, rhs));
                        Ok(builder.push(Inst::UiToFp(cmp)))
                    }
                    op => Err(CodegenError::InvalidOperator(*op)),
                }
            }
            Expression::Call(callee, args) => {
                let expected = self
                    .callee_arity(registry, callee)
                    .ok_or_else(|| CodegenError::UnknownFunction(callee.clone()))?;
                if expected != args.len() {
                    return Err(CodegenError::ArityMismatch {
                        name: callee.clone(),
                        expected,
                        found: args.len(),
                    });
                }
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expr(builder, registry, arg)?);
                }
                Ok(builder.push(Inst::Call {
                    callee: callee.clone(),
                    args: lowered,
                }))
            }
        }
    }

    /// Lower a whole function into the live unit: register the prototype
    /// (before the body, so self-recursion resolves), bind the parameters,
    /// lower the body, optimize, install.
    pub fn lower_function(
        &mut self,
        func: &Function,
        registry: &mut SymbolRegistry,
        passes: &PassManager,
    ) -> Result<(), CodegenError> {
        let proto = &func.prototype;
        registry.register(proto.clone());

        if registry.is_defined(&proto.name) || self.unit.funcs.contains_key(&proto.name) {
            return Err(CodegenError::Redefinition(proto.name.clone()));
        }

        self.declare(proto);

        // parameter bindings live only for this body; a duplicated name
        // binds its last occurrence
        self.named_values.clear();
        for (index, param) in proto.params.iter().enumerate() {
            self.named_values.insert(param.clone(), ValueId(index as u32));
        }

        let mut builder = FunctionBuilder::new(signature_of(proto));
        let ret = self.lower_expr(&mut builder, registry, &func.body)?;

        let mut lowered = builder.finish(ret);
        passes.run(&mut lowered);
        debug!("lowered function:\n{}", lowered);

        self.unit.define(lowered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::{Expression, Function, Prototype};
    use crate::input::ReaderSource;
    use crate::parser::Parser;

    fn parse_definition(source: &'static str) -> Function {
        Parser::new(ReaderSource::new(Cursor::new(source)))
            .parse_definition()
            .unwrap()
    }

    #[test]
    fn lowers_arithmetic_into_the_live_unit() {
        let func = parse_definition("def avg(x, y) (x + y) * 0.5");
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        codegen
            .lower_function(&func, &mut registry, &PassManager::empty())
            .unwrap();

        let lowered = &codegen.unit().funcs["avg"];
        assert_eq!(
            lowered.insts,
            vec![
                Inst::FAdd(ValueId(0), ValueId(1)),
                Inst::FConst(0.5),
                Inst::FMul(ValueId(2), ValueId(3)),
            ]
        );
        assert_eq!(lowered.ret, ValueId(4));
    }

    #[test]
    fn comparison_lowers_to_compare_and_convert() {
        let func = parse_definition("def lt(a, b) a < b");
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        codegen
            .lower_function(&func, &mut registry, &PassManager::empty())
            .unwrap();

        let lowered = &codegen.unit().funcs["lt"];
        assert_eq!(
            lowered.insts,
            vec![Inst::FCmpULt(ValueId(0), ValueId(1)), Inst::UiToFp(ValueId(2))]
        );
    }

    #[test]
    fn unknown_variable_is_reported() {
        let func = parse_definition("def f(x) y");
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        let err = codegen
            .lower_function(&func, &mut registry, &PassManager::empty())
            .unwrap_err();
        assert_eq!(err, CodegenError::UnknownVariable("y".to_string()));
    }

    #[test]
    fn invalid_operator_is_reported() {
        // the parser never produces '/', so build the tree directly
        let func = Function {
            prototype: Prototype {
                name: "half".to_string(),
                params: vec!["x".to_string()],
            },
            body: Expression::Binary(
                '/',
                Box::new(Expression::Variable("x".to_string())),
                Box::new(Expression::Number(2.0)),
            ),
        };
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        let err = codegen
            .lower_function(&func, &mut registry, &PassManager::empty())
            .unwrap_err();
        assert_eq!(err, CodegenError::InvalidOperator('/'));
    }

    #[test]
    fn calls_resolve_through_the_registry_across_units() {
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        let passes = PassManager::empty();

        let one = parse_definition("def one() 1");
        codegen.lower_function(&one, &mut registry, &passes).unwrap();
        codegen.take_unit();
        registry.mark_defined("one");

        let two = parse_definition("def two() one() + one()");
        codegen.lower_function(&two, &mut registry, &passes).unwrap();

        // the signature came back from the registry into the fresh unit
        assert!(codegen.unit().signature("one").is_some());
        assert_eq!(
            codegen.unit().funcs["two"].insts[0],
            Inst::Call {
                callee: "one".to_string(),
                args: Vec::new(),
            }
        );
    }

    #[test]
    fn arity_is_checked_against_the_known_signature() {
        let mut registry = SymbolRegistry::new();
        registry.register(Prototype {
            name: "pow".to_string(),
            params: vec!["base".to_string(), "exp".to_string()],
        });

        let func = parse_definition("def p() pow(2)");
        let mut codegen = Codegen::new();
        let err = codegen
            .lower_function(&func, &mut registry, &PassManager::empty())
            .unwrap_err();
        assert_eq!(
            err,
            CodegenError::ArityMismatch {
                name: "pow".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn unknown_callee_is_reported() {
        let func = parse_definition("def f(x) mystery(x)");
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        let err = codegen
            .lower_function(&func, &mut registry, &PassManager::empty())
            .unwrap_err();
        assert_eq!(err, CodegenError::UnknownFunction("mystery".to_string()));
    }

    #[test]
    fn second_body_for_a_name_is_rejected() {
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        let passes = PassManager::empty();

        let first = parse_definition("def twice(x) x * 2");
        codegen.lower_function(&first, &mut registry, &passes).unwrap();
        codegen.take_unit();
        registry.mark_defined("twice");

        let second = parse_definition("def twice(x) x + x");
        let err = codegen
            .lower_function(&second, &mut registry, &passes)
            .unwrap_err();
        assert_eq!(err, CodegenError::Redefinition("twice".to_string()));
    }

    #[test]
    fn self_reference_resolves_before_body_lowering() {
        let func = parse_definition("def fib(n) fib(n)");
        let mut codegen = Codegen::new();
        let mut registry = SymbolRegistry::new();
        codegen
            .lower_function(&func, &mut registry, &PassManager::empty())
            .unwrap();
        assert!(codegen.unit().funcs.contains_key("fib"));
    }
}
