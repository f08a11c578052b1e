//! The execution engine: owns finalized compilation units, resolves
//! symbols across them, and runs compiled functions.
//!
//! Units are added and removed atomically; a removed unit's symbols stop
//! resolving. Calls resolve through the engine again at execution time, so
//! a function compiled in one unit can reach a definition sealed into any
//! other live unit, or a native host routine.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ir::{ult, Function, Inst, Unit, ValueId};

/// Runaway-recursion guard. The language has no conditionals, so a
/// recursive call can never terminate; report it instead of exhausting the
/// process stack.
const MAX_CALL_DEPTH: usize = 1000;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ExecError {
    #[error("unresolved symbol '{0}'")]
    UnresolvedSymbol(String),
    #[error("function '{name}' expects {expected} arguments, found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("call depth limit exceeded while evaluating '{0}'")]
    CallDepthExceeded(String),
}

/// Handle to a unit previously added to the engine; used to revoke its
/// symbols again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHandle(usize);

/// What a name resolves to.
pub enum Symbol<'a> {
    Compiled(&'a Function),
    Native { arity: usize },
}

/// Arity of a native host routine, or `None` if the name is not native.
fn native_arity(name: &str) -> Option<usize> {
    let arity = match name {
        "sin" | "cos" | "tan" | "sqrt" | "exp" | "log" | "fabs" | "floor" | "ceil" => 1,
        "pow" | "atan2" => 2,
        _ => return None,
    };
    Some(arity)
}

fn run_native(name: &str, args: &[f64]) -> Option<f64> {
    let value = match (name, args) {
        ("sin", [x]) => x.sin(),
        ("cos", [x]) => x.cos(),
        ("tan", [x]) => x.tan(),
        ("sqrt", [x]) => x.sqrt(),
        ("exp", [x]) => x.exp(),
        ("log", [x]) => x.ln(),
        ("fabs", [x]) => x.abs(),
        ("floor", [x]) => x.floor(),
        ("ceil", [x]) => x.ceil(),
        ("pow", [base, exp]) => base.powf(*exp),
        ("atan2", [y, x]) => y.atan2(*x),
        _ => return None,
    };
    Some(value)
}

fn value_at(values: &[f64], id: ValueId) -> f64 {
    values[id.0 as usize]
}

#[derive(Default)]
pub struct Engine {
    units: Vec<Option<Unit>>,
    symbols: HashMap<String, usize>,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    /// Transfer a sealed unit to the engine, making its function symbols
    /// resolvable. The newest definition of a name wins.
    pub fn add_unit(&mut self, unit: Unit) -> UnitHandle {
        let slot = self.units.len();
        for name in unit.funcs.keys() {
            self.symbols.insert(name.clone(), slot);
        }
        debug!(unit = slot, functions = unit.funcs.len(), "unit added");
        self.units.push(Some(unit));
        UnitHandle(slot)
    }

    /// Revoke a unit's symbols. Names whose resolution moved to a newer
    /// unit are left alone.
    pub fn remove_unit(&mut self, handle: UnitHandle) {
        if let Some(unit) = self.units[handle.0].take() {
            for name in unit.funcs.keys() {
                if self.symbols.get(name) == Some(&handle.0) {
                    self.symbols.remove(name);
                }
            }
            debug!(unit = handle.0, "unit removed");
        }
    }

    /// Resolve a name to something callable: compiled definitions first
    /// (a user definition shadows a native of the same name), then the
    /// native table.
    pub fn resolve(&self, name: &str) -> Option<Symbol<'_>> {
        if let Some(&slot) = self.symbols.get(name) {
            if let Some(func) = self.units[slot].as_ref().and_then(|unit| unit.funcs.get(name)) {
                return Some(Symbol::Compiled(func));
            }
        }
        native_arity(name).map(|arity| Symbol::Native { arity })
    }

    /// Execute a resolvable function with the given arguments.
    pub fn invoke(&self, name: &str, args: &[f64]) -> Result<f64, ExecError> {
        self.call(name, args, 0)
    }

    fn call(&self, name: &str, args: &[f64], depth: usize) -> Result<f64, ExecError> {
        if depth > MAX_CALL_DEPTH {
            return Err(ExecError::CallDepthExceeded(name.to_string()));
        }
        match self.resolve(name) {
            Some(Symbol::Compiled(func)) => self.run_function(func, args, depth),
            Some(Symbol::Native { arity }) => {
                if arity != args.len() {
                    return Err(ExecError::ArityMismatch {
                        name: name.to_string(),
                        expected: arity,
                        found: args.len(),
                    });
                }
                run_native(name, args).ok_or_else(|| ExecError::UnresolvedSymbol(name.to_string()))
            }
            None => Err(ExecError::UnresolvedSymbol(name.to_string())),
        }
    }

    fn run_function(&self, func: &Function, args: &[f64], depth: usize) -> Result<f64, ExecError> {
        if args.len() != func.arity() {
            return Err(ExecError::ArityMismatch {
                name: func.name().to_string(),
                expected: func.arity(),
                found: args.len(),
            });
        }
        trace!(function = func.name(), ?args, "executing");

        let mut values = Vec::with_capacity(func.arity() + func.insts.len());
        values.extend_from_slice(args);
        for inst in &func.insts {
            let value = match inst {
                Inst::FConst(value) => *value,
                Inst::FAdd(a, b) => value_at(&values, *a) + value_at(&values, *b),
                Inst::FSub(a, b) => value_at(&values, *a) - value_at(&values, *b),
                Inst::FMul(a, b) => value_at(&values, *a) * value_at(&values, *b),
                Inst::FCmpULt(a, b) => {
                    if ult(value_at(&values, *a), value_at(&values, *b)) {
                        1.0
                    } else {
                        0.0
                    }
                }
                Inst::UiToFp(a) => value_at(&values, *a),
                Inst::Call { callee, args } => {
                    let argv = args
                        .iter()
                        .map(|id| value_at(&values, *id))
                        .collect::<Vec<_>>();
                    self.call(callee, &argv, depth + 1)?
                }
            };
            values.push(value);
        }
        Ok(value_at(&values, func.ret))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::{FunctionBuilder, Signature};

    fn double_unit() -> Unit {
        let sig = Signature {
            name: "double".to_string(),
            params: vec!["x".to_string()],
        };
        let mut builder = FunctionBuilder::new(sig.clone());
        let two = builder.push(Inst::FConst(2.0));
        let result = builder.push(Inst::FMul(ValueId(0), two));

        let mut unit = Unit::new();
        unit.declare(sig);
        unit.define(builder.finish(result));
        unit
    }

    #[test]
    fn invokes_compiled_functions() {
        let mut engine = Engine::new();
        engine.add_unit(double_unit());
        assert_eq!(engine.invoke("double", &[21.0]), Ok(42.0));
    }

    #[test]
    fn removed_units_stop_resolving() {
        let mut engine = Engine::new();
        let handle = engine.add_unit(double_unit());
        assert_eq!(engine.invoke("double", &[1.0]), Ok(2.0));

        engine.remove_unit(handle);
        assert_eq!(
            engine.invoke("double", &[1.0]),
            Err(ExecError::UnresolvedSymbol("double".to_string()))
        );
    }

    #[test]
    fn cross_unit_calls_bind_at_execution_time() {
        let mut engine = Engine::new();
        engine.add_unit(double_unit());

        // quad(x) = double(double(x)), compiled in a later unit against a
        // bare declaration
        let sig = Signature {
            name: "quad".to_string(),
            params: vec!["x".to_string()],
        };
        let mut builder = FunctionBuilder::new(sig.clone());
        let inner = builder.push(Inst::Call {
            callee: "double".to_string(),
            args: vec![ValueId(0)],
        });
        let outer = builder.push(Inst::Call {
            callee: "double".to_string(),
            args: vec![inner],
        });
        let mut unit = Unit::new();
        unit.declare(Signature {
            name: "double".to_string(),
            params: vec!["x".to_string()],
        });
        unit.declare(sig);
        unit.define(builder.finish(outer));
        engine.add_unit(unit);

        assert_eq!(engine.invoke("quad", &[2.0]), Ok(8.0));
    }

    #[test]
    fn natives_resolve_and_check_arity() {
        let engine = Engine::new();
        assert_eq!(engine.invoke("sqrt", &[9.0]), Ok(3.0));
        assert_eq!(engine.invoke("pow", &[2.0, 10.0]), Ok(1024.0));
        assert_eq!(
            engine.invoke("sqrt", &[1.0, 2.0]),
            Err(ExecError::ArityMismatch {
                name: "sqrt".to_string(),
                expected: 1,
                found: 2,
            })
        );
        assert_eq!(
            engine.invoke("nope", &[]),
            Err(ExecError::UnresolvedSymbol("nope".to_string()))
        );
    }

    #[test]
    fn runaway_recursion_is_reported() {
        let sig = Signature {
            name: "forever".to_string(),
            params: vec!["n".to_string()],
        };
        let mut builder = FunctionBuilder::new(sig.clone());
        let again = builder.push(Inst::Call {
            callee: "forever".to_string(),
            args: vec![ValueId(0)],
        });
        let mut unit = Unit::new();
        unit.declare(sig);
        unit.define(builder.finish(again));

        let mut engine = Engine::new();
        engine.add_unit(unit);
        assert_eq!(
            engine.invoke("forever", &[1.0]),
            Err(ExecError::CallDepthExceeded("forever".to_string()))
        );
    }
}
