//! The incremental execution driver: define → lower → optimize → execute
//! one statement at a time, with cross-statement symbol visibility kept in
//! the registry and the engine.

use tracing::debug;

use crate::ast::{self, Item, ANON_FN_NAME};
use crate::codegen::{Codegen, CodegenError, SymbolRegistry};
use crate::engine::{Engine, ExecError};
use crate::input::LineSource;
use crate::lexer::Token;
use crate::opt::PassManager;
use crate::parser::{Parser, ParserError};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("syntax error: {0}")]
    Parse(#[from] ParserError),
    #[error("lowering error: {0}")]
    Lower(#[from] CodegenError),
    #[error("execution error: {0}")]
    Exec(#[from] ExecError),
}

/// What one successfully processed statement produced.
#[derive(Debug, PartialEq, Clone)]
pub enum Outcome {
    /// A `def` was compiled and its unit handed to the engine.
    Defined(String),
    /// An `extern` signature was recorded.
    Declared(String),
    /// A top-level expression was compiled, executed once, and discarded.
    Evaluated(f64),
}

pub struct Driver<S> {
    parser: Parser<S>,
    codegen: Codegen,
    registry: SymbolRegistry,
    passes: PassManager,
    engine: Engine,
}

impl<S: LineSource> Driver<S> {
    pub fn new(source: S) -> Self {
        Driver {
            parser: Parser::new(source),
            codegen: Codegen::new(),
            registry: SymbolRegistry::new(),
            passes: PassManager::standard(),
            engine: Engine::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Process the next statement. `None` means the input is exhausted.
    /// Errors are recoverable: one token has been discarded and the next
    /// call resumes at the following statement boundary.
    pub fn step(&mut self) -> Option<Result<Outcome, PipelineError>> {
        loop {
            match self.parser.current() {
                Token::Eof => return None,
                Token::Delimiter => self.parser.skip(),
                _ => break,
            }
        }

        let item = match self.parser.parse_item() {
            Ok(item) => item,
            Err(err) => {
                self.parser.skip();
                return Some(Err(err.into()));
            }
        };

        Some(match item {
            Item::Definition(func) => self.handle_definition(func),
            Item::Extern(proto) => self.handle_extern(proto),
            Item::TopLevel(func) => self.handle_top_level(func),
        })
    }

    fn handle_definition(&mut self, func: ast::Function) -> Result<Outcome, PipelineError> {
        let name = func.prototype.name.clone();
        if let Err(err) = self
            .codegen
            .lower_function(&func, &mut self.registry, &self.passes)
        {
            self.parser.skip();
            return Err(err.into());
        }

        let unit = self.codegen.take_unit();
        self.engine.add_unit(unit);
        self.registry.mark_defined(&name);
        debug!(function = name.as_str(), "definition sealed");
        Ok(Outcome::Defined(name))
    }

    fn handle_extern(&mut self, proto: ast::Prototype) -> Result<Outcome, PipelineError> {
        // declaration only: it joins the live unit and the registry, but
        // there is no body to hand to the engine
        self.codegen.declare(&proto);
        let name = proto.name.clone();
        self.registry.register(proto);
        Ok(Outcome::Declared(name))
    }

    fn handle_top_level(&mut self, func: ast::Function) -> Result<Outcome, PipelineError> {
        if let Err(err) = self
            .codegen
            .lower_function(&func, &mut self.registry, &self.passes)
        {
            self.parser.skip();
            return Err(err.into());
        }

        let unit = self.codegen.take_unit();
        let handle = self.engine.add_unit(unit);
        let result = self.engine.invoke(ANON_FN_NAME, &[]);
        // one-shot: the anonymous function must not accumulate
        self.engine.remove_unit(handle);

        Ok(Outcome::Evaluated(result?))
    }
}
