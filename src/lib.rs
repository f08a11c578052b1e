//! An interactive compile-and-execute front end for a small numeric
//! expression language.
//!
//! Statements flow through a fixed pipeline: [`lexer`] turns lines into
//! tokens, [`parser`] builds the syntax tree, [`codegen`] lowers it into
//! [`ir`] units, [`opt`] cleans the lowered functions up, and [`engine`]
//! executes them. [`driver`] ties the stages together one statement at a
//! time, and [`input`] decides where the text comes from.

pub mod ast;
pub mod codegen;
pub mod driver;
pub mod engine;
pub mod input;
pub mod ir;
pub mod lexer;
pub mod opt;
pub mod parser;
