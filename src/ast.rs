/// Name reserved for the function wrapped around a bare top-level
/// expression. Identifiers must start with an alphabetic character, so no
/// user-defined function can take this name.
pub const ANON_FN_NAME: &str = "__anon_expr";

#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Number(f64),
    Variable(String),
    Binary(char, Box<Expression>, Box<Expression>),
    Call(String, Vec<Expression>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expression,
}

/// One fully parsed top-level statement.
#[derive(Debug, PartialEq, Clone)]
pub enum Item {
    Definition(Function),
    Extern(Prototype),
    /// A bare expression, wrapped as a zero-parameter function named
    /// [`ANON_FN_NAME`].
    TopLevel(Function),
}
