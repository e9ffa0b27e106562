//! Abstract Syntax Tree types for the template language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Parameter name as written after the `$` sigil
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root AST node - a complete template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub nodes: Vec<Spanned<Node>>,
}

/// A single template construct
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Verbatim output
    Literal(String),
    /// `[[ $name ]]`
    Interpolation(Identifier),
    /// `[% if %] ... [% elif %] ... [% else %] ... [% endif %]`
    Conditional(Conditional),
    /// `[% include "relative/path" %]`
    Include(String),
}

/// An `if` chain; at most one body is selected at evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// The `if` branch followed by each `elif`, in declaration order
    pub branches: Vec<Branch>,
    pub else_body: Option<Vec<Spanned<Node>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Spanned<Condition>,
    pub body: Vec<Spanned<Node>>,
}

/// Boolean expression over parameter names
///
/// Chains of `and`/`or` are kept flat so that long conditions stay shallow.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Param(Identifier),
    Not(Box<Condition>),
    /// Two or more operands
    And(Vec<Condition>),
    /// Two or more operands
    Or(Vec<Condition>),
}
