//! Template evaluation
//!
//! Walks a [`Document`] depth-first against a parameter context, appending
//! to a single output buffer. Includes are resolved, parsed and evaluated
//! recursively under a depth ceiling, a per-render include count and an
//! output size limit, so every render terminates.

use std::sync::Arc;

use thiserror::Error;

use crate::cache::TemplateCache;
use crate::context::Params;
use crate::error::{Diagnostic, DiagnosticKind, Span};
use crate::include::IncludeResolver;
use crate::mode::Mode;
use crate::parser::{parse_with_nesting, Condition, Conditional, Document, Node, Spanned};
use crate::parser::DEFAULT_MAX_NESTING;

/// Limit violations raised while evaluating
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("include depth exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("include cycle detected: {chain}")]
    Cycle { chain: String },

    #[error("render exceeds the limit of {limit} includes")]
    TooManyIncludes { limit: usize },

    #[error("output exceeds the limit of {limit} bytes")]
    OutputTooLarge { limit: usize },
}

/// Bounds on the work a single render may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalLimits {
    pub max_include_depth: usize,
    pub max_includes: usize,
    pub max_output_bytes: usize,
    /// Deepest `if` block or parenthesised condition in any template
    pub max_nesting: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_include_depth: 16,
            max_includes: 256,
            max_output_bytes: 8 * 1024 * 1024,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

/// The template currently being evaluated
struct Frame<'s> {
    source: &'s str,
    /// Include key, `None` at top level
    origin: Option<&'s str>,
}

impl Frame<'_> {
    fn error(&self, kind: DiagnosticKind, message: impl Into<String>, span: &Span) -> Diagnostic {
        Diagnostic::new(kind, message)
            .at(span.clone(), self.source)
            .with_origin(self.origin)
    }
}

/// Single-use evaluator for one render
pub struct Evaluator<'a> {
    params: &'a Params,
    mode: Mode,
    resolver: &'a dyn IncludeResolver,
    cache: Option<&'a TemplateCache>,
    limits: EvalLimits,
    output: String,
    /// Keys of the includes currently being evaluated, outermost first
    stack: Vec<String>,
    includes: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(params: &'a Params, mode: Mode, resolver: &'a dyn IncludeResolver) -> Self {
        Self {
            params,
            mode,
            resolver,
            cache: None,
            limits: EvalLimits::default(),
            output: String::new(),
            stack: Vec::new(),
            includes: 0,
        }
    }

    /// Parse included templates through `cache`
    pub fn with_cache(mut self, cache: &'a TemplateCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Evaluate `doc`, which was parsed from `source`
    pub fn render(mut self, doc: &Document, source: &str) -> Result<String, Diagnostic> {
        let frame = Frame {
            source,
            origin: None,
        };
        self.nodes(&doc.nodes, &frame, 0)?;
        Ok(self.output)
    }

    fn nodes(
        &mut self,
        nodes: &[Spanned<Node>],
        frame: &Frame,
        depth: usize,
    ) -> Result<(), Diagnostic> {
        for node in nodes {
            match &node.node {
                Node::Literal(text) => self.push(text, &node.span, frame)?,
                Node::Interpolation(name) => {
                    let raw = self.params.text(name.as_str());
                    let value = self.mode.substitute(&raw);
                    self.push(&value, &node.span, frame)?;
                }
                Node::Conditional(cond) => {
                    if let Some(body) = self.select(cond) {
                        self.nodes(body, frame, depth)?;
                    }
                }
                Node::Include(path) => self.include(path, &node.span, frame, depth)?,
            }
        }
        Ok(())
    }

    /// Pick the first branch whose condition holds, else the else body
    fn select<'c>(&self, cond: &'c Conditional) -> Option<&'c [Spanned<Node>]> {
        cond.branches
            .iter()
            .find(|branch| self.test(&branch.condition.node))
            .map(|branch| branch.body.as_slice())
            .or(cond.else_body.as_deref())
    }

    fn test(&self, cond: &Condition) -> bool {
        match cond {
            Condition::Param(name) => self.params.is_truthy(name.as_str()),
            Condition::Not(inner) => !self.test(inner),
            Condition::And(operands) => operands.iter().all(|c| self.test(c)),
            Condition::Or(operands) => operands.iter().any(|c| self.test(c)),
        }
    }

    fn push(&mut self, text: &str, span: &Span, frame: &Frame) -> Result<(), Diagnostic> {
        let limit = self.limits.max_output_bytes;
        if self.output.len() + text.len() > limit {
            return Err(frame.error(
                DiagnosticKind::EvaluationError,
                EvalError::OutputTooLarge { limit }.to_string(),
                span,
            ));
        }
        self.output.push_str(text);
        Ok(())
    }

    fn include(
        &mut self,
        path: &str,
        span: &Span,
        frame: &Frame,
        depth: usize,
    ) -> Result<(), Diagnostic> {
        let eval_error =
            |err: EvalError| frame.error(DiagnosticKind::EvaluationError, err.to_string(), span);

        let depth = depth + 1;
        if depth > self.limits.max_include_depth {
            return Err(eval_error(EvalError::DepthExceeded {
                limit: self.limits.max_include_depth,
            }));
        }

        self.includes += 1;
        if self.includes > self.limits.max_includes {
            return Err(eval_error(EvalError::TooManyIncludes {
                limit: self.limits.max_includes,
            }));
        }

        let resolved = self
            .resolver
            .resolve(path)
            .map_err(|err| frame.error(DiagnosticKind::SandboxViolation, err.to_string(), span))?;

        if self.stack.contains(&resolved.key) {
            let mut chain = self.stack.clone();
            chain.push(resolved.key);
            return Err(eval_error(EvalError::Cycle {
                chain: chain.join(" -> "),
            }));
        }

        let doc = match self.cache {
            Some(cache) => cache.get_or_parse(&resolved.content, self.limits.max_nesting),
            None => parse_with_nesting(&resolved.content, self.limits.max_nesting).map(Arc::new),
        }
        .map_err(|err| {
            Diagnostic::from(err)
                .locate(&resolved.content)
                .with_origin(Some(resolved.key.as_str()))
        })?;

        tracing::trace!(path, key = %resolved.key, depth, "evaluating include");
        self.stack.push(resolved.key.clone());
        let inner = Frame {
            source: &resolved.content,
            origin: Some(resolved.key.as_str()),
        };
        let result = self.nodes(&doc.nodes, &inner, depth);
        self.stack.pop();
        result
    }
}

/// Evaluate `doc` with default limits and no cache
pub fn evaluate(
    doc: &Document,
    source: &str,
    params: &Params,
    mode: Mode,
    resolver: &dyn IncludeResolver,
) -> Result<String, Diagnostic> {
    Evaluator::new(params, mode, resolver).render(doc, source)
}
