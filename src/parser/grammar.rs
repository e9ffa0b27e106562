//! Parser implementation
//!
//! Directive heads (`if <cond>`, `include "path"`, ...) are recognised from
//! the token stream and their condition expressions are parsed with chumsky.
//! Block structure is then assembled by recursive descent so that an
//! unterminated `if` can be reported at its opening directive.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::{format_token, ParseError};
use crate::parser::ast::*;
use crate::parser::lexer::{tokenize, Token};

/// Deepest `if` block or parenthesised condition accepted by [`parse`]
pub const DEFAULT_MAX_NESTING: usize = 64;

/// Parse template source into an AST
pub fn parse(source: &str) -> Result<Document, ParseError> {
    parse_with_nesting(source, DEFAULT_MAX_NESTING)
}

/// Parse with an explicit bound on `if` block and parenthesis nesting
pub fn parse_with_nesting(source: &str, max_nesting: usize) -> Result<Document, ParseError> {
    let tokens = tokenize(source)?;
    let items = group(tokens, max_nesting)?;
    BlockParser::new(items, max_nesting).document()
}

/// One top-level construct: a run of text, an interpolation, or a directive
#[derive(Debug, Clone, PartialEq)]
enum Item {
    Text(String),
    Interpolation(Identifier),
    Directive(Directive),
}

#[derive(Debug, Clone, PartialEq)]
enum Directive {
    If(Spanned<Condition>),
    Elif(Spanned<Condition>),
    Else,
    Endif,
    Include(String),
}

/// Collapse the flat token stream into text, interpolation, and directive items
fn group(tokens: Vec<(Token, Span)>, max_nesting: usize) -> Result<Vec<Spanned<Item>>, ParseError> {
    let mut items = Vec::new();
    let mut tokens = tokens.into_iter();

    while let Some((tok, span)) = tokens.next() {
        match tok {
            Token::Text(text) => items.push(Spanned::new(Item::Text(text), span)),
            Token::InterpolationOpen => {
                let (inner, end) = take_until(&mut tokens, &Token::InterpolationClose, span.end);
                let full = span.start..end;
                match inner.as_slice() {
                    [(Token::Variable(name), _)] => items.push(Spanned::new(
                        Item::Interpolation(Identifier::new(name.clone())),
                        full,
                    )),
                    _ => return Err(ParseError::InvalidInterpolation { span: full }),
                }
            }
            Token::DirectiveOpen => {
                let (inner, end) = take_until(&mut tokens, &Token::DirectiveClose, span.end);
                let full = span.start..end;
                let directive = parse_directive(&inner, &full, max_nesting)?;
                items.push(Spanned::new(Item::Directive(directive), full));
            }
            other => {
                // The lexer only emits marker-interior tokens between open/close markers
                return Err(ParseError::Syntax {
                    span,
                    message: format!("Unexpected {}", format_token(&other)),
                    expected: vec![],
                });
            }
        }
    }

    Ok(items)
}

/// Collect tokens up to `close`, returning them and the end offset of the close marker
fn take_until(
    tokens: &mut impl Iterator<Item = (Token, Span)>,
    close: &Token,
    fallback_end: usize,
) -> (Vec<(Token, Span)>, usize) {
    let mut inner = Vec::new();
    let mut end = fallback_end;
    for (tok, span) in tokens.by_ref() {
        end = span.end;
        if &tok == close {
            break;
        }
        inner.push((tok, span));
    }
    (inner, end)
}

/// Recognise a directive from the tokens between `[%` and `%]`
fn parse_directive(
    inner: &[(Token, Span)],
    full: &Span,
    max_nesting: usize,
) -> Result<Directive, ParseError> {
    let Some(((head, head_span), args)) = inner.split_first() else {
        return Err(ParseError::Syntax {
            span: full.clone(),
            message: "Empty directive".to_string(),
            expected: expected_directives(),
        });
    };
    let args_end = full.end - 2;

    match head {
        Token::If => {
            let condition = parse_condition(args, head_span, args_end, "if", max_nesting)?;
            Ok(Directive::If(condition))
        }
        Token::Elif => {
            let condition = parse_condition(args, head_span, args_end, "elif", max_nesting)?;
            Ok(Directive::Elif(condition))
        }
        Token::Else => no_arguments(args, "else").map(|_| Directive::Else),
        Token::Endif => no_arguments(args, "endif").map(|_| Directive::Endif),
        Token::Include => match args {
            [(Token::String(path), _)] => Ok(Directive::Include(path.clone())),
            _ => Err(ParseError::Syntax {
                span: args_span(args).unwrap_or_else(|| head_span.clone()),
                message: "include expects a single quoted relative path".to_string(),
                expected: vec!["string literal".to_string()],
            }),
        },
        other => Err(ParseError::Syntax {
            span: head_span.clone(),
            message: format!("Unknown directive {}", format_token(other)),
            expected: expected_directives(),
        }),
    }
}

fn expected_directives() -> Vec<String> {
    ["if", "elif", "else", "endif", "include"]
        .iter()
        .map(|k| format!("keyword '{}'", k))
        .collect()
}

fn args_span(args: &[(Token, Span)]) -> Option<Span> {
    let first = args.first()?;
    let last = args.last()?;
    Some(first.1.start..last.1.end)
}

fn no_arguments(args: &[(Token, Span)], keyword: &str) -> Result<(), ParseError> {
    match args_span(args) {
        None => Ok(()),
        Some(span) => Err(ParseError::Syntax {
            span,
            message: format!("{} takes no arguments", keyword),
            expected: vec!["'%]'".to_string()],
        }),
    }
}

/// Parse the condition of an `if`/`elif` directive
fn parse_condition(
    args: &[(Token, Span)],
    head_span: &Span,
    eoi: usize,
    keyword: &str,
    max_nesting: usize,
) -> Result<Spanned<Condition>, ParseError> {
    let Some(span) = args_span(args) else {
        return Err(ParseError::Syntax {
            span: head_span.clone(),
            message: format!("{} expects a condition", keyword),
            expected: vec!["variable".to_string()],
        });
    };
    check_paren_depth(args, max_nesting)?;

    // Create a token stream that chumsky can use
    let token_iter = args.iter().cloned().map(|(tok, span)| (tok, span.into()));
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((eoi..eoi).into(), |(t, s): (_, _)| (t, s));

    condition_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map(|cond| Spanned::new(cond, span.clone()))
        .map_err(|errs| match errs.into_iter().next() {
            Some(err) => err.into(),
            None => ParseError::Syntax {
                span,
                message: format!("Invalid {} condition", keyword),
                expected: vec![],
            },
        })
}

/// Reject parenthesis nesting beyond `max_nesting` before the recursive parser sees it
fn check_paren_depth(args: &[(Token, Span)], max_nesting: usize) -> Result<(), ParseError> {
    let mut depth = 0usize;
    for (tok, span) in args {
        match tok {
            Token::ParenOpen => {
                depth += 1;
                if depth > max_nesting {
                    return Err(ParseError::NestingTooDeep {
                        limit: max_nesting,
                        span: span.clone(),
                    });
                }
            }
            Token::ParenClose => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn condition_parser<'a, I>() -> impl Parser<'a, I, Condition, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    // Both `$name` and a bare `name` refer to a parameter
    let name = select! {
        Token::Variable(s) => Identifier::new(s),
        Token::Ident(s) => Identifier::new(s),
    };

    recursive(|condition| {
        let atom = choice((
            name.map(Condition::Param),
            condition.delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));

        // not > and > or
        // Negations pair off, so a run of `not`s yields at most one node
        let negation = just(Token::Not)
            .repeated()
            .collect::<Vec<_>>()
            .then(atom)
            .map(|(nots, cond)| {
                if nots.len() % 2 == 1 {
                    Condition::Not(Box::new(cond))
                } else {
                    cond
                }
            });

        let conjunction = negation
            .clone()
            .then(
                just(Token::And)
                    .ignore_then(negation)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| combine_operands(first, rest, Condition::And));

        conjunction
            .clone()
            .then(
                just(Token::Or)
                    .ignore_then(conjunction)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| combine_operands(first, rest, Condition::Or))
            .boxed()
    })
}

fn combine_operands(
    first: Condition,
    rest: Vec<Condition>,
    combine: fn(Vec<Condition>) -> Condition,
) -> Condition {
    if rest.is_empty() {
        return first;
    }
    let mut operands = Vec::with_capacity(rest.len() + 1);
    operands.push(first);
    operands.extend(rest);
    combine(operands)
}

/// A directive that closes the block currently being parsed
enum Terminator {
    Elif(Spanned<Condition>),
    Else,
    Endif,
}

impl Terminator {
    fn keyword(&self) -> &'static str {
        match self {
            Terminator::Elif(_) => "elif",
            Terminator::Else => "else",
            Terminator::Endif => "endif",
        }
    }
}

/// Recursive-descent block builder over grouped items
struct BlockParser {
    items: std::vec::IntoIter<Spanned<Item>>,
    /// Open `if` blocks around the current position
    depth: usize,
    max_nesting: usize,
}

impl BlockParser {
    fn new(items: Vec<Spanned<Item>>, max_nesting: usize) -> Self {
        Self {
            items: items.into_iter(),
            depth: 0,
            max_nesting,
        }
    }

    fn document(mut self) -> Result<Document, ParseError> {
        let (nodes, terminator) = self.block()?;
        match terminator {
            None => Ok(Document { nodes }),
            Some(t) => Err(ParseError::UnexpectedTerminator {
                keyword: t.node.keyword(),
                span: t.span,
            }),
        }
    }

    /// Parse nodes until an `elif`/`else`/`endif` or the end of input
    fn block(&mut self) -> Result<(Vec<Spanned<Node>>, Option<Spanned<Terminator>>), ParseError> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let span = item.span;
            let node = match item.node {
                Item::Text(text) => Node::Literal(text),
                Item::Interpolation(name) => Node::Interpolation(name),
                Item::Directive(Directive::Include(path)) => Node::Include(path),
                Item::Directive(Directive::If(condition)) => {
                    if self.depth >= self.max_nesting {
                        return Err(ParseError::NestingTooDeep {
                            limit: self.max_nesting,
                            span,
                        });
                    }
                    self.depth += 1;
                    let (conditional, end) = self.conditional(condition, &span)?;
                    self.depth -= 1;
                    nodes.push(Spanned::new(Node::Conditional(conditional), span.start..end));
                    continue;
                }
                Item::Directive(Directive::Elif(condition)) => {
                    return Ok((nodes, Some(Spanned::new(Terminator::Elif(condition), span))))
                }
                Item::Directive(Directive::Else) => {
                    return Ok((nodes, Some(Spanned::new(Terminator::Else, span))))
                }
                Item::Directive(Directive::Endif) => {
                    return Ok((nodes, Some(Spanned::new(Terminator::Endif, span))))
                }
            };
            nodes.push(Spanned::new(node, span));
        }

        Ok((nodes, None))
    }

    /// Parse the branches of an `if` whose directive spans `if_span`,
    /// returning the conditional and the end offset of its `endif`
    fn conditional(
        &mut self,
        first: Spanned<Condition>,
        if_span: &Span,
    ) -> Result<(Conditional, usize), ParseError> {
        let missing_endif = || ParseError::MissingEndif {
            span: if_span.clone(),
        };
        let mut branches = Vec::new();
        let mut condition = first;

        loop {
            let (body, terminator) = self.block()?;
            branches.push(Branch { condition, body });

            let terminator = terminator.ok_or_else(missing_endif)?;
            match terminator.node {
                Terminator::Elif(next) => condition = next,
                Terminator::Endif => {
                    let conditional = Conditional {
                        branches,
                        else_body: None,
                    };
                    return Ok((conditional, terminator.span.end));
                }
                Terminator::Else => {
                    let (else_body, terminator) = self.block()?;
                    let terminator = terminator.ok_or_else(missing_endif)?;
                    return match terminator.node {
                        Terminator::Endif => Ok((
                            Conditional {
                                branches,
                                else_body: Some(else_body),
                            },
                            terminator.span.end,
                        )),
                        other => Err(ParseError::ClauseAfterElse {
                            keyword: other.keyword(),
                            span: terminator.span,
                        }),
                    };
                }
            }
        }
    }
}
