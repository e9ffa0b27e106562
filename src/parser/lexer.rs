//! Lexer for the template language using logos
//!
//! Literal text is split out by [`tokenize`]; only the inside of `[% ... %]`
//! and `[[ ... ]]` markers is handed to the logos lexer.

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Markers
    #[token("[%")]
    DirectiveOpen,
    #[token("%]")]
    DirectiveClose,
    #[token("[[")]
    InterpolationOpen,
    #[token("]]")]
    InterpolationClose,

    // Directive keywords
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("endif")]
    Endif,
    #[token("include")]
    Include,

    // Condition operators
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,

    // Sigil-prefixed parameter reference, stored without the `$`
    #[regex(r"\$[A-Za-z_][A-Za-z0-9_.\-]*", |lex| lex.slice()[1..].to_string())]
    Variable(String),

    // Identifiers must come after keywords
    #[regex(r"[A-Za-z_][A-Za-z0-9_.\-]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unquote(lex.slice()))]
    String(String),

    /// Verbatim text between markers. Produced by [`tokenize`], never by logos.
    Text(String),
}

/// Strip the surrounding quotes and resolve backslash escapes
fn unquote(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Which delimited construct a marker opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Construct {
    Directive,
    Interpolation,
}

impl Construct {
    fn open(self) -> &'static str {
        match self {
            Construct::Directive => "[%",
            Construct::Interpolation => "[[",
        }
    }

    fn close(self) -> &'static str {
        match self {
            Construct::Directive => "%]",
            Construct::Interpolation => "]]",
        }
    }

    fn close_token(self) -> Token {
        match self {
            Construct::Directive => Token::DirectiveClose,
            Construct::Interpolation => Token::InterpolationClose,
        }
    }

    fn open_token(self) -> Token {
        match self {
            Construct::Directive => Token::DirectiveOpen,
            Construct::Interpolation => Token::InterpolationOpen,
        }
    }
}

impl std::fmt::Display for Construct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Construct::Directive => write!(f, "directive"),
            Construct::Interpolation => write!(f, "interpolation"),
        }
    }
}

/// Scan template source into a flat token stream with spans
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let Some((offset, construct)) = next_marker(rest) else {
            tokens.push((Token::Text(rest.to_string()), pos..source.len()));
            break;
        };

        if offset > 0 {
            tokens.push((Token::Text(rest[..offset].to_string()), pos..pos + offset));
        }
        pos = lex_delimited(source, pos + offset, construct, &mut tokens)?;
    }

    Ok(tokens)
}

/// Find the earliest opening marker in `text`
fn next_marker(text: &str) -> Option<(usize, Construct)> {
    let directive = text.find(Construct::Directive.open());
    let interpolation = text.find(Construct::Interpolation.open());
    match (directive, interpolation) {
        (Some(d), Some(i)) if i < d => Some((i, Construct::Interpolation)),
        (Some(d), _) => Some((d, Construct::Directive)),
        (None, Some(i)) => Some((i, Construct::Interpolation)),
        (None, None) => None,
    }
}

/// Lex one delimited construct starting at `start`, returning the offset just past its close marker
fn lex_delimited(
    source: &str,
    start: usize,
    construct: Construct,
    tokens: &mut Vec<(Token, Span)>,
) -> Result<usize, ParseError> {
    let base = start + construct.open().len();
    let unterminated = || ParseError::Unterminated {
        construct,
        span: start..base,
    };

    if !source[base..].contains(construct.close()) {
        return Err(unterminated());
    }

    tokens.push((construct.open_token(), start..base));

    let close = construct.close_token();
    let mut lexer = Token::lexer(&source[base..]);
    while let Some(result) = lexer.next() {
        let span = base + lexer.span().start..base + lexer.span().end;
        match result {
            Ok(tok) if tok == close => {
                tokens.push((tok, span.clone()));
                return Ok(span.end);
            }
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => {
                return Err(ParseError::UnexpectedCharacter {
                    found: lexer.slice().to_string(),
                    construct,
                    span,
                })
            }
        }
    }

    // The close marker was swallowed by a string literal
    Err(unterminated())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("Should tokenize")
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            kinds("<p>Hello World</p>"),
            vec![Token::Text("<p>Hello World</p>".to_string())]
        );
    }

    #[test]
    fn test_empty_source() {
        assert!(kinds("").is_empty());
    }

    #[test]
    fn test_interpolation_with_and_without_spaces() {
        let expected = vec![
            Token::InterpolationOpen,
            Token::Variable("name".to_string()),
            Token::InterpolationClose,
        ];
        assert_eq!(kinds("[[$name]]"), expected);
        assert_eq!(kinds("[[ $name ]]"), expected);
    }

    #[test]
    fn test_hyphenated_variable() {
        assert_eq!(
            kinds("[% if $data-root %]"),
            vec![
                Token::DirectiveOpen,
                Token::If,
                Token::Variable("data-root".to_string()),
                Token::DirectiveClose,
            ]
        );
    }

    #[test]
    fn test_directive_keywords() {
        let tokens = kinds("[% elif %][% else %][% endif %]");
        assert_eq!(
            tokens,
            vec![
                Token::DirectiveOpen,
                Token::Elif,
                Token::DirectiveClose,
                Token::DirectiveOpen,
                Token::Else,
                Token::DirectiveClose,
                Token::DirectiveOpen,
                Token::Endif,
                Token::DirectiveClose,
            ]
        );
    }

    #[test]
    fn test_condition_operators() {
        let tokens = kinds("[% if not ($a and b) or $c %]");
        assert_eq!(
            tokens,
            vec![
                Token::DirectiveOpen,
                Token::If,
                Token::Not,
                Token::ParenOpen,
                Token::Variable("a".to_string()),
                Token::And,
                Token::Ident("b".to_string()),
                Token::ParenClose,
                Token::Or,
                Token::Variable("c".to_string()),
                Token::DirectiveClose,
            ]
        );
    }

    #[test]
    fn test_include_string_literals() {
        assert_eq!(
            kinds(r#"[% include "parts/head.html" %][% include 'a\'b' %]"#),
            vec![
                Token::DirectiveOpen,
                Token::Include,
                Token::String("parts/head.html".to_string()),
                Token::DirectiveClose,
                Token::DirectiveOpen,
                Token::Include,
                Token::String("a'b".to_string()),
                Token::DirectiveClose,
            ]
        );
    }

    #[test]
    fn test_close_marker_inside_string() {
        assert_eq!(
            kinds(r#"[% include "odd%]name" %]"#),
            vec![
                Token::DirectiveOpen,
                Token::Include,
                Token::String("odd%]name".to_string()),
                Token::DirectiveClose,
            ]
        );
    }

    #[test]
    fn test_text_around_markers_keeps_spans() {
        let tokens = tokenize("a[[ $x ]]b").expect("Should tokenize");
        assert_eq!(tokens[0], (Token::Text("a".to_string()), 0..1));
        assert_eq!(tokens[1], (Token::InterpolationOpen, 1..3));
        assert_eq!(tokens[2], (Token::Variable("x".to_string()), 4..6));
        assert_eq!(tokens[3], (Token::InterpolationClose, 7..9));
        assert_eq!(tokens[4], (Token::Text("b".to_string()), 9..10));
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(
            kinds("[% iffy %]")[1],
            Token::Ident("iffy".to_string())
        );
    }

    #[test]
    fn test_unterminated_directive() {
        let err = tokenize("<div>[% if $foo bar").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Unterminated {
                construct: Construct::Directive,
                ref span,
            } if *span == (5..7)
        ));
    }

    #[test]
    fn test_unterminated_interpolation() {
        let err = tokenize("x [[ $foo").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Unterminated {
                construct: Construct::Interpolation,
                ..
            }
        ));
    }

    #[test]
    fn test_close_marker_only_in_string_is_unterminated() {
        let err = tokenize(r#"[% include "a%]b""#).unwrap_err();
        assert!(matches!(err, ParseError::Unterminated { .. }));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("[% if @x %]").unwrap_err();
        match err {
            ParseError::UnexpectedCharacter { found, span, .. } => {
                assert!(found.starts_with('@'));
                assert_eq!(span.start, 6);
            }
            other => panic!("Expected unexpected character, got {other:?}"),
        }
    }

    #[test]
    fn test_earliest_marker_wins() {
        assert_eq!(
            kinds("[[ $a ]][% endif %]")[0],
            Token::InterpolationOpen
        );
    }
}
