//! Error types for parsing and the unified render diagnostic

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::parser::lexer::{Construct, Token};

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Structural and lexical defects in template source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unterminated {construct}: missing closing marker")]
    Unterminated { construct: Construct, span: Span },

    #[error("Unexpected character '{found}' in {construct}")]
    UnexpectedCharacter {
        found: String,
        construct: Construct,
        span: Span,
    },

    #[error("{message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    #[error("Invalid interpolation: expected a single $-prefixed variable")]
    InvalidInterpolation { span: Span },

    #[error("Missing endif for if block")]
    MissingEndif { span: Span },

    #[error("Unexpected {keyword} without an open if block")]
    UnexpectedTerminator { keyword: &'static str, span: Span },

    #[error("Unexpected {keyword} after else in the same if block")]
    ClauseAfterElse { keyword: &'static str, span: Span },

    #[error("Nesting exceeds the limit of {limit} levels")]
    NestingTooDeep { limit: usize, span: Span },
}

impl ParseError {
    /// Source location of the offending construct
    pub fn span(&self) -> &Span {
        match self {
            ParseError::Unterminated { span, .. }
            | ParseError::UnexpectedCharacter { span, .. }
            | ParseError::Syntax { span, .. }
            | ParseError::InvalidInterpolation { span }
            | ParseError::MissingEndif { span }
            | ParseError::UnexpectedTerminator { span, .. }
            | ParseError::ClauseAfterElse { span, .. }
            | ParseError::NestingTooDeep { span, .. } => span,
        }
    }

    /// Tokens the parser would have accepted, if known
    pub fn expected(&self) -> &[String] {
        match self {
            ParseError::Syntax { expected, .. } => expected,
            _ => &[],
        }
    }
}

impl<'a> From<chumsky::error::Rich<'a, Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => match found {
                Some(tok) => format!("Unexpected {}", format_token(tok)),
                None => "Unexpected end of directive".to_string(),
            },
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("'%]'".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
pub(crate) fn format_token(tok: &Token) -> String {
    match tok {
        Token::Variable(s) => format!("variable '${}'", s),
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Text(_) => "literal text".to_string(),
        Token::DirectiveOpen => "'[%'".to_string(),
        Token::DirectiveClose => "'%]'".to_string(),
        Token::InterpolationOpen => "'[['".to_string(),
        Token::InterpolationClose => "']]'".to_string(),
        Token::If => "keyword 'if'".to_string(),
        Token::Elif => "keyword 'elif'".to_string(),
        Token::Else => "keyword 'else'".to_string(),
        Token::Endif => "keyword 'endif'".to_string(),
        Token::Include => "keyword 'include'".to_string(),
        Token::Not => "'not'".to_string(),
        Token::And => "'and'".to_string(),
        Token::Or => "'or'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
    }
}

/// The closed set of failure categories a render can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    ParseError,
    EvaluationError,
    SandboxViolation,
    ValidationError,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::ParseError => "ParseError",
            DiagnosticKind::EvaluationError => "EvaluationError",
            DiagnosticKind::SandboxViolation => "SandboxViolation",
            DiagnosticKind::ValidationError => "ValidationError",
        }
    }

    /// Response status used at the request boundary
    pub fn status(&self) -> u16 {
        match self {
            DiagnosticKind::ValidationError | DiagnosticKind::ParseError => 400,
            DiagnosticKind::SandboxViolation => 403,
            DiagnosticKind::EvaluationError => 422,
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based line and column of a byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn locate(source: &str, offset: usize) -> Self {
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Self {
            offset,
            line,
            column,
        }
    }
}

/// A failure from any stage of the render pipeline
///
/// Messages are short and never carry resolved filesystem paths or
/// included file content.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<Span>,
    pub position: Option<Position>,
    /// Include path of the template the failure occurred in; `None` for the top-level template
    pub origin: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            position: None,
            origin: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::ValidationError, message)
    }

    /// Attach a span and resolve its position against `source`
    pub fn at(mut self, span: Span, source: &str) -> Self {
        self.position = Some(Position::locate(source, span.start));
        self.span = Some(span);
        self
    }

    /// Resolve the already-attached span against `source`
    pub fn locate(mut self, source: &str) -> Self {
        if let Some(span) = &self.span {
            self.position = Some(Position::locate(source, span.start));
        }
        self
    }

    /// Record the include the failure came from, keeping the innermost one
    pub fn with_origin(mut self, origin: Option<&str>) -> Self {
        if self.origin.is_none() {
            self.origin = origin.map(str::to_string);
        }
        self
    }

    /// Format the diagnostic with source context using ariadne
    pub fn report(&self, source: &str, filename: &str) -> String {
        let offset = self.span.as_ref().map(|s| s.start).unwrap_or(0);
        let mut report =
            Report::build(ReportKind::Error, filename, offset).with_message(&self.message);
        if let Some(span) = &self.span {
            report = report.with_label(
                Label::new((filename, span.clone()))
                    .with_message(self.kind.to_string())
                    .with_color(Color::Red),
            );
        }

        let mut buf = Vec::new();
        match report
            .finish()
            .write((filename, Source::from(source)), &mut buf)
        {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        let mut message = err.to_string();
        if !err.expected().is_empty() {
            message.push_str(&format!(" (expected {})", err.expected().join(", ")));
        }
        Self {
            span: Some(err.span().clone()),
            ..Self::new(DiagnosticKind::ParseError, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_first_line() {
        let pos = Position::locate("<div>[% if $foo %]bar", 5);
        assert_eq!(pos.line, 1);
        assert_eq!(pos.column, 6);
    }

    #[test]
    fn test_position_later_line() {
        let pos = Position::locate("a\nbc\ndéf", 8);
        assert_eq!(pos.line, 3);
        assert_eq!(pos.column, 3);
    }

    #[test]
    fn test_missing_endif_display() {
        let err = ParseError::MissingEndif { span: 5..7 };
        assert!(err.to_string().contains("Missing endif"));
    }

    #[test]
    fn test_diagnostic_from_parse_error() {
        let source = "<div>[% if $foo %]bar";
        let diag = Diagnostic::from(ParseError::MissingEndif { span: 5..7 }).locate(source);
        assert_eq!(diag.kind, DiagnosticKind::ParseError);
        assert_eq!(diag.span, Some(5..7));
        assert_eq!(diag.position.map(|p| p.column), Some(6));
        assert!(diag.to_string().starts_with("ParseError: Missing endif"));
    }

    #[test]
    fn test_innermost_origin_is_kept() {
        let diag = Diagnostic::validation("x")
            .with_origin(Some("inner.html"))
            .with_origin(Some("outer.html"));
        assert_eq!(diag.origin.as_deref(), Some("inner.html"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(DiagnosticKind::ValidationError.status(), 400);
        assert_eq!(DiagnosticKind::ParseError.status(), 400);
        assert_eq!(DiagnosticKind::SandboxViolation.status(), 403);
        assert_eq!(DiagnosticKind::EvaluationError.status(), 422);
    }

    #[test]
    fn test_report_mentions_message() {
        let source = "<div>[% if $foo %]bar";
        let diag = Diagnostic::from(ParseError::MissingEndif { span: 5..7 }).locate(source);
        let report = diag.report(source, "template");
        assert!(report.contains("Missing endif"));
    }
}
