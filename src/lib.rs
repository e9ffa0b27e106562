//! Jinks Templates - a small template engine with sandboxed includes
//!
//! Templates mix literal text with `[% ... %]` directives (`if`, `elif`,
//! `else`, `endif`, `include "path"`) and `[[ $name ]]` interpolations.
//! The output mode decides how interpolated values are substituted: `html`
//! escapes markup, `css`, `xquery` and the default `xml` mode insert values
//! verbatim.
//!
//! # Example
//!
//! ```rust
//! use jinks_templates::{Engine, EngineConfig, Mode, Params};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let params = Params::new().with("name", "<World>");
//! let out = engine.render("Hello [[ $name ]]", &params, Mode::Html).unwrap();
//! assert_eq!(out, "Hello &lt;World&gt;");
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod include;
pub mod mode;
pub mod parser;
pub mod request;

use std::sync::Arc;

use tracing::debug;

pub use cache::{CacheStats, TemplateCache};
pub use config::{ConfigError, EngineConfig};
pub use context::{Params, Value};
pub use error::{Diagnostic, DiagnosticKind, ParseError, Position};
pub use eval::{evaluate, EvalError, EvalLimits, Evaluator};
pub use include::{FsSandbox, IncludeResolver, MemoryIncludes, NoIncludes, Resolved, SandboxError};
pub use mode::Mode;
pub use parser::{parse, parse_with_nesting, tokenize, Document, DEFAULT_MAX_NESTING};
pub use request::{RenderRequest, RequestError, Response};

/// A configured renderer; cheap to share between threads
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    resolver: Arc<dyn IncludeResolver>,
    cache: Option<Arc<TemplateCache>>,
}

impl Engine {
    /// Create an engine whose includes resolve below `config.sandbox_root`.
    ///
    /// Without a sandbox root every include is refused.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let resolver: Arc<dyn IncludeResolver> = match &config.sandbox_root {
            Some(root) => Arc::new(
                FsSandbox::new(root, config.max_include_bytes, config.include_timeout())
                    .map_err(ConfigError::SandboxRoot)?,
            ),
            None => Arc::new(NoIncludes),
        };
        Ok(Self::with_resolver(config, resolver))
    }

    /// Create an engine with a custom include resolver; `config.sandbox_root` is ignored
    pub fn with_resolver(config: EngineConfig, resolver: Arc<dyn IncludeResolver>) -> Self {
        let cache = (config.cache_capacity > 0)
            .then(|| Arc::new(TemplateCache::new(config.cache_capacity)));
        Self {
            config,
            resolver,
            cache,
        }
    }

    /// Share an existing cache
    pub fn with_cache(mut self, cache: Arc<TemplateCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parse every template afresh
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&TemplateCache> {
        self.cache.as_deref()
    }

    /// Render `template` against `params` in `mode`
    pub fn render(
        &self,
        template: &str,
        params: &Params,
        mode: Mode,
    ) -> Result<String, Diagnostic> {
        debug!(%mode, bytes = template.len(), params = params.len(), "rendering template");

        let max_nesting = self.config.max_nesting;
        let doc = match &self.cache {
            Some(cache) => cache.get_or_parse(template, max_nesting),
            None => parse_with_nesting(template, max_nesting).map(Arc::new),
        }
        .map_err(|err| Diagnostic::from(err).locate(template))?;

        let mut evaluator =
            Evaluator::new(params, mode, self.resolver.as_ref()).with_limits(self.config.limits());
        if let Some(cache) = &self.cache {
            evaluator = evaluator.with_cache(cache);
        }

        let result = evaluator.render(&doc, template);
        match &result {
            Ok(output) => debug!(bytes = output.len(), "render finished"),
            Err(diag) => debug!(kind = %diag.kind, origin = ?diag.origin, "render failed"),
        }
        result
    }

    /// Render a request; a missing template is a validation error
    pub fn render_request(&self, request: &RenderRequest) -> Result<String, Diagnostic> {
        let template = request.template()?;
        let empty = Params::new();
        let params = request.params.as_ref().unwrap_or(&empty);
        let mode = Mode::from_optional(request.mode.as_deref());
        self.render(template, params, mode)
    }

    /// Handle a JSON request body end to end
    pub fn handle_json(&self, body: &str) -> Response {
        let result = RenderRequest::from_json(body)
            .map_err(Diagnostic::from)
            .and_then(|request| self.render_request(&request));
        let response = Response::from(result);
        debug!(status = response.status, "request handled");
        response
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_resolver(EngineConfig::default(), Arc::new(NoIncludes))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cache", &self.cache.as_ref().map(|c| c.stats()))
            .finish_non_exhaustive()
    }
}

/// Render a template without includes or caching
///
/// # Example
///
/// ```rust
/// use jinks_templates::{render, Mode, Params};
///
/// let params = Params::new().with("logo", "../images/logo.svg");
/// let css = render(r#"url("[[ $logo ]]")"#, &params, Mode::Css).unwrap();
/// assert_eq!(css, r#"url("../images/logo.svg")"#);
/// ```
pub fn render(template: &str, params: &Params, mode: Mode) -> Result<String, Diagnostic> {
    Engine::with_resolver(EngineConfig::default().with_cache_capacity(0), Arc::new(NoIncludes))
        .render(template, params, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_literal() {
        let out = render("<p>Hello World</p>", &Params::new(), Mode::Html).unwrap();
        assert_eq!(out, "<p>Hello World</p>");
    }

    #[test]
    fn test_render_parse_error_has_position() {
        let err = render("<div>[% if $foo %]bar", &Params::new(), Mode::Html).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::ParseError);
        assert!(err.message.contains("Missing endif"));
        assert_eq!(err.position.map(|p| (p.line, p.column)), Some((1, 6)));
    }

    #[test]
    fn test_default_engine_refuses_includes() {
        let err = Engine::default()
            .render(r#"[% include "a.html" %]"#, &Params::new(), Mode::Html)
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::SandboxViolation);
    }

    #[test]
    fn test_engine_caches_top_level_templates() {
        let engine = Engine::default();
        let params = Params::new().with("x", "1");
        for _ in 0..3 {
            assert_eq!(engine.render("[[ $x ]]", &params, Mode::Css).unwrap(), "1");
        }
        let stats = engine.cache().map(TemplateCache::stats).unwrap();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[test]
    fn test_without_cache() {
        let engine = Engine::default().without_cache();
        assert!(engine.cache().is_none());
        assert_eq!(engine.render("x", &Params::new(), Mode::Css).unwrap(), "x");
    }

    #[test]
    fn test_missing_sandbox_root_is_config_error() {
        let config = EngineConfig::default().with_sandbox_root("/nonexistent/jinks/root");
        assert!(matches!(Engine::new(config), Err(ConfigError::SandboxRoot(_))));
    }

    #[test]
    fn test_render_request_defaults() {
        let engine = Engine::default();
        let out = engine
            .render_request(&RenderRequest::new("[% if $x %]x[% else %]none[% endif %]"))
            .unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn test_handle_json_success() {
        let response = Engine::default()
            .handle_json(r#"{"template": "<p>[[ $a ]]</p>", "params": {"a": "b"}}"#);
        assert_eq!(response.status, 200);
        assert_eq!(response.result(), Some("<p>b</p>"));
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let template = "[% if $a %]".repeat(10_000) + &"[% endif %]".repeat(10_000);
        let body = serde_json::json!({ "template": template }).to_string();
        let response = Engine::default().handle_json(&body);
        assert_eq!(response.status, 400);
        assert_eq!(response.body["kind"], "ParseError");
        assert_eq!(response.body["message"], "Nesting exceeds the limit of 64 levels");

        let strict = Engine::new(EngineConfig::default().with_max_nesting(1)).unwrap();
        let err = strict
            .render("[% if $a %][% if $b %]x[% endif %][% endif %]", &Params::new(), Mode::Html)
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::ParseError);
        assert_eq!(err.position.map(|p| (p.line, p.column)), Some((1, 12)));
    }

    #[test]
    fn test_handle_json_missing_template() {
        let response = Engine::default().handle_json("{}");
        assert_eq!(response.status, 400);
        assert!(response.body_string().contains("ERROR"));
    }
}
