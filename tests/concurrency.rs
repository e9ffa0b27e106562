//! Concurrent renders sharing one engine and cache

use std::sync::Arc;

use jinks_templates::{Engine, EngineConfig, MemoryIncludes, Mode, Params, TemplateCache};

#[test]
fn test_shared_engine_renders_identically_across_threads() {
    let includes = MemoryIncludes::new().with("row.html", "<td>[[ $cell ]]</td>");
    let engine = Engine::with_resolver(EngineConfig::default(), Arc::new(includes));
    let template = r#"<tr>[% if $cell %][% include "row.html" %][% else %]<td/>[% endif %]</tr>"#;

    std::thread::scope(|s| {
        for i in 0..8 {
            let engine = &engine;
            s.spawn(move || {
                let params = Params::new().with("cell", format!("<{i}>"));
                for _ in 0..50 {
                    let out = engine.render(template, &params, Mode::Html).unwrap();
                    assert_eq!(out, format!("<tr><td>&lt;{i}&gt;</td></tr>"));
                }
            });
        }
    });

    let cache = engine.cache().unwrap();
    // The page and the included row
    assert_eq!(cache.len(), 2);
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 8 * 50 * 2);
}

#[test]
fn test_cache_shared_between_engines() {
    let cache = Arc::new(TemplateCache::new(16));
    let html = Engine::default().with_cache(Arc::clone(&cache));
    let css = Engine::default().with_cache(Arc::clone(&cache));
    let params = Params::new().with("v", "a&b");

    assert_eq!(html.render("[[ $v ]]", &params, Mode::Html).unwrap(), "a&amp;b");
    assert_eq!(css.render("[[ $v ]]", &params, Mode::Css).unwrap(), "a&b");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn test_parse_failures_under_contention_are_not_cached() {
    let engine = Engine::default();
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let err = engine
                    .render("<div>[% if $foo %]bar", &Params::new(), Mode::Html)
                    .unwrap_err();
                assert!(err.message.contains("Missing endif"));
            });
        }
    });
    assert!(engine.cache().unwrap().is_empty());
}
