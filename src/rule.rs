//! Line rewrite rules.
//!
//! A rule sees one line body at a time (no terminator) and either declines it
//! or returns the replacement body. Terminators are owned by the engine.

use regex::Regex;
use std::sync::OnceLock;

/// Predicate and transform over a single line, fused into one call.
pub trait RewriteRule {
    /// Returns the replacement for `line`, or `None` when the rule does not apply.
    fn rewrite(&self, line: &str) -> Option<String>;
}

impl<R: RewriteRule + ?Sized> RewriteRule for &R {
    fn rewrite(&self, line: &str) -> Option<String> {
        (**self).rewrite(line)
    }
}

/// Turns `#include "foo.hpp"` into `#include <foo.hpp>`.
///
/// Only lines made of leading whitespace followed by the directive match.
/// Leading whitespace, the directive spelling (`#include`, `# include`) and
/// anything after the closing quote are kept verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteIncludeRule;

fn quote_include_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(?P<lead>\s*#\s*include\s*)"(?P<path>[^"]*)"(?P<rest>.*)$"#)
            .expect("quote include pattern is a valid regex")
    })
}

impl RewriteRule for QuoteIncludeRule {
    fn rewrite(&self, line: &str) -> Option<String> {
        let caps = quote_include_regex().captures(line)?;
        Some(format!("{}<{}>{}", &caps["lead"], &caps["path"], &caps["rest"]))
    }
}

/// Swaps one exact line body for another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralRule {
    pub from: String,
    pub to: String,
}

impl LiteralRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl RewriteRule for LiteralRule {
    fn rewrite(&self, line: &str) -> Option<String> {
        (line == self.from).then(|| self.to.clone())
    }
}
