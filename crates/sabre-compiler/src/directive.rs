//! A single named directive and its handler.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Turns a directive's argument expression into compiled template text.
///
/// Handlers are pure text generators. They receive the normalized text found
/// between the directive's parentheses (empty when there are none) and return
/// the replacement. Any `Fn(&str) -> String` closure is a handler.
///
/// ```rust
/// use sabre_compiler::DirectiveHandler;
///
/// let upper = |expr: &str| format!("{{{{ ({expr}) | upper }}}}");
/// assert_eq!(upper.expand("name"), "{{ (name) | upper }}");
/// ```
pub trait DirectiveHandler: Send + Sync {
    fn expand(&self, expression: &str) -> String;
}

impl<F> DirectiveHandler for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn expand(&self, expression: &str) -> String {
        self(expression)
    }
}

/// A registered directive.
///
/// By default a directive named `name` matches `@name` optionally followed by
/// a parenthesised expression. A custom [`pattern`](Directive::with_pattern)
/// replaces that matcher entirely; its first capture group, if any, is handed
/// to the handler.
#[derive(Clone)]
pub struct Directive {
    name: String,
    handler: Arc<dyn DirectiveHandler>,
    pattern: Option<Regex>,
}

impl Directive {
    pub fn new(name: impl Into<String>, handler: impl DirectiveHandler + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            pattern: None,
        }
    }

    /// Replaces the default `@name(...)` matcher.
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub fn expand(&self, expression: &str) -> String {
        self.handler.expand(expression)
    }
}

impl fmt::Debug for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directive")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .finish_non_exhaustive()
    }
}
