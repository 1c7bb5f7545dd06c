//! Directive registry and the directive expansion stage.
//!
//! The registry maps directive names to [`Directive`]s and expands every
//! occurrence of `@name` or `@name(expression)` in template text. Names are
//! processed in sorted order so compiled output is deterministic.
//!
//! # Matching rules
//!
//! - `@name` must not be preceded by a word character, so `email@if.com` is
//!   left alone.
//! - `@name` must not be followed by a word character, so `@error` does not
//!   match inside `@errors`.
//! - Spaces and tabs may separate the name from its `(`. The parenthesised
//!   expression may span lines and nest parentheses to any depth.
//! - `@@name` is an escape and produces the literal text `@name`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use regex::Regex;

use crate::defaults;
use crate::directive::{Directive, DirectiveHandler};
use crate::error::CompileError;
use crate::expression::{find_closing_paren, is_identifier, normalize};
use crate::pipeline::CompilerStage;

/// Stage priority of directive expansion. Runs after echo normalization.
pub const DIRECTIVES_PRIORITY: i32 = 100;

/// Named directives plus a cache of their compiled matchers.
pub struct DirectiveRegistry {
    directives: BTreeMap<String, Directive>,
    patterns: Mutex<HashMap<String, Regex>>,
}

impl DirectiveRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            directives: BTreeMap::new(),
            patterns: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a registry holding the default directive set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        defaults::register_defaults(&mut registry);
        registry
    }

    /// Registers a handler under `name`, replacing any existing directive.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidDirectiveName`] unless `name` is a plain
    /// identifier.
    ///
    /// ```rust
    /// use sabre_compiler::DirectiveRegistry;
    ///
    /// let mut registry = DirectiveRegistry::new();
    /// registry
    ///     .register("money", |e: &str| format!("{{{{ ({e}) | round(2) }}}}"))
    ///     .unwrap();
    /// assert_eq!(registry.compile("@money($total)"), "{{ (total) | round(2) }}");
    /// ```
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl DirectiveHandler + 'static,
    ) -> Result<(), CompileError> {
        self.register_directive(Directive::new(name, handler))
    }

    /// Registers a fully built [`Directive`], replacing any existing one.
    pub fn register_directive(&mut self, directive: Directive) -> Result<(), CompileError> {
        let name = directive.name().to_string();
        if !is_identifier(&name) {
            return Err(CompileError::InvalidDirectiveName(name));
        }
        self.patterns
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
        tracing::trace!(directive = %name, "registered directive");
        self.directives.insert(name, directive);
        Ok(())
    }

    /// Looks up a directive by name.
    pub fn get(&self, name: &str) -> Result<&Directive, CompileError> {
        self.directives
            .get(name)
            .ok_or_else(|| CompileError::DirectiveNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.directives.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Expands every registered directive in `text`.
    pub fn compile(&self, text: &str) -> String {
        self.directives
            .values()
            .fold(text.to_string(), |acc, directive| {
                self.expand_directive(&acc, directive)
            })
    }

    fn expand_directive(&self, text: &str, directive: &Directive) -> String {
        if let Some(custom) = directive.pattern() {
            return custom
                .replace_all(text, |caps: &regex::Captures<'_>| {
                    directive.expand(&normalize(caps.get(1).map_or("", |m| m.as_str())))
                })
                .into_owned();
        }

        let pattern = self.pattern_for(directive.name());
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;

        for found in pattern.find_iter(text) {
            // Already consumed as part of a previous argument list.
            if found.start() < cursor {
                continue;
            }
            out.push_str(&text[cursor..found.start()]);

            if let Some(escaped) = found.as_str().strip_prefix("@@") {
                out.push('@');
                out.push_str(escaped);
                cursor = found.end();
                continue;
            }

            let rest = &text[found.end()..];
            let open = found.end() + (rest.len() - rest.trim_start_matches([' ', '\t']).len());
            match find_closing_paren(text, open) {
                Some(close) => {
                    out.push_str(&directive.expand(&normalize(&text[open + 1..close])));
                    cursor = close + 1;
                }
                None => {
                    out.push_str(&directive.expand(""));
                    cursor = found.end();
                }
            }
        }

        out.push_str(&text[cursor..]);
        out
    }

    fn pattern_for(&self, name: &str) -> Regex {
        let mut cache = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(name.to_string())
            .or_insert_with(|| default_pattern(name))
            .clone()
    }
}

fn default_pattern(name: &str) -> Regex {
    Regex::new(&format!(r"\B@@?{}\b", regex::escape(name)))
        .expect("escaped identifier forms a valid pattern")
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Clone for DirectiveRegistry {
    fn clone(&self) -> Self {
        Self {
            directives: self.directives.clone(),
            patterns: Mutex::new(HashMap::new()),
        }
    }
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveRegistry")
            .field("directives", &self.directives.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CompilerStage for DirectiveRegistry {
    fn name(&self) -> &str {
        "directives"
    }

    fn priority(&self) -> i32 {
        DIRECTIVES_PRIORITY
    }

    fn compile(&self, text: &str) -> String {
        DirectiveRegistry::compile(self, text)
    }
}
