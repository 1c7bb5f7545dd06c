//! Echo and comment normalization.
//!
//! Rewrites the output forms of a template into MiniJinja output tags:
//!
//! | Source | Compiled |
//! |--------|----------|
//! | `{{-- note --}}` | removed |
//! | `{{ expr }}` | `{{ (expr) \| e }}` |
//! | `{!! expr !!}` | `{{ expr }}` |
//! | `@{{ expr }}` | `{{ expr }}` as literal text |
//!
//! Expressions may span lines. Their newlines are kept in the compiled tag.
//!
//! Comments spanning several lines are replaced by an empty MiniJinja comment
//! holding the same number of newlines, so line numbers in the compiled
//! artifact keep matching the source.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::expression::normalize;
use crate::pipeline::CompilerStage;

/// Stage priority of echo normalization. Runs first.
pub const ECHO_PRIORITY: i32 = 300;

static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{--(.*?)--\}\}").expect("valid comment pattern"));

static ESCAPED_ECHO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(@)?\{\{\s*(.+?)\s*\}\}").expect("valid echo pattern"));

static RAW_ECHO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{!!\s*(.+?)\s*!!\}").expect("valid raw echo pattern"));

/// The echo/comment stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCompiler;

impl EchoCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerStage for EchoCompiler {
    fn name(&self) -> &str {
        "echo"
    }

    fn priority(&self) -> i32 {
        ECHO_PRIORITY
    }

    fn compile(&self, text: &str) -> String {
        let text = compile_comments(text);
        // Escaped echoes go before raw ones: raw output is itself `{{ .. }}`.
        let text = compile_escaped_echoes(&text);
        compile_raw_echoes(&text)
    }
}

/// Removes `{{-- --}}` comments, keeping their newlines.
pub fn compile_comments(text: &str) -> String {
    COMMENT
        .replace_all(text, |caps: &Captures<'_>| {
            let newlines = caps[1].matches('\n').count();
            if newlines == 0 {
                String::new()
            } else {
                format!("{{#{}#}}", "\n".repeat(newlines))
            }
        })
        .into_owned()
}

/// Compiles `{{ expr }}` into an escaped echo and `@{{ expr }}` into literal
/// text.
pub fn compile_escaped_echoes(text: &str) -> String {
    ESCAPED_ECHO
        .replace_all(text, |caps: &Captures<'_>| {
            let expr = &caps[2];
            if caps.get(1).is_some() {
                format!("{{% raw %}}{{{{ {expr} }}}}{{% endraw %}}")
            } else {
                format!("{{{{ ({}) | e }}}}", normalize(expr))
            }
        })
        .into_owned()
}

/// Compiles `{!! expr !!}` into an unescaped echo.
pub fn compile_raw_echoes(text: &str) -> String {
    RAW_ECHO
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{{{{ {} }}}}", normalize(&caps[1]))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str) -> String {
        EchoCompiler.compile(text)
    }

    #[test]
    fn escaped_echo() {
        assert_eq!(compile("Hi {{ $name }}!"), "Hi {{ (name) | e }}!");
    }

    #[test]
    fn escaped_echo_without_spaces() {
        assert_eq!(compile("{{name}}"), "{{ (name) | e }}");
    }

    #[test]
    fn raw_echo() {
        assert_eq!(compile("{!! $html !!}"), "{{ html }}");
    }

    #[test]
    fn literal_echo() {
        assert_eq!(
            compile("@{{ name }}"),
            "{% raw %}{{ name }}{% endraw %}"
        );
    }

    #[test]
    fn single_line_comment_vanishes() {
        assert_eq!(compile("a{{-- hidden {{ x }} --}}b"), "ab");
    }

    #[test]
    fn multi_line_comment_keeps_lines() {
        assert_eq!(compile("a{{-- one\ntwo\nthree --}}b"), "a{#\n\n#}b");
    }

    #[test]
    fn several_echoes_on_a_line() {
        assert_eq!(
            compile("{{ a }} and {!! b !!} and {{ c }}"),
            "{{ (a) | e }} and {{ b }} and {{ (c) | e }}"
        );
    }

    #[test]
    fn multi_line_echo_stays_escaped() {
        assert_eq!(compile("{{ x\n | upper }}"), "{{ (x\n | upper) | e }}");
    }

    #[test]
    fn multi_line_raw_echo() {
        assert_eq!(compile("{!! a\n ~ b !!}"), "{{ a\n ~ b }}");
    }
}
