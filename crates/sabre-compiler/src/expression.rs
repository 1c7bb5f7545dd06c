//! Scanning helpers for directive arguments and echo expressions.
//!
//! Expressions are never parsed. The compiler only needs three things from
//! them: where a parenthesised argument list ends, how to split it on
//! top-level commas, and how to rewrite the PHP-flavoured sugar that template
//! authors are used to into the MiniJinja expression language.
//!
//! # Expression sugar
//!
//! | Written | Compiled |
//! |---------|----------|
//! | `$name` | `name` |
//! | `user->email` | `user.email` |
//! | `a && b` | `a and b` |
//! | `a \|\| b` | `a or b` |
//! | `!ready` | `not ready` |
//! | `null` | `none` |
//! | `$loop->index` | `loop.index0` |
//! | `$loop->iteration` | `loop.index` |
//! | `$loop->count` | `loop.length` |
//! | `$loop->remaining` | `loop.revindex0` |
//!
//! `$loop->index` counts from zero and `$loop->iteration` from one. Other
//! `$loop` properties (`first`, `last`, `depth`) already share MiniJinja's
//! names. The bare `loop.index` form is MiniJinja's own and stays one-based.
//!
//! Text inside single or double quoted string literals is copied untouched.

/// Returns the byte offset of the `)` matching the `(` at `open`.
///
/// Nested parentheses of any depth are balanced, and parentheses inside
/// string literals are ignored. Returns `None` if `open` is not a `(` or the
/// group is never closed.
///
/// ```rust
/// use sabre_compiler::expression::find_closing_paren;
///
/// let text = "@if(count(items) > (2))";
/// assert_eq!(find_closing_paren(text, 3), Some(text.len() - 1));
/// assert_eq!(find_closing_paren("(')')", 0), Some(4));
/// assert_eq!(find_closing_paren("(open", 0), None);
/// ```
pub fn find_closing_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (offset, &byte) in bytes.iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == q {
                quote = None;
            }
            continue;
        }

        match byte {
            b'\'' | b'"' => quote = Some(byte),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }

    None
}

/// Splits an argument list on top-level commas.
///
/// Commas nested in `()`, `[]`, `{}` or string literals do not split.
/// Each part is trimmed. An empty or whitespace-only list yields no parts.
///
/// ```rust
/// use sabre_compiler::expression::split_args;
///
/// assert_eq!(split_args("'title', 'Home, sweet home'"), vec!["'title'", "'Home, sweet home'"]);
/// assert_eq!(split_args("'row', {'a': 1, 'b': 2}"), vec!["'row'", "{'a': 1, 'b': 2}"]);
/// assert!(split_args("  ").is_empty());
/// ```
pub fn split_args(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    let mut start = 0;

    for (offset, &byte) in expr.as_bytes().iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == q {
                quote = None;
            }
            continue;
        }

        match byte {
            b'\'' | b'"' => quote = Some(byte),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(expr[start..offset].trim());
                start = offset + 1;
            }
            _ => {}
        }
    }

    let last = expr[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// Strips one pair of matching quotes from a string literal.
///
/// Returns the input unchanged if it is not a quoted literal.
pub fn unquote(literal: &str) -> &str {
    let trimmed = literal.trim();
    for quote in ['\'', '"'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Rewrites expression sugar into MiniJinja syntax.
///
/// See the module documentation for the accepted forms.
///
/// ```rust
/// use sabre_compiler::expression::normalize;
///
/// assert_eq!(normalize("$user->name"), "user.name");
/// assert_eq!(normalize("!$done && $count != 0"), "not done and count != 0");
/// assert_eq!(normalize("$x ?? null"), "x ?? none");
/// assert_eq!(normalize("'$literal && text'"), "'$literal && text'");
/// ```
pub fn normalize(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.char_indices().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    // `$` just seen, `$loop` just written, `$loop->` just written.
    let mut sigil = false;
    let mut loop_var = false;
    let mut loop_member = false;

    while let Some((offset, ch)) = chars.next() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        let next = chars.peek().map(|&(_, n)| n);
        let after_sigil = std::mem::take(&mut sigil);
        let after_loop = std::mem::take(&mut loop_var);
        let after_arrow = std::mem::take(&mut loop_member);
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                out.push(ch);
            }
            '$' if next.is_some_and(is_ident_start) => sigil = true,
            '-' if next == Some('>') => {
                chars.next();
                out.push('.');
                loop_member = after_loop;
            }
            '&' if next == Some('&') => {
                chars.next();
                out.push_str(" and ");
            }
            '|' if next == Some('|') => {
                chars.next();
                out.push_str(" or ");
            }
            '!' if next != Some('=') => out.push_str("not "),
            c if is_ident_start(c) => {
                let mut end = offset + c.len_utf8();
                while let Some(&(pos, n)) = chars.peek() {
                    if !is_ident_continue(n) {
                        break;
                    }
                    end = pos + n.len_utf8();
                    chars.next();
                }
                let word = &expr[offset..end];
                if after_arrow {
                    out.push_str(loop_property(word));
                } else if word == "null" && !out.ends_with('.') {
                    out.push_str("none");
                } else {
                    out.push_str(word);
                }
                loop_var = after_sigil && word == "loop";
            }
            _ => out.push(ch),
        }
    }

    out
}

/// Maps a `$loop->` property onto the MiniJinja loop attribute.
fn loop_property(name: &str) -> &str {
    match name {
        "index" => "index0",
        "iteration" => "index",
        "count" => "length",
        "remaining" => "revindex0",
        other => other,
    }
}

/// Whether `name` is a valid directive name (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_paren_spans_lines() {
        let text = "(\n  a,\n  (b)\n)";
        assert_eq!(find_closing_paren(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn closing_paren_ignores_escaped_quotes() {
        let text = r#"("a \") b")"#;
        assert_eq!(find_closing_paren(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn closing_paren_requires_open_paren() {
        assert_eq!(find_closing_paren("x(y)", 0), None);
    }

    #[test]
    fn split_args_respects_nesting() {
        assert_eq!(
            split_args("cond, 'view', {'items': [1, 2]}"),
            vec!["cond", "'view'", "{'items': [1, 2]}"]
        );
    }

    #[test]
    fn split_args_single() {
        assert_eq!(split_args("'content'"), vec!["'content'"]);
    }

    #[test]
    fn unquote_literals() {
        assert_eq!(unquote("'body'"), "body");
        assert_eq!(unquote("\"body\""), "body");
        assert_eq!(unquote("name"), "name");
        assert_eq!(unquote("'"), "'");
    }

    #[test]
    fn normalize_keeps_plain_minijinja() {
        assert_eq!(normalize("items | length > 2"), "items | length > 2");
        assert_eq!(normalize("user.name"), "user.name");
    }

    #[test]
    fn normalize_sigils_and_arrows() {
        assert_eq!(normalize("$loop->first"), "loop.first");
        assert_eq!(normalize("$a || $b"), "a  or  b");
    }

    #[test]
    fn normalize_loop_properties() {
        assert_eq!(normalize("$loop->index"), "loop.index0");
        assert_eq!(normalize("$loop->iteration"), "loop.index");
        assert_eq!(normalize("$loop->count - $loop->remaining"), "loop.length - loop.revindex0");
        assert_eq!(normalize("$loop->last"), "loop.last");
    }

    #[test]
    fn normalize_native_loop_untouched() {
        assert_eq!(normalize("loop.index"), "loop.index");
        assert_eq!(normalize("loop->index"), "loop.index");
        assert_eq!(normalize("$row->index"), "row.index");
        assert_eq!(normalize("'$loop->index'"), "'$loop->index'");
    }

    #[test]
    fn normalize_null_attribute_untouched() {
        assert_eq!(normalize("value.null"), "value.null");
        assert_eq!(normalize("nullable"), "nullable");
    }

    #[test]
    fn normalize_bang_equal() {
        assert_eq!(normalize("$a != $b"), "a != b");
        assert_eq!(normalize("!($a)"), "not (a)");
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("includeIf"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier(""));
    }
}
