//! Mapping execution errors back to source templates.
//!
//! MiniJinja reports errors against the compiled artifact. This module
//! rewrites its messages into short, host-neutral wording and estimates the
//! line in the source template the error came from.
//!
//! | MiniJinja kind | Message |
//! |----------------|---------|
//! | undefined value | `Undefined variable` |
//! | unknown function `foo` | `Call to undefined function foo()` |
//! | unknown method `bar` | `Call to undefined method bar()` |
//! | unknown filter `baz` | `Unknown filter baz` |
//! | syntax error | `Syntax error: <detail>` |
//! | missing argument | `Missing argument: <detail>` |

use std::fmt;
use std::path::{Path, PathBuf};

use minijinja::ErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;

static LOCATION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(in [^)]*\)\s*$").expect("valid location pattern"));

static NAMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"named `?(\w+)").expect("valid named pattern"));

static IS_UNKNOWN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`?(\w+)`? is unknown").expect("valid unknown pattern"));

/// An error raised while executing a compiled template.
#[derive(Debug)]
pub struct TemplateError {
    /// Normalized message.
    pub message: String,
    /// The source template.
    pub template: PathBuf,
    /// Estimated 1-based line in the source template.
    pub line: Option<usize>,
    /// The artifact that was executing.
    pub compiled: PathBuf,
    /// The original MiniJinja error.
    pub cause: minijinja::Error,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (view: {}", self.message, self.template.display())?;
        if let Some(line) = self.line {
            write!(f, ", line {line}")?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Where an executing artifact came from.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSite<'a> {
    pub template: &'a Path,
    pub compiled: &'a Path,
    /// Lines of header before the executable body.
    pub header_lines: usize,
    /// The executable body.
    pub body: &'a str,
    /// Line count of the source template.
    pub source_lines: usize,
}

impl ErrorSite<'_> {
    /// Wraps a MiniJinja error with a normalized message and source line.
    pub fn wrap(&self, err: minijinja::Error) -> TemplateError {
        let line = err.line().map(|body_line| {
            template_line(
                body_line + self.header_lines,
                self.header_lines,
                self.source_lines,
                self.body.lines().count(),
            )
        });
        TemplateError {
            message: normalize_message(err.kind(), err.detail()),
            template: self.template.to_path_buf(),
            line,
            compiled: self.compiled.to_path_buf(),
            cause: err,
        }
    }
}

/// Rewrites a MiniJinja error into host-neutral wording.
///
/// ```rust
/// use minijinja::ErrorKind;
/// use sabre::template::normalize_message;
///
/// assert_eq!(
///     normalize_message(ErrorKind::UnknownFunction, Some("csrf_token is unknown")),
///     "Call to undefined function csrf_token()"
/// );
/// assert_eq!(normalize_message(ErrorKind::UndefinedError, None), "Undefined variable");
/// ```
pub fn normalize_message(kind: ErrorKind, detail: Option<&str>) -> String {
    let detail = detail.map(|d| LOCATION_SUFFIX.replace(d, "").into_owned());
    let name = detail.as_deref().and_then(|d| {
        NAMED
            .captures(d)
            .or_else(|| IS_UNKNOWN.captures(d))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    });

    match kind {
        ErrorKind::UndefinedError => match detail {
            Some(d) if !d.is_empty() => format!("Undefined variable: {d}"),
            _ => "Undefined variable".to_string(),
        },
        ErrorKind::UnknownFunction => match name {
            Some(n) => format!("Call to undefined function {n}()"),
            None => "Call to undefined function".to_string(),
        },
        ErrorKind::UnknownMethod => match name {
            Some(n) => format!("Call to undefined method {n}()"),
            None => "Call to undefined method".to_string(),
        },
        ErrorKind::UnknownFilter => match name {
            Some(n) => format!("Unknown filter {n}"),
            None => "Unknown filter".to_string(),
        },
        ErrorKind::SyntaxError => format!("Syntax error: {}", detail.unwrap_or_default()),
        ErrorKind::MissingArgument => match detail {
            Some(d) if !d.is_empty() => format!("Missing argument: {d}"),
            _ => "Missing argument".to_string(),
        },
        other => detail
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Maps a line in a compiled artifact to a line in the source template.
///
/// The compiler preserves line breaks, so when the artifact body and source
/// have the same number of lines the mapping is exact. Otherwise the line is
/// scaled by the ratio of the two counts and clamped to the source.
///
/// ```rust
/// use sabre::template::template_line;
///
/// assert_eq!(template_line(5, 1, 10, 10), 4);
/// assert_eq!(template_line(11, 1, 10, 20), 5);
/// ```
pub fn template_line(
    compiled_line: usize,
    header_lines: usize,
    source_lines: usize,
    body_lines: usize,
) -> usize {
    let body_line = compiled_line.saturating_sub(header_lines).max(1);
    if source_lines == 0 || body_lines == 0 || source_lines == body_lines {
        return body_line.min(source_lines.max(1));
    }
    let scaled = (body_line * source_lines).div_ceil(body_lines);
    scaled.clamp(1, source_lines)
}
