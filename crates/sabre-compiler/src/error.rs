//! Compiler error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while registering directives or validating compiled text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// No directive is registered under this name.
    #[error("directive [@{0}] is not registered")]
    DirectiveNotFound(String),

    /// Directive names are plain identifiers.
    #[error("invalid directive name [{0}]: use letters, digits and underscores")]
    InvalidDirectiveName(String),

    /// An opening directive has no matching closer, or the reverse.
    #[error(
        "unbalanced @{directive}{} in {} near line {line}: expected a matching @{missing} ({opened} opened, {closed} closed)",
        section_label(.section),
        .template.display()
    )]
    Unbalanced {
        directive: String,
        missing: String,
        opened: usize,
        closed: usize,
        /// Name of the unclosed section, when the imbalance is a section.
        section: Option<String>,
        /// 1-based line in the source template.
        line: usize,
        template: PathBuf,
    },
}

fn section_label(section: &Option<String>) -> String {
    match section {
        Some(name) => format!(" [{name}]"),
        None => String::new(),
    }
}
