//! Error types for view rendering.
//!
//! [`ViewError`] is returned by every fallible operation of the crate. Errors
//! raised while an artifact executes are wrapped in a
//! [`TemplateError`](crate::template::TemplateError) that points back at the
//! source template.

use std::io;
use std::path::{Path, PathBuf};

use sabre_compiler::CompileError;

use crate::template::TemplateError;

/// Errors that can occur while resolving, compiling or rendering a view.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// No file matched the view name in any search root.
    #[error("view [{name}] not found (searched: {})", display_paths(.searched))]
    NotFound { name: String, searched: Vec<PathBuf> },

    /// The view name uses a namespace that was never registered.
    #[error("no path registered for namespace [{namespace}] (view [{name}])")]
    NamespaceNotFound { namespace: String, name: String },

    /// The compiled template failed balance validation.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The compiled template failed while executing.
    #[error(transparent)]
    Template(Box<TemplateError>),

    /// Rendering finished with a section still capturing.
    #[error("cannot finish rendering: section [{name}] was started but never stopped")]
    UnterminatedSection { name: String },

    /// Rendering finished with a stack still capturing.
    #[error("cannot finish rendering: stack [{name}] was started but never stopped")]
    UnterminatedPush { name: String },

    /// A section or stack was closed without being opened.
    #[error("cannot {directive} without first starting a block")]
    UnopenedBlock { directive: String },

    /// Includes or layouts nested deeper than the configured limit.
    #[error("render depth limit of {limit} exceeded while rendering [{template}]")]
    RecursionLimit { template: String, limit: usize },

    /// View data did not serialize to a map.
    #[error("view data must serialize to a map: {0}")]
    InvalidData(String),

    /// Reading a template or writing an artifact failed.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The renderer configuration is invalid or could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ViewError {
    /// Create an I/O error for `path`.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an invalid-data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}

impl From<TemplateError> for ViewError {
    fn from(err: TemplateError) -> Self {
        Self::Template(Box::new(err))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "no search paths".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
