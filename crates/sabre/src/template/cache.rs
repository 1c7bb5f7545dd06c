//! Compiled artifact cache.
//!
//! Each source template compiles to one artifact file in the cache directory,
//! named after a SHA-256 of the source's absolute path. The artifact is
//! MiniJinja text preceded by a one-line header naming the source:
//!
//! ```text
//! /* SOURCE: /app/views/home.sabre.html */
//! {#if#}{% if user %}Hi {{ (user.name) | e }}{% endif %}{#endif#}
//! ```
//!
//! An artifact is stale when it is missing or when the source was modified
//! after it. Stale artifacts are recompiled, validated and written through a
//! temporary file that is atomically renamed into place, so a concurrent
//! reader sees either the old or the new artifact.
//!
//! Without a cache directory nothing is compiled: the source file is its own
//! artifact and executes as MiniJinja text.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sabre_compiler::{validate, Pipeline};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::ViewError;

const SOURCE_PREFIX: &str = "/* SOURCE: ";
const SOURCE_SUFFIX: &str = " */";

/// Compiles sources into artifacts on demand.
#[derive(Debug, Clone, Default)]
pub struct CompileCache {
    dir: Option<PathBuf>,
    compilations: Arc<AtomicUsize>,
}

impl CompileCache {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            compilations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// How many artifacts this cache (and its clones) have written.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Where the artifact for `source` lives.
    pub fn artifact_path(&self, source: &Path) -> PathBuf {
        match &self.dir {
            None => source.to_path_buf(),
            Some(dir) => {
                let digest = Sha256::digest(absolute(source).to_string_lossy().as_bytes());
                dir.join(format!("tpl_{digest:x}.jinja"))
            }
        }
    }

    /// Whether `source` needs compiling.
    ///
    /// Always `false` without a cache directory.
    pub fn is_expired(&self, source: &Path) -> Result<bool, ViewError> {
        if self.dir.is_none() {
            return Ok(false);
        }
        let artifact = self.artifact_path(source);
        let compiled_at = match fs::metadata(&artifact) {
            Ok(meta) => meta.modified().map_err(|e| ViewError::io(&artifact, e))?,
            Err(_) => return Ok(true),
        };
        let modified_at = fs::metadata(source)
            .and_then(|meta| meta.modified())
            .map_err(|e| ViewError::io(source, e))?;
        Ok(modified_at > compiled_at)
    }

    /// Returns the path of an up-to-date artifact for `source`, compiling it
    /// first if needed.
    pub fn get_compiled(&self, source: &Path, pipeline: &Pipeline) -> Result<PathBuf, ViewError> {
        if self.is_expired(source)? {
            self.compile(source, pipeline)
        } else {
            tracing::trace!(source = %source.display(), "compiled view is fresh");
            Ok(self.artifact_path(source))
        }
    }

    /// Compiles `source` unconditionally and writes the artifact.
    ///
    /// # Errors
    ///
    /// - [`ViewError::Io`] if the source can't be read or the artifact can't
    ///   be written.
    /// - [`ViewError::Compile`] if the compiled text has unbalanced blocks.
    pub fn compile(&self, source: &Path, pipeline: &Pipeline) -> Result<PathBuf, ViewError> {
        let Some(dir) = &self.dir else {
            return Ok(source.to_path_buf());
        };

        let text = fs::read_to_string(source).map_err(|e| ViewError::io(source, e))?;
        let header = format!("{SOURCE_PREFIX}{}{SOURCE_SUFFIX}\n", absolute(source).display());
        let artifact = format!("{header}{}", pipeline.compile(&text));
        validate(&artifact, 1, source)?;

        fs::create_dir_all(dir).map_err(|e| ViewError::io(dir, e))?;
        let path = self.artifact_path(source);
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| ViewError::io(dir, e))?;
        temp.write_all(artifact.as_bytes())
            .map_err(|e| ViewError::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ViewError::io(temp.path(), e))?;
        temp.persist(&path).map_err(|e| ViewError::io(&path, e.error))?;

        self.compilations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            source = %source.display(),
            artifact = %path.display(),
            "compiled view"
        );
        Ok(path)
    }
}

/// The source path recorded in an artifact's header, if any.
///
/// ```rust
/// use sabre::template::source_of;
/// use std::path::PathBuf;
///
/// let artifact = "/* SOURCE: /views/home.html */\nHello";
/// assert_eq!(source_of(artifact), Some(PathBuf::from("/views/home.html")));
/// assert_eq!(source_of("Hello"), None);
/// ```
pub fn source_of(artifact: &str) -> Option<PathBuf> {
    let first = artifact.lines().next()?;
    first
        .strip_prefix(SOURCE_PREFIX)?
        .strip_suffix(SOURCE_SUFFIX)
        .map(PathBuf::from)
}

/// Splits an artifact into its header line count and executable body.
pub fn split_header(artifact: &str) -> (usize, &str) {
    if source_of(artifact).is_none() {
        return (0, artifact);
    }
    match artifact.split_once('\n') {
        Some((_, body)) => (1, body),
        None => (1, ""),
    }
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
