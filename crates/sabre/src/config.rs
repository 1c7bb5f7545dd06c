//! Renderer configuration.
//!
//! [`RendererConfig`] holds everything a [`Renderer`](crate::Renderer) needs
//! before the first render: where views live, where compiled artifacts go
//! and how strict execution is. Every field has a default, so a YAML file
//! only needs the keys it changes:
//!
//! ```yaml
//! paths:
//!   - ./views
//! namespaces:
//!   mail: ./vendor/mail/views
//! cache_dir: ./storage/views
//! strict_variables: true
//! max_render_depth: 32
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ViewError;
use crate::template::TEMPLATE_EXTENSIONS;

/// Default limit on nested includes and layouts.
pub const DEFAULT_MAX_RENDER_DEPTH: usize = 64;

/// Settings for building a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Default search roots, in lookup order.
    pub paths: Vec<PathBuf>,

    /// Namespaced roots, used by `namespace::view` names.
    pub namespaces: BTreeMap<String, PathBuf>,

    /// Directory for compiled artifacts. Without one, sources execute as
    /// they are, uncompiled.
    pub cache_dir: Option<PathBuf>,

    /// File extensions tried after the bare name, in priority order.
    pub extensions: Vec<String>,

    /// Fail on undefined variables instead of rendering them empty.
    pub strict_variables: bool,

    /// Maximum nesting of includes and layouts.
    pub max_render_depth: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            namespaces: BTreeMap::new(),
            cache_dir: None,
            extensions: TEMPLATE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            strict_variables: true,
            max_render_depth: DEFAULT_MAX_RENDER_DEPTH,
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Config`] if the YAML is malformed or the settings
    /// are invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sabre::RendererConfig;
    ///
    /// let config = RendererConfig::from_yaml("paths: [views]\nmax_render_depth: 8\n").unwrap();
    /// assert_eq!(config.max_render_depth, 8);
    /// assert!(config.strict_variables);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, ViewError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ViewError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML configuration file.
    ///
    /// Relative `paths`, `namespaces` and `cache_dir` entries are resolved
    /// against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ViewError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ViewError::io(path, e))?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Adds a default search root.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Adds a namespaced search root.
    pub fn with_namespace(mut self, namespace: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.namespaces.insert(namespace.into(), path.into());
        self
    }

    /// Sets the artifact directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Checks the settings for values that cannot work.
    pub fn validate(&self) -> Result<(), ViewError> {
        if self.max_render_depth == 0 {
            return Err(ViewError::Config(
                "max_render_depth must be at least 1".to_string(),
            ));
        }
        if let Some(ext) = self.extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(ViewError::Config(format!(
                "extension [{ext}] must start with a dot"
            )));
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.paths.iter_mut().for_each(join);
        self.namespaces.values_mut().for_each(join);
        if let Some(dir) = self.cache_dir.as_mut() {
            join(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.extensions, vec![".sabre.html", ".html"]);
        assert!(config.strict_variables);
        assert_eq!(config.max_render_depth, 64);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn yaml_overrides_only_given_keys() {
        let config = RendererConfig::from_yaml(
            r#"
paths:
  - views
namespaces:
  mail: vendor/mail
strict_variables: false
"#,
        )
        .unwrap();
        assert_eq!(config.paths, vec![PathBuf::from("views")]);
        assert_eq!(config.namespaces["mail"], PathBuf::from("vendor/mail"));
        assert!(!config.strict_variables);
        assert_eq!(config.max_render_depth, DEFAULT_MAX_RENDER_DEPTH);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = RendererConfig::from_yaml("max_render_depth: 0").unwrap_err();
        assert!(matches!(err, ViewError::Config(_)));
    }

    #[test]
    fn extension_needs_dot() {
        let err = RendererConfig::from_yaml("extensions: [html]").unwrap_err();
        assert!(err.to_string().contains("[html]"));
    }

    #[test]
    fn malformed_yaml() {
        let err = RendererConfig::from_yaml("paths: {").unwrap_err();
        assert!(matches!(err, ViewError::Config(_)));
    }

    #[test]
    fn from_file_rebases_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sabre.yaml");
        std::fs::write(&file, "paths: [views]\ncache_dir: /tmp/abs\n").unwrap();

        let config = RendererConfig::from_file(&file).unwrap();
        assert_eq!(config.paths, vec![dir.path().join("views")]);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/abs")));
    }

    #[test]
    fn from_missing_file() {
        let err = RendererConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ViewError::Io { .. }));
    }

    #[test]
    fn builders() {
        let config = RendererConfig::default()
            .with_path("a")
            .with_namespace("ns", "b")
            .with_cache_dir("c");
        assert_eq!(config.paths, vec![PathBuf::from("a")]);
        assert_eq!(config.namespaces["ns"], PathBuf::from("b"));
        assert_eq!(config.cache_dir, Some(PathBuf::from("c")));
    }
}
