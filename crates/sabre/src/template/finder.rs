//! View name resolution.
//!
//! [`TemplateFinder`] maps view names to template files on disk.
//!
//! # Names
//!
//! A view name is a dotted path relative to a search root:
//!
//! | Name | Looks for |
//! |------|-----------|
//! | `home` | `<root>/home`, `<root>/home.sabre.html`, `<root>/home.html` |
//! | `layouts.app` | `<root>/layouts/app`, `<root>/layouts/app.sabre.html`, ... |
//! | `mail::welcome` | the same, under the root registered for `mail` |
//!
//! # Extension Priority
//!
//! The bare path is tried first, then each extension in order. Recognized
//! extensions by default, highest priority first:
//!
//! | Priority | Extension |
//! |----------|-----------|
//! | 1 | `.sabre.html` |
//! | 2 | `.html` |
//!
//! Default roots are searched in registration order and the first existing
//! regular file wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ViewError;

/// Recognized template file extensions in priority order.
pub const TEMPLATE_EXTENSIONS: &[&str] = &[".sabre.html", ".html"];

/// Separates a namespace from the view name.
pub const NAMESPACE_DELIMITER: &str = "::";

/// Resolves view names against default and namespaced search roots.
#[derive(Debug, Clone)]
pub struct TemplateFinder {
    roots: Vec<PathBuf>,
    namespaces: BTreeMap<String, PathBuf>,
    extensions: Vec<String>,
}

impl TemplateFinder {
    /// Creates a finder with no roots and the default extensions.
    pub fn new() -> Self {
        Self::with_extensions(TEMPLATE_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    /// Creates a finder that tries `extensions` in order.
    pub fn with_extensions(extensions: Vec<String>) -> Self {
        Self {
            roots: Vec::new(),
            namespaces: BTreeMap::new(),
            extensions,
        }
    }

    /// Registers a search root.
    ///
    /// With no namespace (or an empty one) the path is appended to the
    /// default roots; registering the same default root twice has no effect.
    /// A namespace maps to exactly one root, and registering it again
    /// replaces the previous one.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sabre::template::TemplateFinder;
    ///
    /// let mut finder = TemplateFinder::new();
    /// finder.add_path("views", None);
    /// finder.add_path("views", None);
    /// finder.add_path("vendor/mail", Some("mail"));
    /// assert_eq!(finder.roots().len(), 1);
    /// assert!(finder.namespace("mail").is_some());
    /// ```
    pub fn add_path(&mut self, path: impl Into<PathBuf>, namespace: Option<&str>) {
        let path = path.into();
        match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => {
                self.namespaces.insert(ns.to_string(), path);
            }
            None => {
                if !self.roots.contains(&path) {
                    self.roots.push(path);
                }
            }
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn namespace(&self, namespace: &str) -> Option<&Path> {
        self.namespaces.get(namespace).map(PathBuf::as_path)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Resolves `name` to the first existing template file.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.find(name).ok()
    }

    /// Resolves `name`, reporting where it looked on failure.
    ///
    /// # Errors
    ///
    /// - [`ViewError::NamespaceNotFound`] for an unregistered namespace.
    /// - [`ViewError::NotFound`] with every candidate path that was tried.
    pub fn find(&self, name: &str) -> Result<PathBuf, ViewError> {
        let candidates = self.candidates(name)?;
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| ViewError::NotFound {
                name: name.to_string(),
                searched: candidates,
            })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// The roots `name` would be searched in.
    pub fn search_roots(&self, name: &str) -> Result<Vec<&Path>, ViewError> {
        match name.split_once(NAMESPACE_DELIMITER) {
            Some((namespace, _)) => self
                .namespace(namespace)
                .map(|root| vec![root])
                .ok_or_else(|| ViewError::NamespaceNotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }),
            None => Ok(self.roots.iter().map(PathBuf::as_path).collect()),
        }
    }

    /// Every path tried for `name`, in lookup order.
    fn candidates(&self, name: &str) -> Result<Vec<PathBuf>, ViewError> {
        let roots = self.search_roots(name)?;
        let view = name
            .split_once(NAMESPACE_DELIMITER)
            .map_or(name, |(_, rest)| rest);
        let relative = view.replace('.', "/");

        let mut candidates = Vec::with_capacity(roots.len() * (self.extensions.len() + 1));
        for root in roots {
            candidates.push(root.join(&relative));
            for ext in &self.extensions {
                candidates.push(root.join(format!("{relative}{ext}")));
            }
        }
        Ok(candidates)
    }
}

impl Default for TemplateFinder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn views(files: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
        dir
    }

    #[test]
    fn dotted_names_map_to_directories() {
        let dir = views(&["layouts/app.sabre.html"]);
        let mut finder = TemplateFinder::new();
        finder.add_path(dir.path(), None);
        assert_eq!(
            finder.find("layouts.app").unwrap(),
            dir.path().join("layouts/app.sabre.html")
        );
    }

    #[test]
    fn extension_priority() {
        let dir = views(&["home.html", "home.sabre.html"]);
        let mut finder = TemplateFinder::new();
        finder.add_path(dir.path(), None);
        assert_eq!(finder.find("home").unwrap(), dir.path().join("home.sabre.html"));
    }

    #[test]
    fn bare_path_wins() {
        let dir = views(&["readme", "readme.html"]);
        let mut finder = TemplateFinder::new();
        finder.add_path(dir.path(), None);
        assert_eq!(finder.find("readme").unwrap(), dir.path().join("readme"));
    }

    #[test]
    fn directories_are_not_templates() {
        let dir = views(&["partials/nav.html"]);
        let mut finder = TemplateFinder::new();
        finder.add_path(dir.path(), None);
        assert!(!finder.exists("partials"));
    }

    #[test]
    fn first_root_wins() {
        let first = views(&["home.html"]);
        let second = views(&["home.html", "about.html"]);
        let mut finder = TemplateFinder::new();
        finder.add_path(first.path(), None);
        finder.add_path(second.path(), None);
        assert_eq!(finder.find("home").unwrap(), first.path().join("home.html"));
        assert_eq!(finder.find("about").unwrap(), second.path().join("about.html"));
    }

    #[test]
    fn namespaces() {
        let dir = views(&["welcome.html"]);
        let mut finder = TemplateFinder::new();
        finder.add_path("/nowhere", Some("mail"));
        finder.add_path(dir.path(), Some("mail"));
        assert_eq!(
            finder.find("mail::welcome").unwrap(),
            dir.path().join("welcome.html")
        );
        assert!(finder.resolve("welcome").is_none());
    }

    #[test]
    fn unknown_namespace() {
        let finder = TemplateFinder::new();
        let err = finder.find("admin::users.index").unwrap_err();
        assert!(matches!(
            err,
            ViewError::NamespaceNotFound { ref namespace, .. } if namespace == "admin"
        ));
    }

    #[test]
    fn not_found_reports_candidates() {
        let dir = views(&[]);
        let mut finder = TemplateFinder::new();
        finder.add_path(dir.path(), None);
        match finder.find("missing").unwrap_err() {
            ViewError::NotFound { name, searched } => {
                assert_eq!(name, "missing");
                assert_eq!(
                    searched,
                    vec![
                        dir.path().join("missing"),
                        dir.path().join("missing.sabre.html"),
                        dir.path().join("missing.html"),
                    ]
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn custom_extensions() {
        let dir = views(&["page.tpl"]);
        let mut finder = TemplateFinder::with_extensions(vec![".tpl".into()]);
        finder.add_path(dir.path(), None);
        assert!(finder.exists("page"));
    }
}
