//! The view renderer.
//!
//! [`Renderer`] ties the pieces together: it resolves a view name with the
//! [`TemplateFinder`], brings its artifact up to date with the
//! [`CompileCache`], executes it in MiniJinja with the `__env` runtime bound,
//! and renders any layout the view extends.
//!
//! # Data Layering
//!
//! Variables visible to a view come from three layers, later layers winning:
//!
//! 1. shared data ([`Renderer::share`])
//! 2. per-view data ([`Renderer::add_data`])
//! 3. data passed at the call site
//!
//! Includes additionally inherit the variables of the view that includes
//! them, and layouts inherit the variables of the view that extends them.
//!
//! # Example
//!
//! ```rust
//! use sabre::{Renderer, RendererConfig};
//! use serde_json::json;
//!
//! let views = tempfile::tempdir().unwrap();
//! std::fs::write(views.path().join("hello.html"), "Hello {{ $name }}!").unwrap();
//!
//! let config = RendererConfig::default()
//!     .with_path(views.path())
//!     .with_cache_dir(views.path().join("cache"));
//! let renderer = Renderer::new(config).unwrap();
//!
//! let out = renderer.render("hello", &json!({"name": "<World>"})).unwrap();
//! assert_eq!(out, "Hello &lt;World&gt;!");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use minijinja::value::Rest;
use minijinja::{Environment, Value};
use sabre_compiler::{CompilerStage, DirectiveHandler, Pipeline};
use serde::Serialize;

use super::cache::{split_header, CompileCache};
use super::diagnostics::ErrorSite;
use super::finder::TemplateFinder;
use super::runtime::{self, EnvHandle, RUNTIME_VAR};
use super::state::RenderCycle;
use crate::config::RendererConfig;
use crate::error::ViewError;
use crate::util::{merge_vars, to_vars, Vars};

/// Everything a render needs besides the MiniJinja environment.
///
/// Shared with the `__env` objects of executing artifacts.
#[derive(Debug, Clone)]
pub(crate) struct Core {
    pub(crate) finder: TemplateFinder,
    pub(crate) cache: CompileCache,
    pub(crate) pipeline: Pipeline,
    pub(crate) shared: Vars,
    pub(crate) template_data: HashMap<String, Vars>,
    pub(crate) max_depth: usize,
}

impl Core {
    /// Renders view `name` as one frame of `cycle`, including its layout.
    pub(crate) fn render_template(
        self: &Arc<Self>,
        env: &Environment<'_>,
        cycle: &RenderCycle,
        name: &str,
        data: Vars,
    ) -> Result<String, ViewError> {
        let source = self.finder.find(name)?;
        let artifact = self.cache.get_compiled(&source, &self.pipeline)?;

        let mut vars = self.shared.clone();
        if let Some(view_data) = self.template_data.get(name) {
            vars = merge_vars(vars, view_data.clone());
        }
        let vars = merge_vars(vars, data);

        cycle.state().enter(name, self.max_depth)?;
        let result = self.render_frame(env, cycle, name, &source, &artifact, vars);
        cycle.state().leave();
        result
    }

    fn render_frame(
        self: &Arc<Self>,
        env: &Environment<'_>,
        cycle: &RenderCycle,
        name: &str,
        source: &Path,
        artifact: &Path,
        vars: Vars,
    ) -> Result<String, ViewError> {
        let vars = Arc::new(vars);
        let output = self.execute(env, cycle, name, source, artifact, Arc::clone(&vars))?;

        let extension = cycle.state().take_extension();
        let Some(extension) = extension else {
            return Ok(output);
        };
        tracing::debug!(view = name, layout = %extension.name, "rendering layout");

        let layout_vars = merge_vars((*vars).clone(), extension.data);
        let layout = self.render_template(env, cycle, &extension.name, layout_vars)?;
        if layout.is_empty() {
            Ok(output)
        } else {
            Ok(layout)
        }
    }

    fn execute(
        self: &Arc<Self>,
        env: &Environment<'_>,
        cycle: &RenderCycle,
        name: &str,
        source: &Path,
        artifact: &Path,
        vars: Arc<Vars>,
    ) -> Result<String, ViewError> {
        let text = fs::read_to_string(artifact).map_err(|e| ViewError::io(artifact, e))?;
        let (header_lines, body) = split_header(&text);

        let handle = EnvHandle::new(Arc::clone(self), cycle.clone(), name, Arc::clone(&vars));
        let ctx = Value::from_iter(
            vars.iter()
                .map(|(key, value)| (key.clone(), Value::from_serialize(value)))
                .chain(std::iter::once((
                    RUNTIME_VAR.to_string(),
                    Value::from_object(handle),
                ))),
        );

        env.render_named_str(name, body, ctx).map_err(|err| {
            // a nested render already produced the real error
            if let Some(failure) = cycle.state().take_failure() {
                return failure;
            }
            let source_lines = fs::read_to_string(source)
                .map(|s| s.lines().count())
                .unwrap_or(0);
            let site = ErrorSite {
                template: source,
                compiled: artifact,
                header_lines,
                body,
                source_lines,
            };
            ViewError::from(site.wrap(err))
        })
    }
}

/// Renders directive templates from disk.
///
/// Registration methods take `&mut self`; rendering takes `&self` and keeps
/// its state in a per-call [`RenderCycle`], so one renderer can serve many
/// threads.
pub struct Renderer {
    core: Arc<Core>,
    env: Environment<'static>,
}

impl Renderer {
    /// Creates a renderer from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Config`] if the configuration is invalid.
    pub fn new(config: RendererConfig) -> Result<Self, ViewError> {
        config.validate()?;

        let mut finder = TemplateFinder::with_extensions(config.extensions);
        for path in config.paths {
            finder.add_path(path, None);
        }
        for (namespace, path) in config.namespaces {
            finder.add_path(path, Some(&namespace));
        }
        tracing::debug!(
            roots = finder.roots().len(),
            cache_dir = ?config.cache_dir,
            strict = config.strict_variables,
            "created view renderer"
        );

        let core = Core {
            finder,
            cache: CompileCache::new(config.cache_dir),
            pipeline: Pipeline::new(),
            shared: Vars::new(),
            template_data: HashMap::new(),
            max_depth: config.max_render_depth,
        };
        Ok(Self {
            core: Arc::new(core),
            env: runtime::environment(config.strict_variables),
        })
    }

    fn core_mut(&mut self) -> &mut Core {
        Arc::make_mut(&mut self.core)
    }

    /// Registers a search root, optionally under a namespace.
    pub fn add_path(&mut self, path: impl Into<PathBuf>, namespace: Option<&str>) {
        self.core_mut().finder.add_path(path, namespace);
    }

    /// Makes `value` available as `key` in every view.
    pub fn share(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), ViewError> {
        let value =
            serde_json::to_value(value).map_err(|e| ViewError::invalid_data(e.to_string()))?;
        self.core_mut().shared.insert(key.into(), value);
        Ok(())
    }

    /// Adds data for one view, merged over any data it already has.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::InvalidData`] if `data` isn't a map.
    pub fn add_data<T: Serialize + ?Sized>(
        &mut self,
        template: impl Into<String>,
        data: &T,
    ) -> Result<(), ViewError> {
        let data = to_vars(data)?;
        let entry = self.core_mut().template_data.entry(template.into()).or_default();
        entry.extend(data);
        Ok(())
    }

    /// Registers a global function callable from expressions.
    ///
    /// ```rust
    /// use minijinja::Value;
    /// use sabre::{Renderer, RendererConfig};
    ///
    /// let mut renderer = Renderer::new(RendererConfig::default()).unwrap();
    /// renderer.register_function("shout", |args: &[Value]| {
    ///     Ok(Value::from(args[0].to_string().to_uppercase()))
    /// });
    /// ```
    pub fn register_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, minijinja::Error> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::trace!(function = %name, "registered view function");
        self.env
            .add_function(name, move |args: Rest<Value>| f(&args.0));
    }

    /// Registers a custom directive.
    ///
    /// Artifacts compiled before the call keep their old expansion until
    /// their source changes.
    pub fn directive(
        &mut self,
        name: impl Into<String>,
        handler: impl DirectiveHandler + 'static,
    ) -> Result<(), ViewError> {
        self.core_mut()
            .pipeline
            .directives_mut()
            .register(name, handler)?;
        Ok(())
    }

    /// Adds a compiler stage.
    pub fn add_stage(&mut self, stage: impl CompilerStage + 'static) {
        self.core_mut().pipeline.add(stage);
    }

    /// Renders view `name` with `data` in a fresh render cycle.
    ///
    /// # Errors
    ///
    /// Any resolution, compile or execution error, or
    /// [`ViewError::UnterminatedSection`] / [`ViewError::UnterminatedPush`]
    /// if a block is still open when rendering ends.
    pub fn render<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<String, ViewError> {
        let cycle = RenderCycle::new();
        let output = self.render_partial(name, data, &cycle)?;
        cycle.finish()?;
        Ok(output)
    }

    /// Renders view `name` within an existing cycle.
    ///
    /// Sections and stacks defined by earlier renders of the cycle stay
    /// visible. The cycle is flushed if rendering fails.
    pub fn render_partial<T: Serialize + ?Sized>(
        &self,
        name: &str,
        data: &T,
        cycle: &RenderCycle,
    ) -> Result<String, ViewError> {
        tracing::debug!(view = name, "rendering view");
        let result = to_vars(data)
            .and_then(|vars| self.core.render_template(&self.env, cycle, name, vars));
        if result.is_err() {
            cycle.flush();
        }
        result
    }

    /// Whether `name` resolves to a template file.
    pub fn exists(&self, name: &str) -> bool {
        self.core.finder.exists(name)
    }

    /// The compiler pipeline.
    pub fn compiler(&self) -> &Pipeline {
        &self.core.pipeline
    }

    pub fn cache(&self) -> &CompileCache {
        &self.core.cache
    }

    pub fn finder(&self) -> &TemplateFinder {
        &self.core.finder
    }

    pub fn environment(&self) -> &Environment<'static> {
        &self.env
    }

    /// The MiniJinja environment, for registering filters and tests.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("finder", &self.core.finder)
            .field("cache", &self.core.cache)
            .field("pipeline", &self.core.pipeline)
            .field("shared", &self.core.shared.keys().collect::<Vec<_>>())
            .field("max_depth", &self.core.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn renderer(files: &[(&str, &str)]) -> (TempDir, Renderer) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join("views").join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let config = RendererConfig::default()
            .with_path(dir.path().join("views"))
            .with_cache_dir(dir.path().join("cache"));
        let renderer = Renderer::new(config).unwrap();
        (dir, renderer)
    }

    #[test]
    fn renders_with_call_site_data() {
        let (_dir, r) = renderer(&[("home.html", "Hi {{ $name }}")]);
        assert_eq!(r.render("home", &json!({"name": "Ann"})).unwrap(), "Hi Ann");
    }

    #[test]
    fn data_layers() {
        let (_dir, mut r) = renderer(&[("home.html", "{{ $a }}{{ $b }}{{ $c }}")]);
        r.share("a", "shared").unwrap();
        r.share("b", "shared").unwrap();
        r.share("c", "shared").unwrap();
        r.add_data("home", &json!({"b": "view", "c": "view"})).unwrap();
        assert_eq!(
            r.render("home", &json!({"c": "call"})).unwrap(),
            "sharedviewcall"
        );
    }

    #[test]
    fn invalid_data() {
        let (_dir, mut r) = renderer(&[("home.html", "x")]);
        assert!(matches!(
            r.render("home", &vec![1, 2]),
            Err(ViewError::InvalidData(_))
        ));
        assert!(r.add_data("home", &"text").is_err());
    }

    #[test]
    fn null_data_is_empty() {
        let (_dir, r) = renderer(&[("home.html", "x")]);
        assert_eq!(r.render("home", &()).unwrap(), "x");
    }

    #[test]
    fn missing_view() {
        let (_dir, r) = renderer(&[]);
        assert!(!r.exists("nope"));
        assert!(matches!(r.render("nope", &()), Err(ViewError::NotFound { .. })));
    }

    #[test]
    fn failed_partial_flushes_cycle() {
        let (_dir, r) = renderer(&[
            ("a.html", "@section('title')A @endsection"),
            ("b.html", "{{ $missing }}"),
        ]);
        let cycle = RenderCycle::new();
        r.render_partial("a", &(), &cycle).unwrap();
        assert!(cycle.state().has_section("title"));
        assert!(r.render_partial("b", &(), &cycle).is_err());
        assert!(!cycle.state().has_section("title"));
    }

    #[test]
    fn custom_directive_and_function() {
        let (_dir, mut r) = renderer(&[("greet.html", "@upper($name) {{ shout('hi') }}")]);
        r.directive("upper", |e: &str| format!("{{{{ ({e}) | upper }}}}"))
            .unwrap();
        r.register_function("shout", |args: &[Value]| {
            Ok(Value::from(args[0].to_string().to_uppercase()))
        });
        assert_eq!(r.render("greet", &json!({"name": "ann"})).unwrap(), "ANN HI");
    }

    #[test]
    fn invalid_directive_name() {
        let (_dir, mut r) = renderer(&[]);
        assert!(matches!(
            r.directive("not valid", |_: &str| String::new()),
            Err(ViewError::Compile(_))
        ));
    }

    #[test]
    fn clones_of_core_do_not_leak_registration() {
        let (_dir, mut r) = renderer(&[]);
        let before = Arc::clone(&r.core);
        r.share("k", 1).unwrap();
        assert!(before.shared.is_empty());
        assert_eq!(r.core.shared["k"], 1);
    }

    #[test]
    fn debug_lists_shared_keys() {
        let (_dir, mut r) = renderer(&[]);
        r.share("app_name", "Sabre").unwrap();
        assert!(format!("{r:?}").contains("app_name"));
    }
}
