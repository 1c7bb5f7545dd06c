//! # Sabre - directive templates for HTML views
//!
//! `sabre` renders view templates written with `@directive(...)` syntax:
//! layouts with sections, includes, stacks, escaped `{{ }}` and raw `{!! !!}`
//! echoes. Templates are compiled to MiniJinja text by
//! [`sabre_compiler`], cached on disk and executed with MiniJinja.
//!
//! ## Quick Start
//!
//! ```rust
//! use sabre::{Renderer, RendererConfig};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Inbox {
//!     user: String,
//!     messages: Vec<String>,
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(
//!     dir.path().join("inbox.html"),
//!     "@foreach($messages as $m)[{{ $m }}]@endforeach for {{ $user }}",
//! )
//! .unwrap();
//!
//! let renderer = Renderer::new(
//!     RendererConfig::default()
//!         .with_path(dir.path())
//!         .with_cache_dir(dir.path().join(".cache")),
//! )
//! .unwrap();
//!
//! let out = renderer
//!     .render(
//!         "inbox",
//!         &Inbox {
//!             user: "ann".into(),
//!             messages: vec!["hi".into(), "<b>".into()],
//!         },
//!     )
//!     .unwrap();
//! assert_eq!(out, "[hi][&lt;b&gt;] for ann");
//! ```
//!
//! ## Core Concepts
//!
//! - [`Renderer`]: resolves, compiles and renders views
//! - [`RendererConfig`]: search roots, cache directory and strictness, loadable
//!   from YAML
//! - [`Pipeline`]: the compiler, extensible with custom directives and stages
//! - [`ViewError`]: every failure, with compile and execution errors pointing
//!   at the source template
//!
//! ## Directives
//!
//! | Group | Directives |
//! |-------|------------|
//! | control flow | `@if @elseif @else @endif @unless @isset @empty @switch` |
//! | loops | `@foreach @forelse @for @while @break @continue` |
//! | layouts | `@extends @section @yield @parent @show @hasSection` |
//! | composition | `@include @includeIf @includeWhen @includeUnless` |
//! | stacks | `@push @prepend @stack` |
//! | forms | `@csrf @method @error @checked @selected @class` |
//!
//! Expressions use MiniJinja syntax with a little sugar: `$name` variables,
//! `a->b` attribute access, `&&`, `||`, `!` and `null`.
//!
//! ## Caching
//!
//! With a `cache_dir`, each view compiles once to an artifact and recompiles
//! only when the source is modified. Without one, sources are executed as
//! plain MiniJinja and directives are not expanded.

mod config;
mod error;
pub mod template;
mod util;

pub use config::{RendererConfig, DEFAULT_MAX_RENDER_DEPTH};
pub use error::ViewError;
pub use template::{RenderCycle, Renderer, TemplateError};
pub use util::{html_escape, merge_vars, to_vars, Vars};

pub use sabre_compiler::{
    CompileError, CompilerStage, Directive, DirectiveHandler, DirectiveRegistry, Pipeline,
};
