//! Resolving, compiling and rendering views.
//!
//! A render passes through four stages:
//!
//! ```text
//! view name ──finder──▶ source file ──cache──▶ artifact ──renderer──▶ output
//!                                                 │
//!                                      (errors: diagnostics)
//! ```
//!
//! 1. [`TemplateFinder`] maps `layouts.app` or `mail::welcome` to a file.
//! 2. [`CompileCache`] compiles the file with the
//!    [`Pipeline`](sabre_compiler::Pipeline) when its artifact is stale.
//! 3. [`Renderer`] executes the artifact in MiniJinja. Compiled directives
//!    call back into the renderer through the `__env` runtime object for
//!    includes, layouts, sections and stacks, all recorded in the cycle's
//!    [`RenderState`].
//! 4. Execution errors become [`TemplateError`]s pointing at the source line.
//!
//! ## Layouts and Sections
//!
//! A child view defines sections and names its layout; the layout yields them:
//!
//! ```text
//! {{-- views/home.html --}}
//! @extends('layouts.app')
//! @section('title', 'Home')
//! @section('body')
//!     <p>Welcome back, {{ $user }}</p>
//! @endsection
//!
//! {{-- views/layouts/app.html --}}
//! <title>@yield('title', 'Untitled')</title>
//! <main>@yield('body')</main>
//! ```
//!
//! The child executes first, so its sections exist by the time the layout
//! yields them. Content the child produces outside sections is discarded in
//! favour of the layout's output.

mod cache;
mod diagnostics;
mod finder;
mod renderer;
pub mod runtime;
mod state;

pub use cache::{source_of, split_header, CompileCache};
pub use diagnostics::{normalize_message, template_line, ErrorSite, TemplateError};
pub use finder::{TemplateFinder, NAMESPACE_DELIMITER, TEMPLATE_EXTENSIONS};
pub use renderer::Renderer;
pub use state::{Extension, RenderCycle, RenderPhase, RenderState};
