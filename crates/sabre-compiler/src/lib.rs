//! # Sabre Compiler - directive templates to MiniJinja
//!
//! Compiles templates written with `@directive(...)` syntax and
//! `{{ }}`/`{!! !!}` echoes into MiniJinja template text. The crate is a pure
//! text transformer: it knows nothing about files, caches or rendering. The
//! `sabre` crate pairs it with a resolver, a compile cache and a renderer.
//!
//! ## Quick Start
//!
//! ```rust
//! use sabre_compiler::Pipeline;
//!
//! let pipeline = Pipeline::new();
//! let compiled = pipeline.compile("@foreach($items as $item)<li>{{ $item }}</li>@endforeach");
//! assert_eq!(
//!     compiled,
//!     "{#foreach#}{% for item in items %}<li>{{ (item) | e }}</li>{% endfor %}{#endforeach#}"
//! );
//! ```
//!
//! ## Stages
//!
//! | Stage | Priority | Does |
//! |-------|----------|------|
//! | [`EchoCompiler`] | 300 | comments and echoes |
//! | [`SwitchLowering`] | 200 | drops `@break` inside `@switch` |
//! | [`DirectiveRegistry`] | 100 | `@name(...)` expansion |
//!
//! Custom stages implement [`CompilerStage`] and are added with
//! [`Pipeline::add`]. Custom directives are registered on
//! [`Pipeline::directives_mut`].
//!
//! ## Validation
//!
//! [`validate()`] checks compiled text for unclosed sections, stacks and
//! paired directives and reports the source line of the problem.

pub mod defaults;
pub mod directive;
pub mod echo;
mod error;
pub mod expression;
pub mod pipeline;
pub mod registry;
pub mod switch;
pub mod validate;

pub use defaults::{PARENT_PLACEHOLDER, WHILE_ITERATION_LIMIT};
pub use directive::{Directive, DirectiveHandler};
pub use echo::EchoCompiler;
pub use error::CompileError;
pub use pipeline::{CompilerStage, Pipeline};
pub use registry::DirectiveRegistry;
pub use switch::SwitchLowering;
pub use validate::validate;
