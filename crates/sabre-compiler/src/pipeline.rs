//! Ordered compiler stages.
//!
//! A [`Pipeline`] threads template text through every [`CompilerStage`] in
//! descending priority order. The directive registry takes part in that
//! ordering like any other stage. Stages with equal priority run in the order
//! they were added, and the registry runs after any added stage that shares
//! its priority.
//!
//! ```rust
//! use sabre_compiler::Pipeline;
//!
//! let pipeline = Pipeline::new();
//! assert_eq!(pipeline.stage_names(), vec!["echo", "switch", "directives"]);
//! assert_eq!(
//!     pipeline.compile("@if($user) Hi {{ $user->name }} @endif"),
//!     "{#if#}{% if user %} Hi {{ (user.name) | e }} {% endif %}{#endif#}"
//! );
//! ```

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use crate::echo::EchoCompiler;
use crate::registry::DirectiveRegistry;
use crate::switch::SwitchLowering;

/// One text-to-text compilation pass.
pub trait CompilerStage: Send + Sync {
    fn name(&self) -> &str;

    /// Higher priorities run first.
    fn priority(&self) -> i32;

    fn compile(&self, text: &str) -> String;
}

/// The full compiler: custom stages plus the directive registry.
#[derive(Clone)]
pub struct Pipeline {
    directives: DirectiveRegistry,
    stages: Vec<Arc<dyn CompilerStage>>,
}

impl Pipeline {
    /// Echo normalization, switch lowering and the default directives.
    pub fn new() -> Self {
        let mut pipeline = Self::bare(DirectiveRegistry::with_defaults());
        pipeline.add(EchoCompiler);
        pipeline.add(SwitchLowering);
        pipeline
    }

    /// A pipeline holding only `directives`.
    pub fn bare(directives: DirectiveRegistry) -> Self {
        Self {
            directives,
            stages: Vec::new(),
        }
    }

    pub fn add(&mut self, stage: impl CompilerStage + 'static) {
        self.add_shared(Arc::new(stage));
    }

    pub fn add_shared(&mut self, stage: Arc<dyn CompilerStage>) {
        tracing::trace!(stage = stage.name(), priority = stage.priority(), "added compiler stage");
        self.stages.push(stage);
        self.stages.sort_by_key(|s| Reverse(s.priority()));
    }

    fn ordered(&self) -> Vec<&dyn CompilerStage> {
        let mut all: Vec<&dyn CompilerStage> = self.stages.iter().map(|s| s.as_ref()).collect();
        all.push(&self.directives);
        all.sort_by_key(|s| Reverse(s.priority()));
        all
    }

    /// Runs `text` through every stage.
    pub fn compile(&self, text: &str) -> String {
        self.ordered()
            .into_iter()
            .fold(text.to_string(), |acc, stage| stage.compile(&acc))
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.ordered().into_iter().map(|s| s.name()).collect()
    }

    pub fn directives(&self) -> &DirectiveRegistry {
        &self.directives
    }

    pub fn directives_mut(&mut self) -> &mut DirectiveRegistry {
        &mut self.directives
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("directives", &self.directives.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag(&'static str, i32);

    impl CompilerStage for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> i32 {
            self.1
        }

        fn compile(&self, text: &str) -> String {
            format!("{text}{}", self.0)
        }
    }

    #[test]
    fn runs_in_descending_priority() {
        let mut pipeline = Pipeline::bare(DirectiveRegistry::new());
        pipeline.add(Tag("low", 1));
        pipeline.add(Tag("high", 500));
        assert_eq!(pipeline.compile(">"), ">highlow");
        assert_eq!(pipeline.stage_names(), vec!["high", "directives", "low"]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut pipeline = Pipeline::bare(DirectiveRegistry::new());
        pipeline.add(Tag("b", 10));
        pipeline.add(Tag("a", 10));
        assert_eq!(pipeline.compile(""), "ba");
    }

    #[test]
    fn registry_runs_after_equal_priority_stage() {
        let mut pipeline = Pipeline::bare(DirectiveRegistry::new());
        pipeline.add(Tag("same", 100));
        assert_eq!(pipeline.stage_names(), vec!["same", "directives"]);
    }

    #[test]
    fn custom_directive_through_pipeline() {
        let mut pipeline = Pipeline::new();
        pipeline
            .directives_mut()
            .register("upper", |e: &str| format!("{{{{ ({e}) | upper }}}}"))
            .unwrap();
        assert_eq!(pipeline.compile("@upper($x)"), "{{ (x) | upper }}");
    }

    #[test]
    fn switch_break_removed_before_directives() {
        let out = Pipeline::new().compile("@switch($x) @case(1) a @break @endswitch");
        assert!(!out.contains("{% break %}"));
    }

    #[test]
    fn comments_removed_before_directives() {
        assert_eq!(Pipeline::new().compile("{{-- @if($x) --}}done"), "done");
    }
}
