//! Per-render mutable state.
//!
//! A render cycle starts with a top-level [`Renderer::render`] call and
//! covers every include and layout rendered on its behalf. [`RenderState`]
//! holds what those templates share: the frame stack, pending layout
//! extensions, section content and stacks.
//!
//! # Phases
//!
//! ```text
//! Idle ──enter──▶ Rendering { depth: 1 } ──enter──▶ Rendering { depth: 2 } ...
//!   ▲                     │
//!   └──────leave──────────┘
//! ```
//!
//! Each frame may record one pending layout (`@extends`). After the frame's
//! template executes, the renderer takes the extension and renders the
//! layout, which then reads the sections the child defined.
//!
//! # Sections and `@parent`
//!
//! Children render before their layouts, so the first content stored for a
//! section wins. When a layout later defines the same section, its content
//! replaces the [`PARENT_PLACEHOLDER`] left by `@parent` in the child's
//! content.
//!
//! [`Renderer::render`]: crate::Renderer::render

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sabre_compiler::PARENT_PLACEHOLDER;

use crate::error::ViewError;
use crate::util::Vars;

/// Where a render cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Rendering { depth: usize },
}

/// A layout requested by `@extends`, with extra data for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub name: String,
    pub data: Vars,
}

#[derive(Debug)]
struct Frame {
    template: String,
    extension: Option<Extension>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackKind {
    Push,
    Prepend,
}

/// Mutable state shared by every template in one render cycle.
#[derive(Debug, Default)]
pub struct RenderState {
    frames: Vec<Frame>,
    sections: HashMap<String, String>,
    section_stack: Vec<String>,
    capture: Option<String>,
    last_section: Option<String>,
    pushes: HashMap<String, Vec<String>>,
    prepends: HashMap<String, Vec<String>>,
    stack_stack: Vec<(StackKind, String)>,
    failure: Option<ViewError>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RenderPhase {
        match self.frames.len() {
            0 => RenderPhase::Idle,
            depth => RenderPhase::Rendering { depth },
        }
    }

    /// Opens a frame for `template`.
    ///
    /// # Errors
    ///
    /// [`ViewError::RecursionLimit`] if `max_depth` frames are already open.
    pub fn enter(&mut self, template: &str, max_depth: usize) -> Result<(), ViewError> {
        if self.frames.len() >= max_depth {
            return Err(ViewError::RecursionLimit {
                template: template.to_string(),
                limit: max_depth,
            });
        }
        self.frames.push(Frame {
            template: template.to_string(),
            extension: None,
        });
        Ok(())
    }

    pub fn leave(&mut self) {
        self.frames.pop();
    }

    /// Name of the template in the innermost frame.
    pub fn current_template(&self) -> Option<&str> {
        self.frames.last().map(|f| f.template.as_str())
    }

    /// Records a layout for the current frame. A later call replaces it.
    pub fn extend(&mut self, name: impl Into<String>, data: Vars) {
        if let Some(frame) = self.frames.last_mut() {
            frame.extension = Some(Extension {
                name: name.into(),
                data,
            });
        }
    }

    pub fn take_extension(&mut self) -> Option<Extension> {
        self.frames.last_mut().and_then(|f| f.extension.take())
    }

    /// Starts capturing a section block.
    pub fn start_section(&mut self, name: impl Into<String>) {
        self.section_stack.push(name.into());
    }

    /// Defines a section with inline content.
    pub fn set_section(&mut self, name: &str, content: &str) {
        self.extend_section(name, content.to_string());
        self.last_section = Some(name.to_string());
    }

    /// Buffers the output of the block being closed next.
    pub fn capture(&mut self, body: String) {
        self.capture = Some(body);
    }

    /// Closes the current section and stores its content.
    ///
    /// With `overwrite` the content replaces any existing content. Otherwise
    /// existing content wins, with its `@parent` placeholder filled in.
    /// Returns the section name.
    pub fn stop_section(&mut self, overwrite: bool) -> Result<String, ViewError> {
        let name = self.pop_section("endsection")?;
        let content = self.capture.take().unwrap_or_default();
        if overwrite {
            self.sections.insert(name.clone(), content);
        } else {
            self.extend_section(&name, content);
        }
        self.last_section = Some(name.clone());
        Ok(name)
    }

    /// Closes the current section and returns its content for output.
    pub fn show_section(&mut self) -> Result<String, ViewError> {
        if self.section_stack.is_empty() {
            return Err(ViewError::UnopenedBlock {
                directive: "show".to_string(),
            });
        }
        let name = self.stop_section(false)?;
        Ok(self.yield_content(&name, ""))
    }

    /// Closes the current section, appending to any existing content.
    pub fn append_section(&mut self) -> Result<String, ViewError> {
        let name = self.pop_section("append")?;
        let content = self.capture.take().unwrap_or_default();
        self.sections
            .entry(name.clone())
            .and_modify(|existing| existing.push_str(&content))
            .or_insert(content);
        self.last_section = Some(name.clone());
        Ok(name)
    }

    fn pop_section(&mut self, directive: &str) -> Result<String, ViewError> {
        self.section_stack.pop().ok_or_else(|| ViewError::UnopenedBlock {
            directive: directive.to_string(),
        })
    }

    fn extend_section(&mut self, name: &str, content: String) {
        let content = match self.sections.get(name) {
            Some(existing) => existing.replace(PARENT_PLACEHOLDER, &content),
            None => content,
        };
        self.sections.insert(name.to_string(), content);
    }

    /// Content of a section, or `default` when it was never defined.
    ///
    /// Unfilled `@parent` placeholders are removed.
    pub fn yield_content(&self, name: &str, default: &str) -> String {
        self.sections
            .get(name)
            .map_or(default, String::as_str)
            .replace(PARENT_PLACEHOLDER, "")
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// The most recently closed or set section.
    pub fn last_section(&self) -> Option<&str> {
        self.last_section.as_deref()
    }

    pub fn start_push(&mut self, name: impl Into<String>) {
        self.stack_stack.push((StackKind::Push, name.into()));
    }

    pub fn start_prepend(&mut self, name: impl Into<String>) {
        self.stack_stack.push((StackKind::Prepend, name.into()));
    }

    /// Closes the current `@push` block.
    pub fn stop_push(&mut self) -> Result<(), ViewError> {
        self.stop_stack(StackKind::Push, "endpush")
    }

    /// Closes the current `@prepend` block.
    pub fn stop_prepend(&mut self) -> Result<(), ViewError> {
        self.stop_stack(StackKind::Prepend, "endprepend")
    }

    fn stop_stack(&mut self, kind: StackKind, directive: &str) -> Result<(), ViewError> {
        let (_, name) = self
            .stack_stack
            .pop()
            .ok_or_else(|| ViewError::UnopenedBlock {
                directive: directive.to_string(),
            })?;
        let content = self.capture.take().unwrap_or_default();
        let target = match kind {
            StackKind::Push => &mut self.pushes,
            StackKind::Prepend => &mut self.prepends,
        };
        target.entry(name).or_default().push(content);
        Ok(())
    }

    /// Everything pushed onto stack `name`: prepends (newest first) then
    /// pushes (oldest first).
    pub fn yield_push(&self, name: &str) -> String {
        let prepended = self.prepends.get(name).into_iter().flat_map(|v| v.iter().rev());
        let pushed = self.pushes.get(name).into_iter().flatten();
        prepended.chain(pushed).map(String::as_str).collect()
    }

    /// Keeps an error raised by a nested render until the enclosing
    /// execution can return it.
    pub fn stash_failure(&mut self, err: ViewError) {
        self.failure = Some(err);
    }

    pub fn take_failure(&mut self) -> Option<ViewError> {
        self.failure.take()
    }

    /// Ends the cycle, failing if a section or stack is still open.
    ///
    /// The state is flushed either way.
    pub fn finish(&mut self) -> Result<(), ViewError> {
        let result = if let Some(name) = self.section_stack.last() {
            Err(ViewError::UnterminatedSection { name: name.clone() })
        } else if let Some((_, name)) = self.stack_stack.last() {
            Err(ViewError::UnterminatedPush { name: name.clone() })
        } else {
            Ok(())
        };
        self.flush();
        result
    }

    /// Forgets all sections, stacks, frames and pending captures.
    pub fn flush(&mut self) {
        *self = Self::default();
    }
}

/// A shared handle to one cycle's [`RenderState`].
///
/// Cloning the handle shares the state. A cycle belongs to a single render
/// at a time.
#[derive(Debug, Clone, Default)]
pub struct RenderCycle {
    state: Arc<Mutex<RenderState>>,
}

impl RenderCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state.
    ///
    /// Don't hold the guard across a nested render.
    pub fn state(&self) -> MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> RenderPhase {
        self.state().phase()
    }

    pub fn flush(&self) {
        self.state().flush();
    }

    pub fn finish(&self) -> Result<(), ViewError> {
        self.state().finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendering() -> RenderState {
        let mut state = RenderState::new();
        state.enter("page", 8).unwrap();
        state
    }

    fn close_section(state: &mut RenderState, name: &str, body: &str) {
        state.start_section(name);
        state.capture(body.to_string());
        state.stop_section(false).unwrap();
    }

    #[test]
    fn phases_follow_frames() {
        let mut state = RenderState::new();
        assert_eq!(state.phase(), RenderPhase::Idle);
        state.enter("a", 4).unwrap();
        state.enter("b", 4).unwrap();
        assert_eq!(state.phase(), RenderPhase::Rendering { depth: 2 });
        assert_eq!(state.current_template(), Some("b"));
        state.leave();
        state.leave();
        assert_eq!(state.phase(), RenderPhase::Idle);
    }

    #[test]
    fn depth_limit() {
        let mut state = RenderState::new();
        state.enter("a", 1).unwrap();
        let err = state.enter("a", 1).unwrap_err();
        assert!(matches!(err, ViewError::RecursionLimit { limit: 1, .. }));
    }

    #[test]
    fn extension_belongs_to_its_frame() {
        let mut state = rendering();
        state.extend("layouts.app", Vars::new());
        state.enter("partial", 8).unwrap();
        assert_eq!(state.take_extension(), None);
        state.leave();
        assert_eq!(state.take_extension().map(|e| e.name), Some("layouts.app".into()));
        assert_eq!(state.take_extension(), None);
    }

    #[test]
    fn first_section_content_wins() {
        let mut state = rendering();
        close_section(&mut state, "title", "Child");
        close_section(&mut state, "title", "Layout");
        assert_eq!(state.yield_content("title", ""), "Child");
    }

    #[test]
    fn parent_placeholder_is_filled() {
        let mut state = rendering();
        close_section(&mut state, "nav", &format!("{PARENT_PLACEHOLDER} + child"));
        close_section(&mut state, "nav", "base");
        assert_eq!(state.yield_content("nav", ""), "base + child");
    }

    #[test]
    fn unfilled_placeholder_is_removed() {
        let mut state = rendering();
        close_section(&mut state, "nav", &format!("{PARENT_PLACEHOLDER}child"));
        assert_eq!(state.yield_content("nav", ""), "child");
    }

    #[test]
    fn overwrite_replaces() {
        let mut state = rendering();
        close_section(&mut state, "a", "old");
        state.start_section("a");
        state.capture("new".into());
        state.stop_section(true).unwrap();
        assert_eq!(state.yield_content("a", ""), "new");
    }

    #[test]
    fn append_concatenates() {
        let mut state = rendering();
        close_section(&mut state, "a", "one");
        state.start_section("a");
        state.capture(" two".into());
        assert_eq!(state.append_section().unwrap(), "a");
        assert_eq!(state.yield_content("a", ""), "one two");
    }

    #[test]
    fn show_returns_content() {
        let mut state = rendering();
        close_section(&mut state, "sidebar", "child");
        state.start_section("sidebar");
        state.capture(format!("base {PARENT_PLACEHOLDER}"));
        // child content already stored, so the layout's @show yields it
        assert_eq!(state.show_section().unwrap(), "child");
    }

    #[test]
    fn yield_default_and_has_section() {
        let mut state = rendering();
        assert_eq!(state.yield_content("missing", "fallback"), "fallback");
        assert!(!state.has_section("missing"));
        state.set_section("title", "Home");
        assert!(state.has_section("title"));
        assert_eq!(state.last_section(), Some("title"));
    }

    #[test]
    fn stop_without_start() {
        let mut state = rendering();
        let err = state.stop_section(false).unwrap_err();
        assert!(matches!(err, ViewError::UnopenedBlock { .. }));
        assert!(state.show_section().is_err());
        assert!(state.stop_push().is_err());
    }

    #[test]
    fn stacks_order() {
        let mut state = rendering();
        for (kind, body) in [("push", "a"), ("push", "b"), ("prepend", "y"), ("prepend", "z")] {
            if kind == "push" {
                state.start_push("js");
                state.capture(body.into());
                state.stop_push().unwrap();
            } else {
                state.start_prepend("js");
                state.capture(body.into());
                state.stop_prepend().unwrap();
            }
        }
        assert_eq!(state.yield_push("js"), "zyab");
        assert_eq!(state.yield_push("css"), "");
    }

    #[test]
    fn finish_reports_open_blocks() {
        let mut state = RenderState::new();
        state.start_section("body");
        assert!(matches!(
            state.finish(),
            Err(ViewError::UnterminatedSection { ref name }) if name == "body"
        ));
        // flushed
        assert!(state.finish().is_ok());

        state.start_push("js");
        assert!(matches!(state.finish(), Err(ViewError::UnterminatedPush { .. })));
    }

    #[test]
    fn failure_is_taken_once() {
        let mut state = RenderState::new();
        state.stash_failure(ViewError::invalid_data("x"));
        assert!(state.take_failure().is_some());
        assert!(state.take_failure().is_none());
    }

    #[test]
    fn cycle_clones_share_state() {
        let cycle = RenderCycle::new();
        let other = cycle.clone();
        cycle.state().set_section("a", "1");
        assert!(other.state().has_section("a"));
        other.flush();
        assert!(!cycle.state().has_section("a"));
        assert_eq!(cycle.phase(), RenderPhase::Idle);
    }
}
