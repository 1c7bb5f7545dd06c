//! The execution environment for compiled artifacts.
//!
//! Compiled templates call into the renderer through the `__env` object
//! bound in every execution context:
//!
//! | Call | Effect |
//! |------|--------|
//! | `__env.include(name, data?)` | renders another view with the caller's variables |
//! | `__env.include_if(name, data?)` | same, but renders nothing if the view is missing |
//! | `__env.include_when(cond, name, data?)` | includes when `cond` is truthy |
//! | `__env.include_unless(cond, name, data?)` | includes when `cond` is falsy |
//! | `__env.extend(name, data?)` | renders the view inside layout `name` |
//! | `__env.start_section(name)` / `set_section(name, content)` | defines a section |
//! | `__env.stop_section()` / `overwrite_section()` / `append_section()` / `show_section()` | closes one |
//! | `__env.yield_content(name, default?)` | outputs a section |
//! | `__env.has_section(name)` | tests for a section |
//! | `__env.start_push(name)` / `start_prepend(name)` / `stop_push()` / `stop_prepend()` | fills a stack |
//! | `__env.yield_push(name)` | outputs a stack |
//!
//! Section and stack bodies reach the render state through the `__capture`
//! filter, applied with `{% filter __capture %}...{% endfilter %}`.

use std::fmt;
use std::sync::Arc;

use minijinja::value::{Object, ValueKind};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, State, UndefinedBehavior, Value};

use super::renderer::Core;
use super::state::RenderCycle;
use crate::error::ViewError;
use crate::util::{html_escape, merge_vars, to_vars, Vars};

/// Name of the runtime object in execution contexts.
pub const RUNTIME_VAR: &str = "__env";

/// Builds the MiniJinja environment compiled artifacts execute in.
///
/// Output is never auto-escaped (escaping is explicit in compiled echoes),
/// `none` prints as the empty string and trailing newlines are kept.
pub fn environment(strict_variables: bool) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(if strict_variables {
        UndefinedBehavior::Strict
    } else {
        UndefinedBehavior::Lenient
    });
    env.set_formatter(|out, state, value| {
        if value.is_none() || value.is_undefined() {
            return Ok(());
        }
        minijinja::escape_formatter(out, state, value)
    });
    register_filters(&mut env);
    env
}

/// Registers the filters and functions compiled directives rely on.
pub fn register_filters(env: &mut Environment<'static>) {
    env.add_filter("e", escape);
    env.add_filter("escape", escape);
    env.add_filter("pairs", pairs);
    env.add_filter("__capture", capture);
    env.add_function("class_list", class_list);
    env.add_function("errors_first", errors_first);
}

/// HTML-escapes a value; `none` becomes the empty string.
///
/// Undefined values are an error under strict undefined behavior.
fn escape(state: &State, value: Value) -> Result<String, Error> {
    if value.is_undefined() && matches!(state.undefined_behavior(), UndefinedBehavior::Strict) {
        return Err(Error::from(ErrorKind::UndefinedError));
    }
    if value.is_none() || value.is_undefined() {
        return Ok(String::new());
    }
    Ok(match value.as_str() {
        Some(s) => html_escape(s),
        None => html_escape(&value.to_string()),
    })
}

/// `[key, value]` pairs of a map, or `[index, item]` pairs of a sequence.
fn pairs(value: Value) -> Result<Value, Error> {
    let keyed = value.kind() == ValueKind::Map;
    let iter = value.try_iter()?;
    let items: Vec<Value> = iter
        .enumerate()
        .map(|(index, item)| {
            if keyed {
                let v = value.get_item(&item).unwrap_or_default();
                Value::from(vec![item, v])
            } else {
                Value::from(vec![Value::from(index), item])
            }
        })
        .collect();
    Ok(Value::from(items))
}

/// Hands a block body to the render state and outputs nothing.
fn capture(state: &State, body: String) -> Result<String, Error> {
    let runtime = state.lookup(RUNTIME_VAR).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            "sections and stacks need the view runtime",
        )
    })?;
    let handle = runtime.downcast_object_ref::<EnvHandle>().ok_or_else(|| {
        Error::new(ErrorKind::InvalidOperation, "__env is not the view runtime")
    })?;
    handle.cycle.state().capture(body);
    Ok(String::new())
}

/// Space-separated class names from a list or a `{class: condition}` map.
fn class_list(value: Value) -> Result<String, Error> {
    let mut classes = Vec::new();
    if value.kind() == ValueKind::Map {
        for key in value.try_iter()? {
            if value.get_item(&key).is_ok_and(|v| v.is_true()) {
                classes.push(key.to_string());
            }
        }
    } else if let Some(s) = value.as_str() {
        classes.push(s.to_string());
    } else {
        for item in value.try_iter()? {
            if item.is_true() {
                classes.push(item.to_string());
            }
        }
    }
    Ok(classes.join(" "))
}

/// First message recorded for `field` in an error bag.
///
/// A bag maps field names to a message or a list of messages.
fn errors_first(bag: Value, field: String) -> Value {
    if bag.is_none() || bag.is_undefined() {
        return Value::from(());
    }
    let first = match bag.get_attr(&field) {
        Ok(messages) if messages.kind() == ValueKind::Seq => {
            messages.get_item(&Value::from(0)).unwrap_or_default()
        }
        Ok(message) => message,
        Err(_) => Value::UNDEFINED,
    };
    // undefined would fail `is none` tests in strict mode
    if first.is_true() {
        first
    } else {
        Value::from(())
    }
}

/// The `__env` object: one per executing artifact.
///
/// Carries the artifact's variables so includes inherit them.
pub(crate) struct EnvHandle {
    core: Arc<Core>,
    cycle: RenderCycle,
    template: String,
    vars: Arc<Vars>,
}

impl EnvHandle {
    pub(crate) fn new(core: Arc<Core>, cycle: RenderCycle, template: &str, vars: Arc<Vars>) -> Self {
        Self {
            core,
            cycle,
            template: template.to_string(),
            vars,
        }
    }

    fn include(&self, state: &State, name: &str, data: Option<&Value>) -> Result<Value, Error> {
        let extra = match data {
            Some(value) => self.data_arg(value)?,
            None => Vars::new(),
        };
        let vars = merge_vars((*self.vars).clone(), extra);
        match self.core.render_template(state.env(), &self.cycle, name, vars) {
            Ok(output) => Ok(Value::from(output)),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn data_arg(&self, value: &Value) -> Result<Vars, Error> {
        if value.is_none() || value.is_undefined() {
            return Ok(Vars::new());
        }
        to_vars(value).map_err(|err| self.fail(err))
    }

    /// Stashes `err` for the enclosing render and reports it to MiniJinja.
    fn fail(&self, err: ViewError) -> Error {
        let message = err.to_string();
        self.cycle.state().stash_failure(err);
        Error::new(ErrorKind::InvalidOperation, message)
    }

    fn state_result<T>(&self, result: Result<T, ViewError>) -> Result<T, Error> {
        result.map_err(|err| self.fail(err))
    }
}

impl fmt::Debug for EnvHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvHandle")
            .field("template", &self.template)
            .field("vars", &self.vars.len())
            .finish_non_exhaustive()
    }
}

fn string_arg(args: &[Value], index: usize, method: &str) -> Result<String, Error> {
    match args.get(index) {
        Some(value) if !value.is_undefined() && !value.is_none() => Ok(value.to_string()),
        _ => Err(Error::new(
            ErrorKind::MissingArgument,
            format!("{method} expects a name as argument {}", index + 1),
        )),
    }
}

fn text_arg(args: &[Value], index: usize) -> String {
    match args.get(index) {
        Some(value) if value.is_none() || value.is_undefined() => String::new(),
        Some(value) => value.as_str().map_or_else(|| value.to_string(), str::to_string),
        None => String::new(),
    }
}

fn empty() -> Value {
    Value::from("")
}

impl Object for EnvHandle {
    fn call_method(
        self: &Arc<Self>,
        state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "include" => {
                let name = string_arg(args, 0, method)?;
                self.include(state, &name, args.get(1))
            }
            "include_if" => {
                let name = string_arg(args, 0, method)?;
                if !self.core.finder.exists(&name) {
                    return Ok(empty());
                }
                self.include(state, &name, args.get(1))
            }
            "include_when" | "include_unless" => {
                let condition = args.first().is_some_and(Value::is_true);
                let name = string_arg(args, 1, method)?;
                if condition != (method == "include_when") {
                    return Ok(empty());
                }
                self.include(state, &name, args.get(2))
            }
            "extend" => {
                let name = string_arg(args, 0, method)?;
                let data = match args.get(1) {
                    Some(value) => self.data_arg(value)?,
                    None => Vars::new(),
                };
                self.cycle.state().extend(name, data);
                Ok(empty())
            }
            "start_section" => {
                let name = string_arg(args, 0, method)?;
                self.cycle.state().start_section(name);
                Ok(empty())
            }
            "set_section" => {
                let name = string_arg(args, 0, method)?;
                let content = html_escape(&text_arg(args, 1));
                self.cycle.state().set_section(&name, &content);
                Ok(empty())
            }
            "stop_section" | "overwrite_section" => {
                let result = self.cycle.state().stop_section(method == "overwrite_section");
                self.state_result(result).map(|_| empty())
            }
            "append_section" => {
                let result = self.cycle.state().append_section();
                self.state_result(result).map(|_| empty())
            }
            "show_section" => {
                let result = self.cycle.state().show_section();
                self.state_result(result).map(Value::from)
            }
            "yield_content" => {
                let name = string_arg(args, 0, method)?;
                let default = html_escape(&text_arg(args, 1));
                Ok(Value::from(self.cycle.state().yield_content(&name, &default)))
            }
            "has_section" => {
                let name = string_arg(args, 0, method)?;
                Ok(Value::from(self.cycle.state().has_section(&name)))
            }
            "start_push" | "start_prepend" => {
                let name = string_arg(args, 0, method)?;
                let mut guard = self.cycle.state();
                if method == "start_push" {
                    guard.start_push(name);
                } else {
                    guard.start_prepend(name);
                }
                Ok(empty())
            }
            "stop_push" => {
                let result = self.cycle.state().stop_push();
                self.state_result(result).map(|_| empty())
            }
            "stop_prepend" => {
                let result = self.cycle.state().stop_prepend();
                self.state_result(result).map(|_| empty())
            }
            "yield_push" => {
                let name = string_arg(args, 0, method)?;
                Ok(Value::from(self.cycle.state().yield_push(&name)))
            }
            _ => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("view runtime has no method named {method}"),
            )),
        }
    }
}
