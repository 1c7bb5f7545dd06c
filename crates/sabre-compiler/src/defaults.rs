//! The default directive set.
//!
//! Every handler is a pure text generator that emits MiniJinja syntax.
//! Composition directives (sections, layouts, includes and stacks) emit calls
//! on the `__env` runtime object that the renderer binds while an artifact
//! executes.
//!
//! Paired directives wrap their output in comment markers such as `{#if#}`
//! and `{#endif#}`. The markers render as nothing and let
//! [`validate`](crate::validate) tell apart the many directives that all
//! close with `{% endif %}`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::expression::split_args;
use crate::registry::DirectiveRegistry;

/// Text left in a section body by `@parent`, replaced when the section is
/// extended.
pub const PARENT_PLACEHOLDER: &str = "##sabre-parent-placeholder##";

/// Upper bound on `@while` iterations.
///
/// A loop whose condition still holds after this many passes stops without
/// an error, and its output is truncated there.
pub const WHILE_ITERATION_LIMIT: usize = 10_000;

/// Opener/closer pairs that carry comment markers.
pub const PAIRED_DIRECTIVES: &[(&str, &str)] = &[
    ("auth", "endauth"),
    ("empty", "endempty"),
    ("error", "enderror"),
    ("errors", "enderrors"),
    ("for", "endfor"),
    ("foreach", "endforeach"),
    ("forelse", "endforelse"),
    ("guest", "endguest"),
    ("if", "endif"),
    ("isset", "endisset"),
    ("php", "endphp"),
    ("switch", "endswitch"),
    ("unless", "endunless"),
    ("while", "endwhile"),
];

/// The comment marker emitted for a paired directive.
pub fn marker(name: &str) -> String {
    format!("{{#{name}#}}")
}

fn opening(name: &str, code: &str) -> String {
    format!("{}{code}", marker(name))
}

fn closing(name: &str, code: &str) -> String {
    format!("{code}{}", marker(name))
}

type Handler = fn(&str) -> String;

/// Registers every default directive into `registry`.
pub fn register_defaults(registry: &mut DirectiveRegistry) {
    let handlers: &[(&str, Handler)] = &[
        // conditionals
        ("if", |e| opening("if", &format!("{{% if {e} %}}"))),
        ("elseif", |e| format!("{{% elif {e} %}}")),
        ("else", |_| "{% else %}".to_string()),
        ("endif", |_| closing("endif", "{% endif %}")),
        ("unless", |e| opening("unless", &format!("{{% if not ({e}) %}}"))),
        ("endunless", |_| closing("endunless", "{% endif %}")),
        ("isset", compile_isset),
        ("endisset", |_| closing("endisset", "{% endif %}")),
        ("empty", compile_empty),
        ("endempty", |_| closing("endempty", "{% endif %}")),
        // loops
        ("foreach", |e| opening("foreach", &compile_for_each(e))),
        ("endforeach", |_| closing("endforeach", "{% endfor %}")),
        ("forelse", |e| opening("forelse", &compile_for_each(e))),
        ("endforelse", |_| closing("endforelse", "{% endfor %}")),
        ("for", |e| opening("for", &compile_for(e))),
        ("endfor", |_| closing("endfor", "{% endfor %}")),
        ("while", compile_while),
        ("endwhile", |_| closing("endwhile", "{% endfor %}")),
        ("break", |e| loop_control("break", e)),
        ("continue", |e| loop_control("continue", e)),
        // switch
        ("switch", |e| {
            opening("switch", &format!("{{% with __switch = ({e}) %}}{{% if false %}}"))
        }),
        ("case", |e| format!("{{% elif __switch == ({e}) %}}")),
        ("default", |_| "{% else %}".to_string()),
        ("endswitch", |_| closing("endswitch", "{% endif %}{% endwith %}")),
        // host passthrough
        ("php", compile_php),
        ("endphp", |_| closing("endphp", " %}")),
        // output
        ("echo", |e| format!("{{{{ ({e}) | e }}}}")),
        ("raw", |e| format!("{{{{ {e} }}}}")),
        ("json", compile_json),
        // composition
        ("include", |e| format!("{{{{ __env.include({e}) }}}}")),
        ("includeIf", |e| format!("{{{{ __env.include_if({e}) }}}}")),
        ("includeWhen", |e| format!("{{{{ __env.include_when({e}) }}}}")),
        ("includeUnless", |e| format!("{{{{ __env.include_unless({e}) }}}}")),
        ("extends", |e| format!("{{{{ __env.extend({e}) }}}}")),
        ("section", compile_section),
        ("endsection", |_| end_capture("stop_section")),
        ("stop", |_| end_capture("stop_section")),
        ("show", |_| end_capture("show_section")),
        ("append", |_| end_capture("append_section")),
        ("overwrite", |_| end_capture("overwrite_section")),
        ("yield", |e| format!("{{{{ __env.yield_content({e}) }}}}")),
        ("parent", |_| PARENT_PLACEHOLDER.to_string()),
        ("hasSection", |e| {
            opening("if", &format!("{{% if __env.has_section({e}) %}}"))
        }),
        ("sectionMissing", |e| {
            opening("if", &format!("{{% if not __env.has_section({e}) %}}"))
        }),
        ("push", |e| start_capture("start_push", e)),
        ("endpush", |_| end_capture("stop_push")),
        ("prepend", |e| start_capture("start_prepend", e)),
        ("endprepend", |_| end_capture("stop_prepend")),
        ("stack", |e| format!("{{{{ __env.yield_push({e}) }}}}")),
        // auth
        ("auth", |e| opening("auth", &format!("{{% if auth_check({e}) %}}"))),
        ("endauth", |_| closing("endauth", "{% endif %}")),
        ("guest", |e| opening("guest", &format!("{{% if not auth_check({e}) %}}"))),
        ("endguest", |_| closing("endguest", "{% endif %}")),
        // validation
        ("error", compile_error),
        ("enderror", |_| closing("enderror", "{% endif %}{% endwith %}")),
        ("errors", |_| {
            opening("errors", "{% if errors is defined and errors %}")
        }),
        ("enderrors", |_| closing("enderrors", "{% endif %}")),
        ("old", |e| format!("{{{{ old({e}) | e }}}}")),
        ("checked", |e| attribute_when("checked", e)),
        ("selected", |e| attribute_when("selected", e)),
        ("disabled", |e| attribute_when("disabled", e)),
        ("readonly", |e| attribute_when("readonly", e)),
        ("class", |e| format!("class=\"{{{{ class_list({e}) | e }}}}\"")),
        // helpers
        ("csrf", |_| {
            "<input type=\"hidden\" name=\"_token\" value=\"{{ csrf_token() | e }}\">".to_string()
        }),
        ("method", |e| {
            format!("<input type=\"hidden\" name=\"_method\" value=\"{{{{ ({e}) | upper | e }}}}\">")
        }),
        ("asset", |e| format!("{{{{ asset({e}) | e }}}}")),
        ("url", |e| format!("{{{{ url({e}) | e }}}}")),
        ("route", |e| format!("{{{{ route({e}) | e }}}}")),
    ];

    for &(name, handler) in handlers {
        let registered = registry.register(name, handler);
        debug_assert!(registered.is_ok(), "default directive name {name}");
    }
}

fn compile_isset(expr: &str) -> String {
    let checks = split_args(expr)
        .iter()
        .map(|arg| format!("({arg}) is defined and ({arg}) is not none"))
        .collect::<Vec<_>>()
        .join(" and ");
    opening("isset", &format!("{{% if {checks} %}}"))
}

/// `@empty` with no arguments is the `@forelse` fallback branch.
fn compile_empty(expr: &str) -> String {
    if expr.trim().is_empty() {
        return "{% else %}".to_string();
    }
    opening("empty", &format!("{{% if not ({expr}) %}}"))
}

static FOREACH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.+?)\s+as\s+(.+)$").expect("valid foreach pattern"));

static C_STYLE_FOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*(\w+)\s*=\s*(.+?)\s*;\s*(\w+)\s*(<=|<)\s*(.+?)\s*;\s*(\w+)\s*\+\+\s*$")
        .expect("valid for pattern")
});

/// `items as item` and `items as key => value`. Anything else is taken to be
/// MiniJinja loop syntax already.
fn compile_for_each(expr: &str) -> String {
    let expr = expr.trim();
    let Some(caps) = FOREACH.captures(expr) else {
        return format!("{{% for {expr} %}}");
    };
    let iterable = caps[1].trim();
    let target = caps[2].trim();
    match target.split_once("=>") {
        Some((key, value)) => format!(
            "{{% for {}, {} in ({iterable}) | pairs %}}",
            key.trim(),
            value.trim()
        ),
        None => format!("{{% for {target} in {iterable} %}}"),
    }
}

/// `i = 0; i < n; i++` becomes a range loop.
fn compile_for(expr: &str) -> String {
    let Some(caps) = C_STYLE_FOR.captures(expr) else {
        return format!("{{% for {} %}}", expr.trim());
    };
    let var = &caps[1];
    if caps[3] != *var || caps[6] != *var {
        return format!("{{% for {} %}}", expr.trim());
    }
    let start = &caps[2];
    let end = match &caps[4] {
        "<=" => format!("({}) + 1", &caps[5]),
        _ => caps[5].to_string(),
    };
    format!("{{% for {var} in range({start}, {end}) %}}")
}

/// MiniJinja has no unbounded loop, so `@while` is a bounded `for` that
/// breaks once the condition fails. Past [`WHILE_ITERATION_LIMIT`] passes the
/// loop ends silently and the rendered output is cut off.
fn compile_while(expr: &str) -> String {
    opening(
        "while",
        &format!(
            "{{% for __iteration in range({WHILE_ITERATION_LIMIT}) %}}{{% if not ({expr}) %}}{{% break %}}{{% endif %}}"
        ),
    )
}

fn loop_control(keyword: &str, expr: &str) -> String {
    if expr.trim().is_empty() {
        format!("{{% {keyword} %}}")
    } else {
        format!("{{% if {expr} %}}{{% {keyword} %}}{{% endif %}}")
    }
}

/// `@php(statement)` passes one statement through. Bare `@php` opens a block
/// whose body is emitted verbatim up to `@endphp`.
fn compile_php(expr: &str) -> String {
    if expr.trim().is_empty() {
        opening("php", "{% ")
    } else {
        format!("{{% {expr} %}}")
    }
}

fn compile_json(expr: &str) -> String {
    let value = split_args(expr).first().copied().unwrap_or("none");
    format!("{{{{ ({value}) | tojson }}}}")
}

/// `@section('name', 'content')` sets inline content; `@section('name')`
/// starts capturing a block.
fn compile_section(expr: &str) -> String {
    if split_args(expr).len() >= 2 {
        format!("{{{{ __env.set_section({expr}) }}}}")
    } else {
        start_capture("start_section", expr)
    }
}

fn start_capture(method: &str, expr: &str) -> String {
    format!("{{{{ __env.{method}({expr}) }}}}{{% filter __capture %}}")
}

fn end_capture(method: &str) -> String {
    format!("{{% endfilter %}}{{{{ __env.{method}() }}}}")
}

fn compile_error(expr: &str) -> String {
    let field = split_args(expr).first().copied().unwrap_or("''");
    opening(
        "error",
        &format!(
            "{{% with message = errors_first(errors if errors is defined else none, {field}) %}}{{% if message is not none %}}"
        ),
    )
}

fn attribute_when(attribute: &str, expr: &str) -> String {
    format!("{{% if {expr} %}}{attribute}{{% endif %}}")
}
