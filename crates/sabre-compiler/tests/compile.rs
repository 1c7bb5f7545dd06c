//! End-to-end compilation of realistic templates.

use std::path::Path;

use insta::assert_snapshot;
use sabre_compiler::{validate, CompileError, CompilerStage, Pipeline};

fn compile(source: &str) -> String {
    Pipeline::new().compile(source)
}

#[test]
fn page_with_layout() {
    let source = "@extends('layouts.app')\n\
                  @section('title', 'Orders')\n\
                  @section('content')\n\
                  @forelse($orders as $order)\n\
                  <li>{{ $order->id }}</li>\n\
                  @empty\n\
                  <li>none</li>\n\
                  @endforelse\n\
                  @endsection\n";
    let compiled = compile(source);

    assert_eq!(compiled.lines().count(), source.lines().count());
    assert_snapshot!(compiled.lines().nth(3).unwrap_or_default(), @"{#forelse#}{% for order in orders %}");
    assert_snapshot!(compiled.lines().nth(4).unwrap_or_default(), @"<li>{{ (order.id) | e }}</li>");
    assert_snapshot!(compiled.lines().nth(5).unwrap_or_default(), @"{% else %}");
    assert!(validate(&compiled, 0, Path::new("orders.sabre.html")).is_ok());
}

#[test]
fn switch_inside_loop() {
    let compiled = compile(
        "@foreach($xs as $x) @switch($x) @case('a') A @break @default D @endswitch @endforeach",
    );
    assert_snapshot!(compiled, @"{#foreach#}{% for x in xs %} {#switch#}{% with __switch = (x) %}{% if false %} {% elif __switch == ('a') %} A  {% else %} D {% endif %}{% endwith %}{#endswitch#} {% endfor %}{#endforeach#}");
}

#[test]
fn comments_hide_directives() {
    let compiled = compile("{{-- @section('x') --}}ok");
    assert_eq!(compiled, "ok");
    assert!(validate(&compiled, 0, Path::new("x")).is_ok());
}

#[test]
fn escaped_directives_and_echoes() {
    assert_eq!(compile("@@if @{{ name }}"), "@if {% raw %}{{ name }}{% endraw %}");
}

#[test]
fn email_addresses_are_text() {
    assert_eq!(compile("mail me@if.example"), "mail me@if.example");
}

#[test]
fn custom_stage_runs_first() {
    struct Shortcodes;

    impl CompilerStage for Shortcodes {
        fn name(&self) -> &str {
            "shortcodes"
        }

        fn priority(&self) -> i32 {
            400
        }

        fn compile(&self, text: &str) -> String {
            text.replace("[[year]]", "{{ $year }}")
        }
    }

    let mut pipeline = Pipeline::new();
    pipeline.add(Shortcodes);
    assert_eq!(pipeline.stage_names()[0], "shortcodes");
    assert_eq!(pipeline.compile("(c) [[year]]"), "(c) {{ (year) | e }}");
}

#[test]
fn unclosed_section_reports_source_line() {
    let compiled = compile("@extends('app')\n\n@section('sidebar')\n<nav></nav>\n");
    let err = validate(&compiled, 0, Path::new("home.sabre.html")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unbalanced @section [sidebar] in home.sabre.html near line 3: \
         expected a matching @endsection (1 opened, 0 closed)"
    );
    assert!(matches!(err, CompileError::Unbalanced { .. }));
}
