//! Switch lowering.
//!
//! `@switch` compiles to an `if`/`elif` chain, so cases never fall through
//! and the `@break` that ends each case has nothing to do. Left in place it
//! would become a loop `{% break %}`. This stage drops every bare `@break`
//! whose innermost enclosing block is a switch and leaves loop breaks alone.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::pipeline::CompilerStage;

/// Stage priority of switch lowering. Runs before directive expansion.
pub const SWITCH_PRIORITY: i32 = 200;

static BLOCK_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\B@(switch|endswitch|foreach|endforeach|forelse|endforelse|for|endfor|while|endwhile|break)\b",
    )
    .expect("valid block token pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Switch,
    Loop,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchLowering;

impl SwitchLowering {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerStage for SwitchLowering {
    fn name(&self) -> &str {
        "switch"
    }

    fn priority(&self) -> i32 {
        SWITCH_PRIORITY
    }

    fn compile(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut stack: Vec<Block> = Vec::new();
        let mut cursor = 0;

        for caps in BLOCK_TOKEN.captures_iter(text) {
            let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            // `@@switch` is escaped text.
            if text[..whole.start()].ends_with('@') {
                continue;
            }
            match token.as_str() {
                "switch" => stack.push(Block::Switch),
                "foreach" | "forelse" | "for" | "while" => stack.push(Block::Loop),
                "endswitch" | "endforeach" | "endforelse" | "endfor" | "endwhile" => {
                    stack.pop();
                }
                _ => {
                    let conditional = text[whole.end()..]
                        .trim_start_matches([' ', '\t'])
                        .starts_with('(');
                    if !conditional && stack.last() == Some(&Block::Switch) {
                        out.push_str(&text[cursor..whole.start()]);
                        cursor = whole.end();
                    }
                }
            }
        }

        out.push_str(&text[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(text: &str) -> String {
        SwitchLowering.compile(text)
    }

    #[test]
    fn drops_case_breaks() {
        assert_eq!(
            lower("@switch($x) @case(1) one @break @default other @endswitch"),
            "@switch($x) @case(1) one  @default other @endswitch"
        );
    }

    #[test]
    fn keeps_loop_breaks() {
        let text = "@foreach($xs as $x) @break @endforeach";
        assert_eq!(lower(text), text);
    }

    #[test]
    fn loop_inside_switch_keeps_its_break() {
        let text = "@switch($x) @case(1) @foreach($xs as $y) @break @endforeach @break @endswitch";
        assert_eq!(
            lower(text),
            "@switch($x) @case(1) @foreach($xs as $y) @break @endforeach  @endswitch"
        );
    }

    #[test]
    fn switch_inside_loop() {
        let text = "@foreach($xs as $x) @switch($x) @case(1) @break @endswitch @break @endforeach";
        assert_eq!(
            lower(text),
            "@foreach($xs as $x) @switch($x) @case(1)  @endswitch @break @endforeach"
        );
    }

    #[test]
    fn conditional_break_is_kept() {
        let text = "@switch($x) @case(1) @break($y) @endswitch";
        assert_eq!(lower(text), text);
    }

    #[test]
    fn escaped_tokens_are_ignored() {
        let text = "@@switch @break";
        assert_eq!(lower(text), text);
    }
}
