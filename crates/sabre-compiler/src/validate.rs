//! Balance checks on compiled template text.
//!
//! Compiled artifacts are scanned, not parsed. Each opener is counted
//! against its closers: section and stack calls on the `__env` runtime object
//! and the comment markers of paired directives. A mismatch is reported with
//! the line of the last offending occurrence, measured in the source
//! template.
//!
//! Directives inside string literals or inside regions a template disables
//! by other means are counted too, so unusual templates can see false
//! positives.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{marker, PAIRED_DIRECTIVES};
use crate::error::CompileError;
use crate::expression::unquote;

static SECTION_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"__env\.(start_section|stop_section|show_section|append_section|overwrite_section)\(([^)]*)\)",
    )
    .expect("valid section call pattern")
});

/// Checks that `artifact` opens and closes every block it uses.
///
/// `header_lines` is the number of lines the cache prepended to the compiled
/// text; reported lines are relative to the source template.
pub fn validate(artifact: &str, header_lines: usize, template: &Path) -> Result<(), CompileError> {
    let scan = Scan {
        artifact,
        header_lines,
        template,
    };
    scan.sections()?;
    scan.calls("push", "endpush", "__env.start_push(", &["__env.stop_push("])?;
    scan.calls(
        "prepend",
        "endprepend",
        "__env.start_prepend(",
        &["__env.stop_prepend("],
    )?;
    for &(open, close) in PAIRED_DIRECTIVES {
        scan.calls(open, close, &marker(open), &[&marker(close)])?;
    }
    Ok(())
}

struct Scan<'a> {
    artifact: &'a str,
    header_lines: usize,
    template: &'a Path,
}

impl Scan<'_> {
    fn sections(&self) -> Result<(), CompileError> {
        let mut open: Vec<(String, usize)> = Vec::new();
        let mut opened = 0;
        let mut closed = 0;

        for caps in SECTION_CALL.captures_iter(self.artifact) {
            let offset = caps.get(0).map_or(0, |m| m.start());
            if &caps[1] == "start_section" {
                opened += 1;
                let name = caps[2].split(',').next().map(unquote).unwrap_or_default();
                open.push((name.to_string(), offset));
            } else {
                closed += 1;
                if open.pop().is_none() {
                    return Err(self.unbalanced("endsection", "section", opened, closed, None, offset));
                }
            }
        }

        match open.pop() {
            Some((name, offset)) => Err(self.unbalanced(
                "section",
                "endsection",
                opened,
                closed,
                Some(name),
                offset,
            )),
            None => Ok(()),
        }
    }

    fn calls(
        &self,
        directive: &str,
        counterpart: &str,
        opener: &str,
        closers: &[&str],
    ) -> Result<(), CompileError> {
        let opened = self.artifact.matches(opener).count();
        let closed: usize = closers.iter().map(|c| self.artifact.matches(c).count()).sum();

        if opened > closed {
            let offset = self.artifact.rfind(opener).unwrap_or(0);
            return Err(self.unbalanced(directive, counterpart, opened, closed, None, offset));
        }
        if closed > opened {
            let offset = closers
                .iter()
                .filter_map(|c| self.artifact.rfind(c))
                .max()
                .unwrap_or(0);
            return Err(self.unbalanced(counterpart, directive, opened, closed, None, offset));
        }
        Ok(())
    }

    fn unbalanced(
        &self,
        directive: &str,
        missing: &str,
        opened: usize,
        closed: usize,
        section: Option<String>,
        offset: usize,
    ) -> CompileError {
        CompileError::Unbalanced {
            directive: directive.to_string(),
            missing: missing.to_string(),
            opened,
            closed,
            section,
            line: self.line_at(offset),
            template: self.template.to_path_buf(),
        }
    }

    fn line_at(&self, offset: usize) -> usize {
        let line = self.artifact[..offset].matches('\n').count() + 1;
        line.saturating_sub(self.header_lines).max(1)
    }
}
