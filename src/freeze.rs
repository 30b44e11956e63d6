//! Static extraction: rewrite a stub file with its stored implementations inlined.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::cache::ImplementationStore;
use crate::conjure::ConjureError;
use crate::identity::{FunctionSpec, IdentityMode};

pub const MISSING_MARKER: &str = "# not yet generated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenModule {
    pub text: String,
    /// Stubs replaced by their stored implementation, in source order.
    pub frozen: Vec<String>,
    /// Stubs with no stored implementation, kept as written.
    pub missing: Vec<String>,
}

/// A contiguous run of source lines; `def_name` is set for top-level `def` blocks.
struct Segment<'a> {
    lines: Vec<&'a str>,
    def_name: Option<&'a str>,
}

/// Replaces every stub declared in `source` with the implementation the store
/// holds for it. Identities are recomputed from the declarations, so no name
/// index is needed in the store.
pub fn freeze(
    source_id: &str,
    source: &str,
    store: &dyn ImplementationStore,
    mode: IdentityMode,
) -> Result<FrozenModule, ConjureError> {
    let stubs: HashMap<String, FunctionSpec> = FunctionSpec::stubs_in(source_id, source)?
        .into_iter()
        .map(|spec| (spec.name().to_string(), spec))
        .collect();

    let mut text = format!("# Frozen from {source_id}\n");
    let mut frozen = Vec::new();
    let mut missing = Vec::new();

    for segment in segments(source) {
        let spec = segment.def_name.and_then(|name| stubs.get(name));
        match spec {
            Some(spec) => {
                let identity = spec.identity(mode);
                match store.load(&identity.key) {
                    Some(implementation) => {
                        debug!(name = %identity.name, key = %identity.key, "inlining stored implementation");
                        text.push_str(implementation.trim_end());
                        text.push('\n');
                        frozen.push(identity.name);
                    }
                    None => {
                        text.push_str(MISSING_MARKER);
                        text.push('\n');
                        push_lines(&mut text, &segment.lines);
                        missing.push(identity.name);
                    }
                }
            }
            None => push_lines(&mut text, &segment.lines),
        }
    }

    info!(source_id, frozen = frozen.len(), missing = missing.len(), "froze module");
    Ok(FrozenModule {
        text,
        frozen,
        missing,
    })
}

fn push_lines(text: &mut String, lines: &[&str]) {
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
}

fn is_top_level(line: &str) -> bool {
    !line.trim().is_empty() && !line.starts_with([' ', '\t', '#'])
}

fn def_name(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("def")?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let rest = rest.trim_start();
    let end = rest
        .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// Splits source into top-level `def` blocks and everything in between. A block
/// runs from its `def` line to its last indented line; trailing blank and
/// comment lines belong to whatever follows.
fn segments(source: &str) -> Vec<Segment<'_>> {
    let lines: Vec<&str> = source.lines().collect();
    let mut segments = Vec::new();
    let mut plain: Vec<&str> = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let Some(name) = def_name(line) else {
            plain.push(line);
            index += 1;
            continue;
        };

        let mut last = index;
        let mut cursor = index + 1;
        while cursor < lines.len() && !is_top_level(lines[cursor]) {
            if lines[cursor].starts_with([' ', '\t']) && !lines[cursor].trim().is_empty() {
                last = cursor;
            }
            cursor += 1;
        }

        if !plain.is_empty() {
            segments.push(Segment {
                lines: std::mem::take(&mut plain),
                def_name: None,
            });
        }
        segments.push(Segment {
            lines: lines[index..=last].to_vec(),
            def_name: Some(name),
        });
        index = last + 1;
    }

    if !plain.is_empty() {
        segments.push(Segment {
            lines: plain,
            def_name: None,
        });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn def_names_are_extracted() {
        assert_eq!(def_name("def fibonacci(n: int) -> int:"), Some("fibonacci"));
        assert_eq!(def_name("define = 1"), None);
        assert_eq!(def_name("    def inner():"), None);
    }

    #[test]
    fn blocks_stop_at_the_last_indented_line() {
        let source = "import math\n\ndef f(x):\n    \"\"\"Doc.\"\"\"\n\n    ...\n\n# trailing\nY = 2\n";
        let segments = segments(source);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].lines, ["import math", ""]);
        assert_eq!(segments[1].def_name, Some("f"));
        assert_eq!(segments[1].lines, ["def f(x):", "    \"\"\"Doc.\"\"\"", "", "    ..."]);
        assert_eq!(segments[2].lines, ["", "# trailing", "Y = 2"]);
    }
}
