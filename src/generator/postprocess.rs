const FENCE: &str = "```";

/// Removes markdown code fences a model wraps around its answer, then trims.
///
/// Lines consisting of an opening fence (optionally tagged, e.g. ` ```python `)
/// or a closing fence are dropped, and a fence left dangling at the end of a
/// line is cut off. Nothing else about the text is checked.
pub fn strip_fences(content: &str) -> String {
    let mut kept = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(tag) = trimmed.strip_prefix(FENCE) {
            if is_fence_tag(tag) {
                continue;
            }
        }
        kept.push(line.strip_suffix(FENCE).unwrap_or(line));
    }
    kept.join("\n").trim().to_string()
}

fn is_fence_tag(tag: &str) -> bool {
    tag.chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '+' | '_' | '.' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tagged_fences() {
        let raw = "```python\ndef f():\n    return 1\n```\n";
        assert_eq!(strip_fences(raw), "def f():\n    return 1");
    }

    #[test]
    fn strips_bare_and_trailing_fences() {
        assert_eq!(strip_fences("```\nx = 1\n```"), "x = 1");
        assert_eq!(strip_fences("x = 1```"), "x = 1");
        assert_eq!(strip_fences("  \n\ndef g():\n    pass\n\n"), "def g():\n    pass");
    }

    #[test]
    fn keeps_backticks_inside_code() {
        let raw = "def f():\n    return '```python'";
        assert_eq!(strip_fences(raw), raw);
    }
}
