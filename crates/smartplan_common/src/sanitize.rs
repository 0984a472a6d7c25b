//! Response Sanitizer
//!
//! Model output is untrusted free text. The only normalization applied is
//! removal of decorative code fences, in this order per pass:
//!
//! 1. a leading tagged fence (```` ```python ````)
//! 2. a leading bare fence (```` ``` ````)
//! 3. a trailing bare fence
//!
//! Whitespace is trimmed after each removal. Passes repeat until nothing
//! changes, which makes `sanitize` idempotent for every input.
//!
//! An opening fence without a closing one is stripped on its own and the
//! rest passes through untouched; the report records it so callers can log.
//! A closing fence left in the middle of the text (trailing prose after it)
//! survives into the artifact.

const FENCE: &str = "```";

/// What the sanitizer removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceReport {
    pub opening_stripped: bool,
    pub closing_stripped: bool,
}

impl FenceReport {
    /// Opening fence without a matching closing fence (soft failure)
    pub fn unmatched_open_fence(&self) -> bool {
        self.opening_stripped && !self.closing_stripped
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    pub report: FenceReport,
}

/// Strip decorative fences from raw model output
pub fn sanitize(raw: &str) -> String {
    sanitize_with_report(raw).text
}

pub fn sanitize_with_report(raw: &str) -> Sanitized {
    let mut report = FenceReport::default();
    let mut current = raw;

    loop {
        let before = current.len();

        if let Some(rest) = strip_tagged_open(current) {
            current = rest;
            report.opening_stripped = true;
        }
        if let Some(rest) = current.strip_prefix(FENCE) {
            current = rest.trim();
            report.opening_stripped = true;
        }
        if let Some(rest) = current.strip_suffix(FENCE) {
            current = rest.trim();
            report.closing_stripped = true;
        }

        if current.len() == before {
            break;
        }
    }

    Sanitized {
        text: current.to_string(),
        report,
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '.' | '#')
}

/// ```` ```lang ```` at the very start. The tag must be non-empty and alone
/// on its line; otherwise the word belongs to the content.
fn strip_tagged_open(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(FENCE)?;
    let tag_len = rest.find(|c: char| !is_tag_char(c)).unwrap_or(rest.len());
    if tag_len == 0 {
        return None;
    }
    let after = &rest[tag_len..];
    let line_end = after.find('\n').unwrap_or(after.len());
    if !after[..line_end].trim().is_empty() {
        return None;
    }
    Some(after.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_tagged_fence() {
        assert_eq!(sanitize("```python\nX\n```"), "X");
        assert_eq!(sanitize("```lang\nX\n```"), "X");
    }

    #[test]
    fn test_strips_bare_fence() {
        assert_eq!(sanitize("```\nX\n```"), "X");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(sanitize("X"), "X");
        assert_eq!(sanitize("def f(robot_list):\n    pass"), "def f(robot_list):\n    pass");
        let r = sanitize_with_report("plain");
        assert_eq!(r.report, FenceReport::default());
    }

    #[test]
    fn test_unmatched_open_fence_is_soft() {
        let r = sanitize_with_report("```python\ndef f():\n    pass");
        assert_eq!(r.text, "def f():\n    pass");
        assert!(r.report.unmatched_open_fence());
    }

    #[test]
    fn test_inner_closing_fence_survives() {
        // Trailing prose after the closing fence keeps that fence in place
        let r = sanitize_with_report("```python\nX\n```\nHope this helps");
        assert_eq!(r.text, "X\n```\nHope this helps");
        assert!(r.report.unmatched_open_fence());
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "",
            "```",
            "``````",
            "`````",
            "```X",
            "``` ```X",
            "```python\n```\nX\n```\n```",
            "  ```python\nX```  ",
            "X\n```",
            "```js\n\n  code  \n\n```",
            "```\n```python\nprint(1)\n```",
            "text with ``` inside",
            "```Team of Robots 2 and 3 will perform this task.```",
            "```python  \nX\n```",
        ];
        for input in inputs {
            let once = sanitize(input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_inline_fence_keeps_first_word() {
        let r = sanitize_with_report("```Team of Robots 2 and 3 will perform this task.```");
        assert_eq!(r.text, "Team of Robots 2 and 3 will perform this task.");
        assert!(r.report.opening_stripped && r.report.closing_stripped);

        assert_eq!(sanitize("```Robot 1 does it\nthen stops\n```"), "Robot 1 does it\nthen stops");
        assert_eq!(sanitize("```python  \nX\n```"), "X");
    }

    #[test]
    fn test_nested_fences_fully_removed() {
        assert_eq!(sanitize("```python\n```\nX\n```\n```"), "X");
    }

    proptest! {
        #[test]
        fn prop_idempotent(raw in "[`a-zA-Z#+. \n]{0,40}") {
            let once = sanitize(&raw);
            prop_assert_eq!(sanitize(&once), once);
        }

        #[test]
        fn prop_unfenced_text_untouched(raw in "[^`]{0,80}") {
            prop_assert_eq!(sanitize(&raw), raw);
        }

        #[test]
        fn prop_fenced_body_recovered(
            tag in "(python|rust|js)?",
            body in "[a-zA-Z0-9_()',=]([a-zA-Z0-9_()',= \n]{0,60}[a-zA-Z0-9_()',=])?",
        ) {
            let fenced = format!("```{}\n{}\n```", tag, body);
            prop_assert_eq!(sanitize(&fenced), body);
        }
    }
}
