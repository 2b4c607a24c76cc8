//! Deterministic cleanup of the model's Markdown before it is stored.
//!
//! Even with explicit formatting rules, vision models drift: they wrap the
//! answer in a ```` ```markdown ```` fence, bold their own headings
//! (`**## Key Structures**`), emit CRLF line endings or stray zero-width
//! characters. Each pass below fixes one such quirk without touching the
//! wording. Passes run in table order; fences must go before heading
//! detection, and the final-newline pass must be last.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

type Pass = fn(&str) -> String;

const PASSES: &[(&str, Pass)] = &[
    ("line endings", normalise_line_endings as Pass),
    ("outer fence", strip_outer_fence as Pass),
    ("invisible characters", remove_invisible_chars as Pass),
    ("bolded headings", unbold_headings as Pass),
    ("trailing whitespace", trim_line_ends as Pass),
    ("heading spacing", space_headings as Pass),
    ("blank runs", collapse_blank_runs as Pass),
    ("final newline", single_final_newline as Pass),
];

/// Apply every pass in order.
pub fn tidy_markdown(input: &str) -> String {
    PASSES.iter().fold(input.to_string(), |text, (name, pass)| {
        let next = pass(&text);
        if next != text {
            trace!("tidy pass '{}' changed the text", name);
        }
        next
    })
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A\s*```(?:markdown|md)?[ \t]*\n(.*?)\n```\s*\z").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}

// `**## Heading**` or `__## Heading__` on a line of its own.
static RE_BOLD_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:\*\*|__)(#{1,6}[ \t]+[^*_\n]+?)(?:\*\*|__)[ \t]*$").unwrap()
});

fn unbold_headings(input: &str) -> String {
    RE_BOLD_HEADING.replace_all(input, "$1").into_owned()
}

fn trim_line_ends(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn space_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in input.lines() {
        if is_heading(line) && out.last().is_some_and(|prev| !prev.is_empty()) {
            out.push("");
        }
        out.push(line);
    }
    out.join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_runs(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn single_final_newline(input: &str) -> String {
    let body = input.trim_matches('\n');
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_is_removed() {
        assert_eq!(strip_outer_fence("```markdown\n## A\n- b\n```"), "## A\n- b");
        assert_eq!(strip_outer_fence("```\n## A\n```\n"), "## A");
        assert_eq!(strip_outer_fence("## A\n```\ncode\n```"), "## A\n```\ncode\n```");
    }

    #[test]
    fn bolded_headings_are_unwrapped() {
        assert_eq!(
            unbold_headings("**## Key Structures**\n- zona"),
            "## Key Structures\n- zona"
        );
        assert_eq!(unbold_headings("**bold text** stays"), "**bold text** stays");
    }

    #[test]
    fn headings_get_a_blank_line_before() {
        assert_eq!(space_headings("intro\n## A\n- x"), "intro\n\n## A\n- x");
        assert_eq!(space_headings("## A\n\n## B"), "## A\n\n## B");
        assert_eq!(space_headings("#hashtag\n##B"), "#hashtag\n##B");
    }

    #[test]
    fn blank_runs_collapse_to_one_blank_line() {
        assert_eq!(collapse_blank_runs("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(remove_invisible_chars("zo\u{200B}na\u{FEFF}"), "zona");
    }

    #[test]
    fn final_newline() {
        assert_eq!(single_final_newline("a\n\n\n"), "a\n");
        assert_eq!(single_final_newline("\n\n"), "");
    }

    #[test]
    fn whole_pipeline() {
        let raw = "```markdown\r\n**## Key Structures**\r\n- zona pellucida visible   \r\n\r\n\r\n\r\n## Conclusion\r\nGood.\r\n```";
        assert_eq!(
            tidy_markdown(raw),
            "## Key Structures\n- zona pellucida visible\n\n## Conclusion\nGood.\n"
        );
    }

    #[test]
    fn clean_input_is_unchanged() {
        let clean = "## Key Structures\n- zona pellucida visible\n";
        assert_eq!(tidy_markdown(clean), clean);
    }
}
