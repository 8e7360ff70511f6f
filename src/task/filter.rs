//! Strip reasoning and trace output from captured Codex text.
//!
//! Codex interleaves its transcript (banner, prompt echo, `thinking`
//! sections, `exec` tool calls and their output, token counts) with the final
//! answer. Calling agents only want the answer, so everything else is dropped
//! line by line.
//!
//! Two modes share one scanner. [`filter`] knows the transcript section
//! headers; [`strip_reasoning`] only removes `<think>` blocks and fixed noise
//! lines, for text that is already a bare answer. Marker lines are always
//! dropped, so filtering already filtered text changes nothing.

use std::sync::LazyLock;

use regex::Regex;

/// `[2025-09-18T10:12:03]` style prefix used by older Codex builds.
static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?\]\s*")
        .expect("valid timestamp regex")
});

/// Transcript headers that open a verbose block lasting until the next
/// `codex` header.
static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"thinking",
        r"|user",
        r"|User instructions:",
        r"|exec(?:\s.+\sin\s/\S*)?",
        r"|tool\s+\S+\(.*\)",
        r"|apply_patch(?:\s+auto_approved=\w+:?)?",
        r"|turn diff:",
        r"|tokens used(?::?\s*[\d,]+)?",
        r")$"
    ))
    .expect("valid section regex")
});

const CODEX_HEADER: &str = "codex";
const BANNER_RULE: &str = "--------";

const THINK_OPEN: [&str; 2] = ["<think>", "<thinking>"];
const THINK_CLOSE: [&str; 2] = ["</think>", "</thinking>"];

const VERSION_LINE: &str = "OpenAI Codex v";

/// Lines that are noise wherever they appear.
const NOISE_PREFIXES: [&str; 2] = [VERSION_LINE, "Reading prompt from stdin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Full Codex transcript: section headers are honoured.
    Transcript,
    /// Bare answer: only reasoning blocks and noise lines go.
    Answer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    Think,
    Section,
    Banner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Noise,
    Content,
}

/// Return only the content lines of `raw`, with outer blank lines trimmed.
///
/// Total: never fails. Empty input yields an empty string, marker-free input
/// comes back unchanged apart from the trimming.
pub fn filter(raw: &str) -> String {
    scan(raw, Mode::Transcript)
}

/// Like [`filter`], but leaves lines that look like transcript headers alone.
///
/// For a final message printed on its own, where a line reading `user` or
/// `tokens used: 12` is part of the answer.
pub fn strip_reasoning(raw: &str) -> String {
    scan(raw, Mode::Answer)
}

fn scan(raw: &str, mode: Mode) -> String {
    let mut block = Block::None;
    let content: Vec<&str> = raw
        .lines()
        .filter(|line| classify(line, mode, &mut block) == LineKind::Content)
        .collect();
    trim_blank_lines(&content).join("\n")
}

/// Pick the answer out of a finished task's capture.
///
/// Newer Codex builds print the final message alone on stdout and the
/// transcript on stderr; older ones print everything on stderr. Stdout wins
/// when it has anything left, otherwise the last `codex` section of stderr is
/// used, otherwise the whole of stderr. Header rules only apply to a stream
/// that carries a Codex transcript.
pub fn extract_result(stdout: &str, stderr: &str) -> String {
    let from_stdout = filter_stream(stdout);
    if !from_stdout.is_empty() {
        return from_stdout;
    }

    let lines: Vec<&str> = stderr.lines().collect();
    let last_codex = lines
        .iter()
        .rposition(|line| marker_text(line) == CODEX_HEADER);
    match last_codex {
        Some(idx) => filter(&lines[idx + 1..].join("\n")),
        None => filter_stream(stderr),
    }
}

fn filter_stream(raw: &str) -> String {
    if is_transcript(raw) {
        filter(raw)
    } else {
        strip_reasoning(raw)
    }
}

/// Whether `raw` carries a `codex` header or the version banner.
fn is_transcript(raw: &str) -> bool {
    raw.lines().any(|line| {
        let text = marker_text(line);
        text == CODEX_HEADER || text.starts_with(VERSION_LINE)
    })
}

fn classify(line: &str, mode: Mode, block: &mut Block) -> LineKind {
    let text = marker_text(line);

    match *block {
        Block::Think => {
            if contains_any(text, &THINK_CLOSE) {
                *block = Block::None;
            }
            return LineKind::Noise;
        }
        Block::Banner => {
            if text == BANNER_RULE {
                *block = Block::None;
            }
            return LineKind::Noise;
        }
        Block::Section | Block::None => {}
    }

    if mode == Mode::Transcript {
        if let Some(kind) = classify_transcript(text, block) {
            return kind;
        }
    }

    if starts_with_any(text, &THINK_OPEN) {
        if !contains_any(text, &THINK_CLOSE) {
            *block = Block::Think;
        }
        return LineKind::Noise;
    }
    if starts_with_any(text, &THINK_CLOSE) || starts_with_any(text, &NOISE_PREFIXES) {
        return LineKind::Noise;
    }

    LineKind::Content
}

/// Transcript-only markers. `None` means the line is left to the common rules.
fn classify_transcript(text: &str, block: &mut Block) -> Option<LineKind> {
    if text == CODEX_HEADER {
        *block = Block::None;
        return Some(LineKind::Noise);
    }
    if SECTION_HEADER.is_match(text) || *block == Block::Section {
        *block = Block::Section;
        return Some(LineKind::Noise);
    }
    if text == BANNER_RULE {
        *block = Block::Banner;
        return Some(LineKind::Noise);
    }
    None
}

/// The part of a line markers are matched against.
fn marker_text(line: &str) -> &str {
    let line = line.trim();
    match TIMESTAMP_PREFIX.find(line) {
        Some(m) => line[m.end()..].trim(),
        None => line,
    }
}

fn starts_with_any(text: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| text.starts_with(p))
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn trim_blank_lines<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    &lines[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_TRANSCRIPT: &str = "\
[2025-09-18T10:12:03] OpenAI Codex v0.36.0 (research preview)
--------
workdir: /home/dev/project
model: gpt-5-codex
provider: openai
approval: never
sandbox: workspace-write
reasoning effort: medium
--------
[2025-09-18T10:12:03] User instructions:
List the files and say how many there are.

[2025-09-18T10:12:07] thinking

**Listing files**

I'll run ls to see what is there.
[2025-09-18T10:12:08] exec bash -lc ls in /home/dev/project
[2025-09-18T10:12:08] bash -lc ls succeeded in 12ms:
Cargo.toml
src
[2025-09-18T10:12:11] codex

There are 2 entries: `Cargo.toml` and `src`.
[2025-09-18T10:12:11] tokens used: 2,184
";

    const CURRENT_TRANSCRIPT: &str = "\
OpenAI Codex v0.46.0 (research preview)
--------
workdir: /work
model: gpt-5-codex
--------
user
What is 6 * 7?

thinking
**Computing the product**
exec
bash -lc 'echo $((6*7))' in /work
 succeeded in 9ms:
42
codex
Answer: 42
tokens used
1,024
";

    #[test]
    fn test_think_block_scenario() {
        let raw = "<think>\nLet me reason about this.\nStill reasoning.\n</think>\nAnswer: 42";
        assert_eq!(filter(raw), "Answer: 42");
    }

    #[test]
    fn test_single_line_think_block() {
        assert_eq!(filter("<think>quick</think>\nAnswer: 42\n"), "Answer: 42");
        assert_eq!(filter("<thinking>hmm</thinking>\n\nok"), "ok");
    }

    #[test]
    fn test_unclosed_think_block_runs_to_end() {
        assert_eq!(filter("before\n<think>\nnever closed\nstill hidden"), "before");
    }

    #[test]
    fn test_stray_closing_tag_is_noise() {
        assert_eq!(filter("</think>\nresult"), "result");
    }

    #[test]
    fn test_legacy_transcript() {
        assert_eq!(
            filter(LEGACY_TRANSCRIPT),
            "There are 2 entries: `Cargo.toml` and `src`."
        );
    }

    #[test]
    fn test_current_transcript() {
        assert_eq!(filter(CURRENT_TRANSCRIPT), "Answer: 42");
    }

    #[test]
    fn test_multiple_codex_sections_are_all_kept() {
        let raw = "codex\nfirst message\nthinking\nhidden\ncodex\nsecond message\n";
        assert_eq!(filter(raw), "first message\nsecond message");
    }

    #[test]
    fn test_marker_free_text_unchanged() {
        let raw = "line one\n\n  indented line two\nexecutable names are fine";
        assert_eq!(filter(raw), raw);
    }

    #[test]
    fn test_outer_blank_lines_trimmed() {
        assert_eq!(filter("\n\n  \nhello\n\nworld\n\n"), "hello\n\nworld");
    }

    #[test]
    fn test_empty_and_noise_only() {
        assert_eq!(filter(""), "");
        assert_eq!(filter("\n\n"), "");
        assert_eq!(filter("<think>\nonly thoughts\n</think>\n"), "");
    }

    #[test]
    fn test_inline_tag_mid_line_is_content() {
        assert_eq!(filter("use <think> tags"), "use <think> tags");
    }

    #[test]
    fn test_filter_is_idempotent() {
        let samples = [
            "",
            "Answer: 42",
            "<think>\nx\n</think>\nAnswer: 42",
            LEGACY_TRANSCRIPT,
            CURRENT_TRANSCRIPT,
            "\n\nleading\n<thinking>\n</thinking>\ntrailing\n\n",
            "--------\nunterminated banner",
            "text\r\nwith\r\ncrlf\r\n",
            "codex\n\n  spaced  \n\n",
        ];
        for raw in samples {
            let once = filter(raw);
            assert_eq!(filter(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_extract_prefers_stdout() {
        assert_eq!(
            extract_result("final answer\n", LEGACY_TRANSCRIPT),
            "final answer"
        );
    }

    #[test]
    fn test_extract_falls_back_to_last_codex_section() {
        assert_eq!(
            extract_result("", LEGACY_TRANSCRIPT),
            "There are 2 entries: `Cargo.toml` and `src`."
        );
        let stderr = "codex\nearly note\nthinking\nmore\ncodex\nlast word\ntokens used: 10\n";
        assert_eq!(extract_result("  \n", stderr), "last word");
    }

    #[test]
    fn test_bare_answer_keeps_header_like_lines() {
        assert_eq!(
            extract_result("Roles in the schema:\nadmin\nuser\nguest", ""),
            "Roles in the schema:\nadmin\nuser\nguest"
        );
        assert_eq!(
            extract_result("To debug it:\nexec into the pod in staging\nthen run ls\nDone.", ""),
            "To debug it:\nexec into the pod in staging\nthen run ls\nDone."
        );
        assert_eq!(
            extract_result("Summary of cost:\ntokens used per request: 1200\nTotal is fine.", ""),
            "Summary of cost:\ntokens used per request: 1200\nTotal is fine."
        );
    }

    #[test]
    fn test_bare_answer_still_drops_reasoning() {
        let stdout = "<think>\nwho are the roles?\n</think>\nthinking\nuser\nReading prompt from stdin...";
        assert_eq!(extract_result(stdout, ""), "thinking\nuser");
        assert_eq!(strip_reasoning(stdout), "thinking\nuser");
    }

    #[test]
    fn test_transcript_headers_need_codex_shapes() {
        let raw = "codex\nTo debug it:\nexec into the pod in staging\n\
                   tokens used per request: 1200\ntool docs(lookup\ndone\ntokens used: 5\n";
        assert_eq!(
            filter(raw),
            "To debug it:\nexec into the pod in staging\ntokens used per request: 1200\n\
             tool docs(lookup\ndone"
        );
    }

    #[test]
    fn test_transcript_on_stdout_is_fully_filtered() {
        assert_eq!(extract_result(CURRENT_TRANSCRIPT, ""), "Answer: 42");
    }

    #[test]
    fn test_extract_without_codex_section_uses_stderr() {
        assert_eq!(
            extract_result("", "Error: unexpected status 401 Unauthorized\n"),
            "Error: unexpected status 401 Unauthorized"
        );
        assert_eq!(extract_result("", ""), "");
    }
}
