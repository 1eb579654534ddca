//! Text preparation for the synthesis engine.
//!
//! Piper reads plain text, so anything it cannot pronounce (emoji, markdown
//! markup) is removed or turned into a pause, and punctuation gets extra
//! whitespace so sentences do not run together. The patterns here are
//! heuristics tuned by ear.

use regex::Regex;
use std::sync::LazyLock;

use crate::voice::Language;

const EMOJI_CLASS: &str = concat!(
    "[",
    r"\x{1F600}-\x{1F64F}", // emoticons
    r"\x{1F300}-\x{1F5FF}", // symbols & pictographs
    r"\x{1F680}-\x{1F6FF}", // transport & map
    r"\x{1F700}-\x{1F8FF}",
    r"\x{1F900}-\x{1FAFF}",
    r"\x{1F1E6}-\x{1F1FF}", // regional indicators (flags)
    r"\x{1F004}\x{1F0CF}",
    r"\x{2600}-\x{27BF}", // misc symbols, dingbats
    r"\x{2B50}\x{2B55}",
    r"\x{FE0F}\x{200D}\x{20E3}",
    "]"
);

static EMOJI_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{EMOJI_CLASS}(?:\s*{EMOJI_CLASS})*\s*")).expect("emoji pattern")
});

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}\s+").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").unwrap());
static BOLD_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static BOLD_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.+?)__").unwrap());
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
// \b keeps snake_case identifiers intact.
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+)_\b").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?]+)(?:\s+|$)").unwrap());
static CLAUSE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([,;])(?:\s+|$)").unwrap());

const ELLIPSIS: &str = "...";
const ELLIPSIS_MARK: &str = "\u{E000}";

/// Normalized, engine-ready text and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub is_question: bool,
    /// Characters of the cleaned text, before pause padding and the question
    /// marker are added.
    pub clean_chars: usize,
}

pub fn normalize(raw: &str, language: Language) -> Normalized {
    let text = replace_emojis(raw);
    let clean = strip_markdown(&text);
    let mut text = add_pauses(&clean);
    let is_question = is_question(&text, language);
    if is_question {
        mark_question(&mut text);
    }
    Normalized {
        text,
        is_question,
        clean_chars: clean.chars().count(),
    }
}

/// Turns each run of emoji into a sentence break so the engine pauses
/// instead of spelling out or dropping the symbol.
pub fn replace_emojis(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in EMOJI_RUN.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        let kept = out.trim_end().len();
        out.truncate(kept);
        match out.chars().next_back() {
            None => {}
            Some(c) if matches!(c, '.' | '!' | '?' | ',' | ';' | ':') => out.push(' '),
            Some(_) => out.push_str(". "),
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

pub fn strip_markdown(text: &str) -> String {
    let text = CODE_BLOCK.replace_all(text, " ");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = IMAGE.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = HEADER.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = BOLD_STAR.replace_all(&text, "$1");
    let text = BOLD_UNDERSCORE.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Piper lengthens a pause with the whitespace that follows punctuation.
pub fn add_pauses(text: &str) -> String {
    let text = text.replace(ELLIPSIS, ELLIPSIS_MARK);
    let text = SENTENCE_END.replace_all(&text, "$1   ");
    let text = CLAUSE_END.replace_all(&text, "$1  ");
    text.replace(ELLIPSIS_MARK, ELLIPSIS)
}

pub fn is_question(text: &str, language: Language) -> bool {
    let trimmed = text.trim();
    if trimmed.ends_with('?') || trimmed.starts_with('¿') {
        return true;
    }
    let lead = trimmed
        .trim_start_matches(['"', '\'', '“', '«', '(', '¡'])
        .to_lowercase();
    interrogatives(language).iter().any(|marker| {
        lead.strip_prefix(marker)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric()))
    })
}

fn interrogatives(language: Language) -> &'static [&'static str] {
    match language {
        Language::En => &[
            "what", "why", "how", "who", "whom", "whose", "where", "when", "which",
        ],
        Language::Es => &[
            "qué", "por qué", "cómo", "cuándo", "dónde", "adónde", "quién", "quiénes", "cuál",
            "cuáles", "cuánto", "cuánta", "cuántos", "cuántas",
        ],
        Language::Pt => &[
            "o que", "o quê", "por que", "por quê", "como", "quando", "onde", "quem", "qual",
            "quais", "quanto", "quanta", "quantos", "quantas",
        ],
    }
}

/// An ellipsis before the closing question mark nudges Piper towards a
/// rising, hesitant ending.
fn mark_question(text: &mut String) {
    let Some(idx) = text.rfind('?') else {
        return;
    };
    let prev = text[..idx].chars().next_back();
    match prev {
        None | Some('.' | '?' | '!') => {}
        Some(_) => text.insert_str(idx, ELLIPSIS),
    }
}
