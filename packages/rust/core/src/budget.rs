//! Fit named text blocks into a fixed character budget.
//!
//! Blocks whose names match a canonical section (abstract, introduction,
//! methods, ...) are emitted first in canonical order, then the rest in
//! encounter order. The first block that does not fit is truncated (or
//! skipped when too little room is left) and nothing after it is emitted.
//! All lengths are counted in characters.

use std::sync::LazyLock;

use regex::Regex;

use distill_shared::{NamedTextBlock, TITLE_BLOCK};

/// Canonical section names, most important first.
pub const PRIORITY_SECTIONS: [&str; 15] = [
    "Abstract",
    "Introduction",
    "Methods",
    "Methodology",
    "Method",
    "Approach",
    "Model",
    "Results",
    "Experiments",
    "Evaluation",
    "Discussion",
    "Conclusion",
    "Conclusions",
    "Related Work",
    "Background",
];

/// Appended to a section body cut short by the budget.
pub const SECTION_TRUNCATION_MARKER: &str = "\n\n[Truncated]\n\n";

/// Appended to the fallback text when it is cut short.
pub const FALLBACK_TRUNCATION_MARKER: &str = "\n\n[Content truncated due to length]";

/// Below this many real blocks the structure is considered unreliable.
const MIN_STRUCTURED_BLOCKS: usize = 3;

/// Room held back for the truncation marker.
const TRUNCATION_MARGIN: usize = 50;

/// A truncated body shorter than this is not worth emitting.
const MIN_USEFUL_CHARS: usize = 200;

static NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d.:\s]+").expect("valid regex"));

/// Assemble `blocks` into at most `max_chars` characters.
///
/// With fewer than three blocks besides the title the section structure is
/// ignored and a prefix of `fallback` is returned instead, followed by
/// [`FALLBACK_TRUNCATION_MARKER`] when it had to be cut.
pub fn prepare_content(blocks: &[NamedTextBlock], fallback: &str, max_chars: usize) -> String {
    let real: Vec<&NamedTextBlock> = blocks.iter().filter(|b| b.name != TITLE_BLOCK).collect();

    if real.len() < MIN_STRUCTURED_BLOCKS {
        return truncate_fallback(fallback, max_chars);
    }

    let mut budget = Budget::new(max_chars);
    let mut emitted = vec![false; real.len()];

    'priority: for priority in PRIORITY_SECTIONS {
        for (idx, block) in real.iter().enumerate() {
            if emitted[idx] || !matches_priority(&block.name, priority) {
                continue;
            }
            if !budget.push(block) {
                break 'priority;
            }
            emitted[idx] = true;
        }
    }

    if !budget.exhausted {
        for (idx, block) in real.iter().enumerate() {
            if !emitted[idx] && !budget.push(block) {
                break;
            }
        }
    }

    budget.out
}

/// Whether a block name matches a canonical section name.
///
/// Leading numbering such as `3.` or `2.1:` is stripped, then the canonical
/// name must appear in the remainder, ignoring case.
pub fn matches_priority(block_name: &str, priority: &str) -> bool {
    let cleaned = NUMBERING_RE.replace(block_name, "");
    cleaned
        .trim()
        .to_lowercase()
        .contains(&priority.to_lowercase())
}

fn truncate_fallback(fallback: &str, max_chars: usize) -> String {
    match fallback.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{FALLBACK_TRUNCATION_MARKER}", &fallback[..cut]),
        None => fallback.to_string(),
    }
}

/// First `n` characters of `s`.
fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

struct Budget {
    max: usize,
    used: usize,
    out: String,
    exhausted: bool,
}

impl Budget {
    fn new(max: usize) -> Self {
        Self {
            max,
            used: 0,
            out: String::new(),
            exhausted: false,
        }
    }

    /// Emit `block` whole if it fits. Otherwise emit a truncated copy when
    /// enough room is left, mark the budget exhausted, and return `false`.
    fn push(&mut self, block: &NamedTextBlock) -> bool {
        let header = format!("## {}\n\n", block.name);
        let body = block.text.trim();
        let entry = format!("{header}{body}\n\n");
        let entry_len = entry.chars().count();

        if self.used + entry_len <= self.max {
            self.out.push_str(&entry);
            self.used += entry_len;
            return true;
        }

        let remaining = self
            .max
            .saturating_sub(self.used)
            .saturating_sub(header.chars().count())
            .saturating_sub(TRUNCATION_MARGIN);
        if remaining > MIN_USEFUL_CHARS {
            let cut = format!(
                "{header}{}{SECTION_TRUNCATION_MARKER}",
                char_prefix(body, remaining).trim()
            );
            self.used += cut.chars().count();
            self.out.push_str(&cut);
        }
        self.exhausted = true;
        false
    }
}
