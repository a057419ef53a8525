//! Keyword-overlap ranking for large candidate title sets.

use std::collections::BTreeSet;

/// Keyword tokens this short or shorter carry no signal.
const MIN_KEYWORD_LEN: usize = 3;

/// Lowercased alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Build a keyword set from free-form phrases (titles, tags, section names).
pub fn keyword_set<'a, I>(phrases: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    phrases
        .into_iter()
        .flat_map(tokenize)
        .filter(|t| t.chars().count() >= MIN_KEYWORD_LEN)
        .collect()
}

/// Number of distinct tokens `candidate` shares with `keywords`.
pub fn score(candidate: &str, keywords: &BTreeSet<String>) -> usize {
    tokenize(candidate)
        .collect::<BTreeSet<_>>()
        .intersection(keywords)
        .count()
}

/// Keep at most `max` candidates, best overlap first.
///
/// At or under the cap the input comes back unchanged. Otherwise candidates
/// are ranked by score, ties broken alphabetically, so the selection does not
/// depend on input order.
pub fn filter_candidates(
    candidates: &[String],
    keywords: &BTreeSet<String>,
    max: usize,
) -> Vec<String> {
    if candidates.len() <= max {
        return candidates.to_vec();
    }

    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .map(|title| (score(title, keywords), title))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.truncate(max);

    scored.into_iter().map(|(_, title)| title.clone()).collect()
}
