use strsim::levenshtein;

/// Offer the closest known annotation or argument kind for a misspelled
/// one. Candidate lists here are short and static, so the whole set is
/// scored; anything further away than a length-scaled edit distance is not
/// worth proposing.
pub fn did_you_mean(needle: &str, candidates: &[&str]) -> Option<String> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }

    let max_dist = match needle.len() {
        0..=3 => 1,
        4..=6 => 2,
        7..=10 => 3,
        _ => 4,
    };

    let mut scored: Vec<(usize, &str)> = candidates
        .iter()
        .filter(|c| !c.is_empty() && **c != needle)
        .map(|c| (levenshtein(needle, c), *c))
        .filter(|(d, _)| *d <= max_dist)
        .collect();
    scored.sort_by(|(da, a), (db, b)| da.cmp(db).then(a.len().cmp(&b.len())).then(a.cmp(b)));

    match scored.as_slice() {
        [] => None,
        [(_, only)] => Some(format!("did you mean `{}`?", only)),
        many => Some(format!(
            "did you mean one of: {}?",
            many.iter()
                .take(3)
                .map(|(_, s)| format!("`{}`", s))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}
