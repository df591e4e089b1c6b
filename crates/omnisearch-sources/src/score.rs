//! Relevance scoring for (query, title, body) triples.

use std::collections::HashSet;

/// Score how well a result matches the query, in [0, 1].
///
/// All comparisons are case-insensitive. The components:
/// - exact title match 1.0, else title containing the query 0.7
/// - body containing the query 0.3
/// - word overlap: 0.5 scaled by the fraction of query words present in
///   the title
///
/// The sum is clamped to 1.0.
pub fn relevance(query: &str, title: &str, body: &str) -> f64 {
    let q = query.to_lowercase();
    let t = title.to_lowercase();
    let b = body.to_lowercase();

    let mut score = 0.0;

    if t == q {
        score += 1.0;
    } else if t.contains(&q) {
        score += 0.7;
    }

    if b.contains(&q) {
        score += 0.3;
    }

    let query_words: Vec<&str> = q.split_ascii_whitespace().collect();
    if !query_words.is_empty() {
        let title_words: HashSet<&str> = t.split_ascii_whitespace().collect();
        let overlap = query_words
            .iter()
            .filter(|w| title_words.contains(*w))
            .count();
        score += 0.5 * overlap as f64 / query_words.len() as f64;
    }

    score.min(1.0)
}
