//! Retrieval engine: scoring, ranking, and excerpt extraction.
//!
//! # Scoring
//!
//! The baseline policy is an additive textual heuristic:
//!
//! ```text
//! score = 0.8 · [title contains query] + 0.6 · [content contains query]
//! ```
//!
//! Both checks are case-insensitive substring matches. Documents scoring
//! zero are not returned.
//!
//! In hybrid mode the best cosine similarity between the query embedding
//! and the document or any of its chunks is added on top:
//!
//! ```text
//! hybrid = text + semantic_weight · max(0, cos)
//! ```
//!
//! and documents with no textual match are admitted when `cos` reaches
//! `min_similarity`.
//!
//! # Ordering
//!
//! Score descending, then `created_at` descending, then ID ascending, so
//! equal scores always come out in the same order.

use crate::embedding::cosine_similarity;
use crate::models::{Document, SearchResult};

pub const TITLE_WEIGHT: f64 = 0.8;
pub const CONTENT_WEIGHT: f64 = 0.6;

/// Characters of context kept on each side of a match.
pub const EXCERPT_CONTEXT: usize = 100;
/// Content up to this many characters is returned whole.
pub const EXCERPT_MAX: usize = 200;

/// How stored documents are ranked against a query.
#[derive(Debug, Clone)]
pub enum RankMode {
    Text,
    Hybrid {
        query_embedding: Vec<f32>,
        semantic_weight: f64,
        min_similarity: f64,
    },
}

/// Case-folded copy of `text` plus, for each folded char, the index of the
/// original char it came from. Folding can expand a char (`İ` → `i̇`), so
/// positions are mapped back rather than assumed equal.
struct Folded {
    chars: Vec<char>,
    origin: Vec<usize>,
}

fn fold(text: &str) -> Folded {
    let mut chars = Vec::with_capacity(text.len());
    let mut origin = Vec::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        for lc in c.to_lowercase() {
            chars.push(lc);
            origin.push(i);
        }
    }
    Folded { chars, origin }
}

fn fold_query(query: &str) -> Vec<char> {
    query.chars().flat_map(char::to_lowercase).collect()
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn contains_ci(text: &str, query: &str) -> bool {
    let needle = fold_query(query);
    find_chars(&fold(text).chars, &needle).is_some()
}

/// Additive textual score. An empty query scores zero.
pub fn text_score(query: &str, title: &str, content: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let mut score = 0.0;
    if contains_ci(title, query) {
        score += TITLE_WEIGHT;
    }
    if contains_ci(content, query) {
        score += CONTENT_WEIGHT;
    }
    score
}

/// Pick the excerpt shown for a hit.
///
/// - content of at most [`EXCERPT_MAX`] chars is returned unchanged;
/// - otherwise, if the query occurs (case-insensitively) at char `p`, the
///   window `[p - 100, p + len + 100)` clipped to the content;
/// - otherwise the first [`EXCERPT_MAX`] chars followed by `...`.
pub fn extract_excerpt(content: &str, query: &str) -> String {
    let total = content.chars().count();
    if total <= EXCERPT_MAX {
        return content.to_string();
    }

    let folded = fold(content);
    let needle = fold_query(query);

    match find_chars(&folded.chars, &needle) {
        Some(pos) => {
            let start = folded.origin[pos];
            let end = folded.origin[pos + needle.len() - 1] + 1;
            let from = start.saturating_sub(EXCERPT_CONTEXT);
            let to = (end + EXCERPT_CONTEXT).min(total);
            content.chars().skip(from).take(to - from).collect()
        }
        None => {
            let head: String = content.chars().take(EXCERPT_MAX).collect();
            format!("{}...", head)
        }
    }
}

fn best_similarity(query_embedding: &[f32], doc: &Document) -> f64 {
    let doc_sim = doc
        .embedding
        .as_deref()
        .map(|e| cosine_similarity(query_embedding, e))
        .unwrap_or(0.0);

    doc.chunks
        .iter()
        .filter_map(|c| c.embedding.as_deref())
        .map(|e| cosine_similarity(query_embedding, e))
        .fold(doc_sim, f32::max) as f64
}

/// Score, filter, order, and truncate `docs` for `query`.
pub fn rank(docs: &[Document], query: &str, limit: usize, mode: &RankMode) -> Vec<SearchResult> {
    let mut scored: Vec<(&Document, f64)> = docs
        .iter()
        .filter_map(|doc| {
            let text = text_score(query, &doc.title, &doc.content);
            let score = match mode {
                RankMode::Text => text,
                RankMode::Hybrid {
                    query_embedding,
                    semantic_weight,
                    min_similarity,
                } => {
                    let sim = best_similarity(query_embedding, doc);
                    if text <= 0.0 && sim < *min_similarity {
                        return None;
                    }
                    text + semantic_weight * sim.max(0.0)
                }
            };
            (score > 0.0).then_some((doc, score))
        })
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.created_at.cmp(&a.created_at))
            .then(a.id.cmp(&b.id))
    });
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(doc, score)| SearchResult {
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            category: doc.category,
            source: doc.source.clone(),
            created_at: doc.created_at,
            score,
            excerpt: extract_excerpt(&doc.content, query),
        })
        .collect()
}

/// Print ranked results to stdout (CLI).
pub fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(result.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            result.category,
            result.title
        );
        println!("    created: {}", date);
        if !result.source.is_empty() {
            println!("    source: {}", result.source);
        }
        println!(
            "    excerpt: \"{}\"",
            result.excerpt.replace('\n', " ").trim()
        );
        println!("    id: {}", result.document_id);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Chunk, Status};

    fn doc(id: &str, title: &str, content: &str, created_at: i64) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: Category::CivilLaw,
            source: String::new(),
            filename: String::new(),
            owner_id: String::new(),
            status: Status::Processed,
            created_at,
            updated_at: created_at,
            embedding: None,
            chunks: Vec::new(),
        }
    }

    #[test]
    fn test_title_only_scores_point_eight() {
        let s = text_score("contract", "Sample Contract Template", "Fill in the blanks.");
        assert!((s - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_title_and_content_score_additive() {
        let s = text_score("LEASE", "Lease Agreement", "This lease runs two years.");
        assert!((s - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_content_only_and_no_match() {
        assert!((text_score("tax", "Ruling", "Income tax applies.") - 0.6).abs() < 1e-9);
        assert_eq!(text_score("zoning", "Ruling", "Income tax applies."), 0.0);
        assert_eq!(text_score("", "Ruling", "anything"), 0.0);
    }

    #[test]
    fn test_case_insensitive_non_ascii() {
        let s = text_score("договор", "ДОГОВОР аренды", "Текст");
        assert!((s - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_short_content_returned_verbatim() {
        let content = "Short ruling text.";
        assert_eq!(extract_excerpt(content, "absent"), content);
        let exactly_200 = "x".repeat(200);
        assert_eq!(extract_excerpt(&exactly_200, "y"), exactly_200);
    }

    #[test]
    fn test_excerpt_window_around_match() {
        let content = format!("{}CONTRACT{}", "a".repeat(300), "b".repeat(300));
        let excerpt = extract_excerpt(&content, "contract");
        let expected: String = content.chars().skip(200).take(100 + 8 + 100).collect();
        assert_eq!(excerpt, expected);
        assert!(excerpt.contains("CONTRACT"));
    }

    #[test]
    fn test_excerpt_window_clipped_at_bounds() {
        let content = format!("penalty{}", "z".repeat(250));
        let excerpt = extract_excerpt(&content, "Penalty");
        assert_eq!(excerpt.chars().count(), 7 + 100);
        assert!(excerpt.starts_with("penalty"));

        let tail = format!("{}penalty", "z".repeat(250));
        let excerpt = extract_excerpt(&tail, "penalty");
        assert!(excerpt.ends_with("penalty"));
        assert_eq!(excerpt.chars().count(), 100 + 7);
    }

    #[test]
    fn test_excerpt_without_match_is_head_with_ellipsis() {
        let content = "w".repeat(500);
        let excerpt = extract_excerpt(&content, "court");
        assert_eq!(excerpt, format!("{}...", "w".repeat(200)));
    }

    #[test]
    fn test_excerpt_counts_characters_not_bytes() {
        let content = format!("{}суд{}", "ж".repeat(150), "ж".repeat(150));
        let excerpt = extract_excerpt(&content, "СУД");
        assert_eq!(excerpt.chars().count(), 100 + 3 + 100);
    }

    #[test]
    fn test_rank_orders_by_score_then_recency() {
        let docs = vec![
            doc("a", "Other", "mentions contract here", 10),
            doc("b", "Contract law", "contract body", 5),
            doc("c", "Other", "contract again", 20),
            doc("d", "Unrelated", "nothing", 30),
        ];
        let results = rank(&docs, "contract", 10, &RankMode::Text);
        let ids: Vec<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rank_ties_break_by_id() {
        let docs = vec![doc("z", "Deed", "", 1), doc("m", "Deed", "", 1)];
        let results = rank(&docs, "deed", 10, &RankMode::Text);
        assert_eq!(results[0].document_id, "m");
    }

    #[test]
    fn test_rank_respects_limit_and_empty_corpus() {
        let docs: Vec<Document> = (0..5)
            .map(|i| doc(&format!("d{}", i), "Will", "", i))
            .collect();
        assert_eq!(rank(&docs, "will", 2, &RankMode::Text).len(), 2);
        assert!(rank(&[], "will", 10, &RankMode::Text).is_empty());
    }

    #[test]
    fn test_hybrid_admits_semantic_only_matches() {
        let mut semantic = doc("s", "Lease", "rental terms", 1);
        semantic.chunks.push(Chunk {
            id: "c".into(),
            document_id: "s".into(),
            chunk_index: 0,
            content: "rental terms".into(),
            start_offset: 0,
            end_offset: 12,
            hash: "h".into(),
            embedding: Some(vec![1.0, 0.0]),
        });
        let mut far = doc("f", "Tax", "levy", 2);
        far.embedding = Some(vec![0.0, 1.0]);

        let mode = RankMode::Hybrid {
            query_embedding: vec![1.0, 0.0],
            semantic_weight: 0.5,
            min_similarity: 0.3,
        };
        let results = rank(&[semantic, far], "tenancy", 10, &mode);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "s");
        assert!((results[0].score - 0.5).abs() < 1e-6);
    }
}
