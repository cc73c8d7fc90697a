//! Convert backend-native hits into one ranked result shape.

use ragbot_core::{QueryResult, RawHit, SearchHit, SourceFilter};

/// Normalize raw hits: distances become `1 - d`, non-finite scores and rows
/// outside `filter` are dropped, and the remainder is sorted best-first and
/// cut to `k`.
///
/// The sort is stable, so backend-native order breaks ties.
pub fn normalize_hits(raw: Vec<RawHit>, filter: &SourceFilter, k: usize) -> QueryResult {
    let mut hits: Vec<SearchHit> = raw
        .into_iter()
        .filter(|hit| filter.matches(&hit.source))
        .map(SearchHit::from)
        .filter(|hit| hit.score.is_finite())
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragbot_core::RawScore;

    fn raw(content: &str, score: RawScore, source: &str) -> RawHit {
        RawHit {
            content: content.to_string(),
            score,
            source: source.to_string(),
        }
    }

    #[test]
    fn test_distance_inverted_and_sorted() {
        let hits = normalize_hits(
            vec![
                raw("far", RawScore::Distance(0.8), "a"),
                raw("near", RawScore::Distance(0.1), "a"),
                raw("mid", RawScore::Similarity(0.5), "a"),
            ],
            &SourceFilter::all(),
            10,
        );

        let order: Vec<_> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(order, vec!["near", "mid", "far"]);
        assert!((hits[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_filter_reapplied() {
        let hits = normalize_hits(
            vec![
                raw("keep", RawScore::Distance(0.3), "catA"),
                raw("leak", RawScore::Distance(0.0), "birdA"),
            ],
            &SourceFilter::from_sources(["catA"]),
            5,
        );

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "catA");
    }

    #[test]
    fn test_non_finite_dropped_and_truncated() {
        let hits = normalize_hits(
            vec![
                raw("nan", RawScore::Distance(f32::NAN), "s"),
                raw("one", RawScore::Distance(0.2), "s"),
                raw("two", RawScore::Distance(0.4), "s"),
                raw("three", RawScore::Distance(0.6), "s"),
            ],
            &SourceFilter::all(),
            2,
        );

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "one");
        assert_eq!(hits[1].content, "two");
    }

    #[test]
    fn test_ties_keep_backend_order() {
        let hits = normalize_hits(
            vec![
                raw("first", RawScore::Distance(0.5), "s"),
                raw("second", RawScore::Distance(0.5), "s"),
            ],
            &SourceFilter::all(),
            2,
        );

        assert_eq!(hits[0].content, "first");
        assert_eq!(hits[1].content, "second");
    }
}
