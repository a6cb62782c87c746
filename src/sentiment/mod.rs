//! Per-segment sentiment scoring.
//!
//! Thin adapter over the VADER lexicon: one compound polarity value in
//! [-1, 1] per segment text. Scoring never fails a pipeline run.

use tracing::debug;

/// Score each text with the VADER compound polarity.
pub fn score_segments(texts: &[&str]) -> Vec<f64> {
    let analyzer = vader_sentiment::SentimentIntensityAnalyzer::new();

    let scores: Vec<f64> = texts
        .iter()
        .map(|text| {
            analyzer
                .polarity_scores(text)
                .get("compound")
                .copied()
                .unwrap_or(0.0)
        })
        .collect();

    debug!("Scored sentiment for {} segments", scores.len());
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_align_with_input() {
        let scores = score_segments(&["great work everyone", "this is a disaster", "the sky"]);
        assert_eq!(scores.len(), 3);
    }

    #[test]
    fn test_polarity_direction() {
        let scores = score_segments(&[
            "This is wonderful, great job, I love it!",
            "This is terrible, awful, I hate it.",
        ]);
        assert!(scores[0] > 0.0);
        assert!(scores[1] < 0.0);
    }

    #[test]
    fn test_scores_bounded() {
        let scores = score_segments(&[
            "amazing fantastic brilliant superb excellent",
            "horrible dreadful atrocious abysmal",
            "",
        ]);
        for s in scores {
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(score_segments(&[]).is_empty());
    }
}
