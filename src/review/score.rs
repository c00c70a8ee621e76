#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::gateway::ReviewError;
use crate::constants::{FAILED_SCORE, PENDING_SCORE, SCORE_SCALE};

/// Score patterns, most specific first. Each captures the integer score.
static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:建议分数|score)\s*[:：]\s*(\d+)\s*/\s*100",
        r"(?i)(?:建议分数|score)\s*[:：]\s*(\d+)",
        r"(?i)(?:分数|grade)\s*[:：]\s*(\d+)\s*/\s*100",
        r"(?i)(?:分数|grade)\s*[:：]\s*(\d+)",
    ]
    .into_iter()
    .filter_map(|pattern| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(err) => {
            tracing::error!("Invalid score pattern `{pattern}`: {err}");
            None
        }
    })
    .collect()
});

/// Pulls a score out of free-form review text.
///
/// Returns `"N/100"` for the first pattern that matches, otherwise the
/// pending marker.
pub fn extract_score(text: &str) -> String {
    SCORE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|captures| captures.get(1))
        .map(|score| format!("{}/{SCORE_SCALE}", score.as_str()))
        .unwrap_or_else(|| PENDING_SCORE.to_string())
}

/// Review text and the score extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewResult {
    /// Feedback body.
    pub feedback: String,
    /// `"N/100"`, the pending marker, or the failure marker.
    pub score:    String,
}

impl ReviewResult {
    /// Wraps a successful review.
    pub fn from_feedback(feedback: String) -> Self {
        let score = extract_score(&feedback);
        Self { feedback, score }
    }

    /// Stands in for a failed review: the error becomes the feedback body.
    pub fn failed(error: &ReviewError) -> Self {
        Self {
            feedback: format!("The review service call failed: {error}"),
            score:    FAILED_SCORE.to_string(),
        }
    }

    /// Whether this result stands in for a failed review.
    pub fn is_failure(&self) -> bool {
        self.score == FAILED_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_label_is_recognised() {
        assert_eq!(extract_score("建议分数：85/100"), "85/100");
        assert_eq!(extract_score("分数: 70"), "70/100");
    }

    #[test]
    fn specific_patterns_win() {
        let text = "Grade: 40/100 overall, but Score: 90/100 after fixes";
        assert_eq!(extract_score(text), "90/100");
    }
}
