// src/classify/mod.rs

//! Heuristic verdict classification of captured script output.
//!
//! Scripts report their outcome in free text. The classifier scans the
//! output from the last line backwards so that the most recent evidence
//! wins, and checks each non-blank line against four tiers in priority
//! order:
//!
//! 1. pass (only if the same line carries no fail marker)
//! 2. fail
//! 3. pending / needs confirmation
//! 4. exception / traceback
//!
//! No match anywhere yields `pending`. Every configured vocabulary is
//! consulted at each tier, so synonyms from different languages carry equal
//! weight.

pub mod vocabulary;

use crate::types::TestResult;

pub use vocabulary::MarkerVocabulary;
use vocabulary::contains_any;

/// Strategy that turns output lines into a verdict.
pub trait ResultClassifier: Send + Sync {
    fn classify(&self, lines: &[String]) -> TestResult;
}

/// Keyword-scan classifier over one or more vocabularies.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    vocabularies: Vec<MarkerVocabulary>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(vec![MarkerVocabulary::english(), MarkerVocabulary::chinese()])
    }
}

impl KeywordClassifier {
    pub fn new(vocabularies: Vec<MarkerVocabulary>) -> Self {
        let vocabularies = vocabularies
            .into_iter()
            .map(MarkerVocabulary::normalized)
            .filter(|v| !v.is_empty())
            .collect();
        Self { vocabularies }
    }

    /// Default vocabularies plus an extra one (e.g. from `[classifier]`).
    pub fn with_extra(extra: MarkerVocabulary) -> Self {
        let mut vocabularies = vec![MarkerVocabulary::english(), MarkerVocabulary::chinese()];
        vocabularies.push(extra);
        Self::new(vocabularies)
    }

    fn any(&self, line: &str, pick: impl Fn(&MarkerVocabulary) -> &[String]) -> bool {
        self.vocabularies.iter().any(|v| contains_any(line, pick(v)))
    }

    fn classify_line(&self, line: &str) -> Option<TestResult> {
        let line = line.to_uppercase();
        let has_fail = self.any(&line, |v| &v.fail);

        if !has_fail && self.any(&line, |v| &v.pass) {
            return Some(TestResult::Pass);
        }
        if has_fail {
            return Some(TestResult::Fail);
        }
        if self.any(&line, |v| &v.pending) {
            return Some(TestResult::Pending);
        }
        if self.any(&line, |v| &v.error) {
            return Some(TestResult::Error);
        }
        None
    }
}

impl ResultClassifier for KeywordClassifier {
    fn classify(&self, lines: &[String]) -> TestResult {
        lines
            .iter()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .find_map(|l| self.classify_line(l))
            .unwrap_or(TestResult::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn last_pass_marker_wins() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&lines(&["step ok", "合格"])), TestResult::Pass);
    }

    #[test]
    fn pass_and_fail_on_same_line_is_fail() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&lines(&["合格判定:不合格"])), TestResult::Fail);
        assert_eq!(c.classify(&lines(&["passed 3, failed 1"])), TestResult::Fail);
    }

    #[test]
    fn empty_output_is_pending() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&[]), TestResult::Pending);
        assert_eq!(c.classify(&lines(&["", "   "])), TestResult::Pending);
    }

    #[test]
    fn traceback_is_error() {
        let c = KeywordClassifier::default();
        let out = lines(&["Traceback (most recent call last): ..."]);
        assert_eq!(c.classify(&out), TestResult::Error);
    }

    #[test]
    fn blank_trailing_lines_are_skipped() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&lines(&["FAIL", "", "  "])), TestResult::Fail);
    }

    #[test]
    fn later_evidence_overrides_earlier() {
        let c = KeywordClassifier::default();
        assert_eq!(
            c.classify(&lines(&["Test PASS", "voltage out of range: FAIL"])),
            TestResult::Fail
        );
        assert_eq!(
            c.classify(&lines(&["retry failed", "retry passed"])),
            TestResult::Pass
        );
    }

    #[test]
    fn pending_marker_in_either_language() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify(&lines(&["结果待确认"])), TestResult::Pending);
        assert_eq!(
            c.classify(&lines(&["Result needs confirmation by operator"])),
            TestResult::Pending
        );
    }

    #[test]
    fn extra_vocabulary_is_consulted() {
        let extra = MarkerVocabulary::from_lists(&["GOOD"], &["BAD"], &[], &[]);
        let c = KeywordClassifier::with_extra(extra);
        assert_eq!(c.classify(&lines(&["board is good"])), TestResult::Pass);
        assert_eq!(c.classify(&lines(&["board is bad"])), TestResult::Fail);
    }
}
