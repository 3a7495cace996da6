// src/classify/vocabulary.rs

//! Marker vocabularies for the keyword classifier.

use serde::Deserialize;

/// One set of markers, one list per verdict tier.
///
/// Matching is case-insensitive substring search; markers are stored
/// upper-cased so a line only needs to be upper-cased once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MarkerVocabulary {
    #[serde(default)]
    pub pass: Vec<String>,
    #[serde(default)]
    pub fail: Vec<String>,
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub error: Vec<String>,
}

impl MarkerVocabulary {
    pub fn english() -> Self {
        Self::from_lists(
            &["PASS"],
            &["FAIL"],
            &["PENDING", "NEEDS CONFIRMATION", "NEED CONFIRMATION", "TO BE CONFIRMED"],
            &["TRACEBACK", "EXCEPTION"],
        )
    }

    pub fn chinese() -> Self {
        Self::from_lists(
            &["合格", "通过"],
            &["不合格", "不通过", "失败"],
            &["待确认", "需确认", "需要确认", "待定"],
            &["异常", "报错"],
        )
    }

    pub fn from_lists(pass: &[&str], fail: &[&str], pending: &[&str], error: &[&str]) -> Self {
        let own = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            pass: own(pass),
            fail: own(fail),
            pending: own(pending),
            error: own(error),
        }
        .normalized()
    }

    /// Upper-case every marker and drop blanks.
    pub fn normalized(self) -> Self {
        let norm = |xs: Vec<String>| {
            xs.into_iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            pass: norm(self.pass),
            fail: norm(self.fail),
            pending: norm(self.pending),
            error: norm(self.error),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pass.is_empty() && self.fail.is_empty() && self.pending.is_empty() && self.error.is_empty()
    }
}

pub(crate) fn contains_any(haystack: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| haystack.contains(m.as_str()))
}
