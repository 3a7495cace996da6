// tests/property_rules.rs

use proptest::prelude::*;

use seqrun::classify::{KeywordClassifier, ResultClassifier};
use seqrun::engine::core::{evaluate_batch, BatchProgress};
use seqrun::types::{Status, TestResult};

// Filler text that can never contain a marker in either vocabulary.
fn noise() -> impl Strategy<Value = String> {
    "[0-9 .:=/-]{0,24}"
}

fn marker() -> impl Strategy<Value = (String, TestResult)> {
    prop_oneof![
        Just(("result: PASS".to_string(), TestResult::Pass)),
        Just(("测试通过".to_string(), TestResult::Pass)),
        Just(("result: FAIL".to_string(), TestResult::Fail)),
        Just(("判定: 不合格".to_string(), TestResult::Fail)),
        Just(("needs confirmation".to_string(), TestResult::Pending)),
        Just(("待确认".to_string(), TestResult::Pending)),
        Just(("Traceback (most recent call last):".to_string(), TestResult::Error)),
        Just(("串口异常".to_string(), TestResult::Error)),
    ]
}

fn status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Pending),
        Just(Status::Running),
        Just(Status::Paused),
        Just(Status::Success),
        Just(Status::Failed),
        Just(Status::Error),
        Just(Status::Timeout),
        Just(Status::Cancelled),
    ]
}

proptest! {
    #[test]
    fn last_marker_line_decides_the_verdict(
        before in proptest::collection::vec(noise(), 0..8),
        earlier in proptest::collection::vec(marker(), 0..4),
        last in marker(),
        after in proptest::collection::vec(noise(), 0..8),
    ) {
        let mut lines = before;
        lines.extend(earlier.into_iter().map(|(line, _)| line));
        lines.push(last.0.clone());
        lines.extend(after);

        let verdict = KeywordClassifier::default().classify(&lines);
        prop_assert_eq!(verdict, last.1);
    }

    #[test]
    fn output_without_markers_is_pending(lines in proptest::collection::vec(noise(), 0..16)) {
        prop_assert_eq!(KeywordClassifier::default().classify(&lines), TestResult::Pending);
    }

    #[test]
    fn batch_status_follows_member_statuses(members in proptest::collection::vec(status(), 0..12)) {
        let in_flight = members.iter().any(|s| matches!(s, Status::Pending | Status::Running | Status::Paused));
        let progress = evaluate_batch(&members);

        if in_flight {
            prop_assert_eq!(
                progress,
                BatchProgress::InFlight { any_paused: members.contains(&Status::Paused) }
            );
        } else if members.iter().all(|s| *s == Status::Success) {
            prop_assert_eq!(progress, BatchProgress::Complete(Status::Success));
        } else {
            prop_assert_eq!(progress, BatchProgress::Complete(Status::Failed));
        }
    }
}
