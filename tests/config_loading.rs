// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use tempfile::{tempdir, NamedTempFile};

use seqrun::classify::{KeywordClassifier, ResultClassifier};
use seqrun::config::{load_and_validate, load_or_default, ConfigProvider};
use seqrun::errors::EngineError;
use seqrun::types::TestResult;

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn empty_file_gives_defaults() {
    let file = toml_file("");
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.default_timeout_secs(), 300);
    assert_eq!(cfg.engine.max_parallel, 1);
    assert!(!cfg.engine.watch_output_files);
    assert_eq!(cfg.tail.patterns, vec!["*.txt", "*.log"]);
    assert_eq!(cfg.tail_recent(), Duration::from_secs(60));
}

#[test]
fn full_file_is_read() {
    let dir = tempdir().unwrap();
    let file = toml_file(&format!(
        r#"
[engine]
default_timeout_secs = 45
working_dir = "{}"
watch_output_files = true
python = "/opt/py/bin/python3"

[tail]
patterns = ["*.out"]
recent_secs = 5

[classifier]
pass = ["OK"]
fail = ["NG"]
"#,
        dir.path().display()
    ));

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.default_timeout(), Duration::from_secs(45));
    assert_eq!(cfg.engine.working_dir.as_deref(), Some(dir.path()));
    assert!(cfg.engine.watch_output_files);
    assert_eq!(cfg.engine.python, "/opt/py/bin/python3");
    assert_eq!(cfg.tail.patterns, vec!["*.out"]);

    let classifier = KeywordClassifier::with_extra(cfg.classifier.clone());
    assert_eq!(classifier.classify(&["voltage ok".to_string()]), TestResult::Pass);
    assert_eq!(classifier.classify(&["judgement: ng".to_string()]), TestResult::Fail);
}

#[test]
fn zero_timeout_returns_config_error() {
    let file = toml_file("[engine]\ndefault_timeout_secs = 0\n");
    match load_and_validate(file.path()) {
        Err(EngineError::Config(msg)) => assert!(msg.contains("default_timeout_secs")),
        other => panic!("Expected Config error, got: {other:?}"),
    }
}

#[test]
fn unknown_keys_are_rejected() {
    let file = toml_file("[engine]\nmax_paralel = 2\n");
    assert!(matches!(load_and_validate(file.path()), Err(EngineError::Toml(_))));
}

#[test]
fn bad_tail_pattern_returns_config_error() {
    let file = toml_file("[tail]\npatterns = [\"[oops\"]\n");
    assert!(matches!(load_and_validate(file.path()), Err(EngineError::Config(_))));
}

#[test]
fn explicit_missing_path_is_an_io_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(load_or_default(Some(&missing)), Err(EngineError::Io(_))));
}
