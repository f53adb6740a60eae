use std::path::Path;

use weft::test_runner::{TestCase, TestResult, TestRunner};

#[test]
fn test_fixtures_pass() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let runner = TestRunner::new(&dir, false);
    let files = runner.discover_tests().unwrap();
    assert!(!files.is_empty());

    let mut failures = Vec::new();
    for file in &files {
        let content = std::fs::read_to_string(file).unwrap();
        let test = TestCase::parse(&content, &file.to_string_lossy()).unwrap();
        match test.run() {
            TestResult::Pass | TestResult::Skipped(_) => {}
            TestResult::Fail { expected, actual } => failures.push(format!(
                "{}: expected {:?}, got {:?}",
                file.display(),
                expected,
                actual
            )),
            TestResult::Error(error) => failures.push(format!("{}: {}", file.display(), error)),
        }
    }
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn test_summary_counts_every_fixture() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/errors");
    let summary = TestRunner::new(&dir, false).run_all().unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.passed, 4);
}
