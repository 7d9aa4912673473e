//! Meta-tests that verify test suite integrity
//!
//! These tests ensure that:
//! - No tests are ignored
//! - E2E test files exist

use std::process::Command;

/// Verify no tests are ignored in the workspace
///
/// Ignored tests can hide regressions. All tests must run.
#[test]
fn no_ignored_tests() {
    let output = Command::new("cargo")
        .args(["test", "--workspace", "--", "--list", "--ignored"])
        .output()
        .expect("Failed to run cargo test --list --ignored");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let ignored_count = stdout.lines().filter(|l| l.contains(": test")).count();

    assert_eq!(
        ignored_count, 0,
        "Found {} ignored tests - all tests must run.\nIgnored tests:\n{}",
        ignored_count, stdout
    );
}

/// Verify E2E test files exist and are not empty
#[test]
fn e2e_tests_exist() {
    let test_files = [
        "e2e_decoder.rs",
        "e2e_stackmat.rs",
        "e2e_inspection.rs",
        "e2e_statistics.rs",
        "e2e_format.rs",
        "e2e_config.rs",
    ];

    for file in test_files {
        let path = format!("tests/{}", file);
        let full_path = std::path::Path::new(&path);

        assert!(
            full_path.exists(),
            "Missing E2E test file: {}. All E2E tests must be present.",
            file
        );

        let metadata = std::fs::metadata(full_path).expect("Failed to get file metadata");
        assert!(
            metadata.len() > 100,
            "E2E test file {} appears to be empty or too small ({} bytes)",
            file,
            metadata.len()
        );
    }
}
