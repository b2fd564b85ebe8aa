//! Conformance test suite for `CaseStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `CaseStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Create**: id assignment, initial version, timestamps
//! - **Load**: active and pinned-version reads, missing cases
//! - **Versioning**: supersede, in-place update, history ordering, conflicts
//! - **Constraints**: identity uniqueness, identity immutability, field checks
//! - **Concurrency**: racing writers against one store
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use dlc_storage::conformance::run_conformance_suite;
//! use dlc_storage::SqliteCaseStore;
//!
//! #[test]
//! fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| SqliteCaseStore::in_memory().unwrap());
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod constraint;
mod create;
mod load;
mod version;

use std::fmt;

use crate::record::{Case, CaseState};
use crate::CaseStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "create", "version", "constraint").
    pub category: String,
    /// Test name (e.g. "insert_assigns_version_one").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run one check against a fresh store from `factory`.
fn run<S, F>(
    category: &str,
    name: &str,
    factory: &F,
    check: fn(&S) -> Result<(), String>,
) -> TestResult
where
    S: CaseStore,
    F: Fn() -> S,
{
    TestResult::from_result(category, name, check(&factory()))
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub fn run_conformance_suite<S, F>(factory: F) -> ConformanceReport
where
    S: CaseStore + 'static,
    F: Fn() -> S,
{
    let mut results = Vec::new();

    results.extend(create::run_create_tests(&factory));
    results.extend(load::run_load_tests(&factory));
    results.extend(version::run_version_tests(&factory));
    results.extend(constraint::run_constraint_tests(&factory));
    results.extend(concurrent::run_concurrent_tests(&factory));

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn host_case(hostname: &str, device_path: &str) -> Case {
    Case::open().with_host_device(hostname, device_path)
}

/// Insert a case and return it, mapping errors to the suite's `String`.
fn insert<S: CaseStore>(store: &S, case: &Case) -> Result<Case, String> {
    store.insert_case(case).map_err(|e| format!("insert: {e}"))
}

/// Insert a host/device case and move it past `NEW`, so its identity is
/// frozen. Returns the stored version 2.
fn insert_past_new<S: CaseStore>(store: &S, hostname: &str, device: &str) -> Result<Case, String> {
    let mut case = insert(store, &host_case(hostname, device).with_resource(7, "c1"))?;
    case.state = CaseState::NewDetail;
    store
        .supersede_active(&case)
        .map_err(|e| format!("supersede: {e}"))
}

fn case_id(case: &Case) -> Result<i64, String> {
    case.case_id
        .ok_or_else(|| "stored case has no case_id".to_string())
}
