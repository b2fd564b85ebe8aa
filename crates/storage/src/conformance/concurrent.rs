use std::sync::{Arc, Barrier};
use std::thread;

use super::{case_id, host_case, TestResult};
use crate::record::{Case, CaseState, IdentityConstraint};
use crate::{CaseStore, StorageError};

/// Number of concurrent writers to spawn in each test.
const N: usize = 8;

pub(super) fn run_concurrent_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: CaseStore + 'static,
    F: Fn() -> S,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_supersedes_exactly_one_wins",
            concurrent_supersedes_exactly_one_wins(factory()),
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_creates_exactly_one_wins",
            concurrent_creates_exactly_one_wins(factory()),
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_writes_different_cases_all_succeed",
            concurrent_writes_different_cases_all_succeed(factory()),
        ),
    ]
}

/// Spawn `N` threads that start together and each run `work(i)`.
fn race<S, T>(
    store: Arc<S>,
    work: impl Fn(&S, usize) -> T + Send + Sync + 'static,
) -> Result<Vec<T>, String>
where
    S: CaseStore + 'static,
    T: Send + 'static,
{
    let barrier = Arc::new(Barrier::new(N));
    let work = Arc::new(work);
    let handles: Vec<_> = (0..N)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let work = Arc::clone(&work);
            thread::spawn(move || {
                barrier.wait();
                work(&store, i)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().map_err(|_| "writer thread panicked".to_string()))
        .collect()
}

// ── Same version, many writers ───────────────────────────────────────────────

/// N writers all read version 1 before any of them writes. Exactly one
/// supersede succeeds; the rest must get PersistenceConflict.
fn concurrent_supersedes_exactly_one_wins<S>(store: S) -> Result<(), String>
where
    S: CaseStore + 'static,
{
    let store = Arc::new(store);
    let base = store
        .insert_case(&host_case("node1", "sdb"))
        .map_err(|e| format!("insert: {e}"))?;
    let id = case_id(&base)?;

    let outcomes = race(Arc::clone(&store), move |s, _| {
        let mut next = base.clone();
        next.state = CaseState::NewDetail;
        s.supersede_active(&next)
    })?;

    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(StorageError::PersistenceConflict { .. })))
        .count();
    if wins != 1 || conflicts != N - 1 {
        return Err(format!(
            "expected 1 win and {} conflicts, got {wins} wins and {conflicts} conflicts",
            N - 1
        ));
    }

    let active = store.load_active(id).map_err(|e| e.to_string())?;
    let history = store.history(id).map_err(|e| e.to_string())?;
    if active.version_number != 2 || history.len() != 1 {
        return Err(format!(
            "expected v2 with 1 history row, got v{} with {}",
            active.version_number,
            history.len()
        ));
    }
    Ok(())
}

/// N writers race to open a case for the same device. Exactly one insert
/// succeeds; the rest must get DuplicateActiveCase.
fn concurrent_creates_exactly_one_wins<S>(store: S) -> Result<(), String>
where
    S: CaseStore + 'static,
{
    let store = Arc::new(store);
    let outcomes = race(Arc::clone(&store), |s, _| {
        s.insert_case(&host_case("node1", "sdb"))
    })?;

    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let duplicates = outcomes
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(StorageError::DuplicateActiveCase {
                    constraint: IdentityConstraint::HostDevice,
                    ..
                })
            )
        })
        .count();
    if wins != 1 || duplicates != N - 1 {
        return Err(format!(
            "expected 1 win and {} duplicates, got {wins} wins and {duplicates} duplicates",
            N - 1
        ));
    }
    let active = store.list_active(None).map_err(|e| e.to_string())?;
    if active.len() != 1 {
        return Err(format!("expected 1 active case, got {}", active.len()));
    }
    Ok(())
}

// ── Independent cases ────────────────────────────────────────────────────────

fn concurrent_writes_different_cases_all_succeed<S>(store: S) -> Result<(), String>
where
    S: CaseStore + 'static,
{
    let store = Arc::new(store);
    let outcomes = race(Arc::clone(&store), |s, i| -> Result<Case, StorageError> {
        let case = s.insert_case(&host_case("node1", &format!("sd{i}")))?;
        s.supersede_active(&case)
    })?;

    if let Some(Err(e)) = outcomes.iter().find(|r| r.is_err()) {
        return Err(format!("independent write failed: {e}"));
    }
    let active = store.list_active(None).map_err(|e| e.to_string())?;
    if active.len() != N || active.iter().any(|c| c.version_number != 2) {
        return Err(format!(
            "expected {N} cases at version 2, got {:?}",
            active
                .iter()
                .map(|c| (c.case_id, c.version_number))
                .collect::<Vec<_>>()
        ));
    }
    Ok(())
}
