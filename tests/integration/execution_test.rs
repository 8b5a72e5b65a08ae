//! Batch execution tests.
//!
//! Tests tab creation, initial snapshots and completion reporting.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use querydeck::orchestrator::{MISSING_COLUMNS_MESSAGE, SNAPSHOT_TIMEOUT_MESSAGE};
use querydeck::{
    MockBackend, MockStatement, OrchestratorSettings, QueryId, QueryOrchestrator, QueryStatus,
    TabId,
};
use tokio_test::{assert_pending, assert_ready};

use super::common::{page, setup, setup_with, Completions};

#[tokio::test(start_paused = true)]
async fn test_each_statement_gets_a_tab_and_last_is_active() {
    let backend = Arc::new(MockBackend::new());
    let orchestrator = QueryOrchestrator::new(Arc::clone(&backend), Default::default()).unwrap();
    let completions = Completions::default();

    orchestrator
        .execute_query("SELECT 1; SELECT 2", "local", completions.callback())
        .await
        .unwrap();

    let view = orchestrator.snapshot();
    assert_eq!(view.tabs.len(), 2);
    assert_eq!(view.tabs[0].id, TabId(1));
    assert_eq!(view.tabs[1].id, TabId(2));
    assert_eq!(view.tabs[0].query_id, QueryId(0));
    assert_eq!(view.tabs[1].query_id, QueryId(1));
    assert_eq!(view.active_tab, Some(TabId(2)));

    for tab in &view.tabs {
        assert_eq!(tab.status, QueryStatus::Completed);
        assert_eq!(tab.query_returns_results, Some(true));
        assert_eq!(tab.columns, Some(vec!["result".to_string()]));
        assert_eq!(tab.total_pages, Some(1));
        assert_eq!(tab.current_page_index, 0);
        assert!(tab.current_page_data.is_some());
    }

    // One page of 50 rows per statement
    assert_eq!(completions.values(), vec![50, 50]);
}

#[tokio::test(start_paused = true)]
async fn test_batch_text_is_trimmed_and_routed_to_connection() {
    let (backend, orchestrator) = setup(vec![MockStatement::affected(1)]);

    orchestrator
        .execute_query("  UPDATE t SET a = 1\n", "analytics", None)
        .await
        .unwrap();

    assert_eq!(backend.last_connection().as_deref(), Some("analytics"));
    assert_eq!(
        backend.last_submitted_text().as_deref(),
        Some("UPDATE t SET a = 1")
    );
    assert_eq!(orchestrator.snapshot().tabs[0].query, "UPDATE t SET a = 1");
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_yields_single_error_tab() {
    let (backend, orchestrator) = setup(vec![]);
    backend.fail_next_submit("syntax error at or near \"SELEC\"");
    let completions = Completions::default();

    let result = orchestrator
        .execute_query("SELEC 1", "local", completions.callback())
        .await;
    assert!(result.is_ok());

    let view = orchestrator.snapshot();
    assert_eq!(view.tabs.len(), 1);
    let tab = &view.tabs[0];
    assert_eq!(tab.query_id, QueryId(-1));
    assert!(tab.query_id.is_sentinel());
    assert_eq!(tab.status, QueryStatus::Error);
    assert_eq!(
        tab.error.as_deref(),
        Some("syntax error at or near \"SELEC\"")
    );
    assert_eq!(view.active_tab, Some(tab.id));
    assert!(completions.values().is_empty());
    assert_eq!(backend.snapshot_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_batch_is_a_submission_error() {
    let backend = Arc::new(MockBackend::new());
    let orchestrator = QueryOrchestrator::new(Arc::clone(&backend), Default::default()).unwrap();

    orchestrator
        .execute_query("   ;  ", "local", None)
        .await
        .unwrap();

    let view = orchestrator.snapshot();
    assert_eq!(view.tabs.len(), 1);
    assert_eq!(view.tabs[0].query_id, QueryId::SUBMISSION_FAILED);
    assert_eq!(
        view.tabs[0].error.as_deref(),
        Some("no statements to execute")
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_tabular_statement_reports_affected_rows() {
    let (_backend, orchestrator) = setup(vec![MockStatement::affected(12)]);
    let completions = Completions::default();

    orchestrator
        .execute_query("DELETE FROM t", "local", completions.callback())
        .await
        .unwrap();

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.status, QueryStatus::Completed);
    assert_eq!(tab.query_returns_results, Some(false));
    assert_eq!(tab.affected_rows, Some(12));
    assert_eq!(tab.columns, None);
    assert_eq!(completions.values(), vec![12]);
    assert!(!orchestrator.is_polling(QueryId(0)));
}

#[tokio::test(start_paused = true)]
async fn test_completed_tabular_statement_reports_page_count_times_page_size() {
    let statement = MockStatement::rows(&["id", "name"], page("row", 50)).with_page_count(3);
    let (backend, orchestrator) = setup(vec![statement]);
    let completions = Completions::default();

    orchestrator
        .execute_query("SELECT id, name FROM users", "local", completions.callback())
        .await
        .unwrap();

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(
        tab.columns,
        Some(vec!["id".to_string(), "name".to_string()])
    );
    assert_eq!(tab.total_pages, Some(3));
    assert_eq!(tab.current_page_data, Some(page("row", 50)));
    assert_eq!(completions.values(), vec![150]);
    assert_eq!(backend.page_count_calls(), 1);
    assert_eq!(orchestrator.active_pollers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_page_count_failure_still_completes_with_zero() {
    let statement = MockStatement::rows(&["n"], page("n", 1)).failing_page_count("lost");
    let (_backend, orchestrator) = setup(vec![statement]);
    let completions = Completions::default();

    orchestrator
        .execute_query("SELECT n", "local", completions.callback())
        .await
        .unwrap();

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.status, QueryStatus::Completed);
    assert_eq!(tab.total_pages, None);
    assert_eq!(completions.values(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_statement_never_completes() {
    let (_backend, orchestrator) = setup(vec![
        MockStatement::failing("relation \"missing\" does not exist"),
        MockStatement::affected(2),
    ]);
    let completions = Completions::default();

    orchestrator
        .execute_query(
            "SELECT * FROM missing; DELETE FROM t",
            "local",
            completions.callback(),
        )
        .await
        .unwrap();

    let view = orchestrator.snapshot();
    assert_eq!(view.tabs[0].status, QueryStatus::Error);
    assert_eq!(
        view.tabs[0].error.as_deref(),
        Some("relation \"missing\" does not exist")
    );
    // The failure stays local to its tab
    assert_eq!(view.tabs[1].status, QueryStatus::Completed);
    assert_eq!(completions.values(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_columns_is_terminal() {
    let (_backend, orchestrator) = setup(vec![MockStatement::without_columns().running()]);
    let completions = Completions::default();

    orchestrator
        .execute_query("SELECT weird()", "local", completions.callback())
        .await
        .unwrap();

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.status, QueryStatus::Error);
    assert_eq!(tab.error.as_deref(), Some(MISSING_COLUMNS_MESSAGE));
    assert_eq!(orchestrator.active_pollers(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(completions.values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_newer_execution_discards_stale_snapshot() {
    let slow = MockStatement::rows(&["a"], page("stale", 1))
        .with_snapshot_delay(Duration::from_secs(1));
    let (backend, orchestrator) = setup(vec![slow]);
    let stale_completions = Completions::default();
    let completions = Completions::default();

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        let callback = stale_completions.callback();
        tokio::spawn(async move {
            orchestrator
                .execute_query("SELECT a FROM slow", "local", callback)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(orchestrator.snapshot().tabs.len(), 1);

    backend.script(vec![MockStatement::affected(7)]);
    let second = orchestrator
        .execute_query("UPDATE b SET x = 1", "local", completions.callback())
        .await
        .unwrap();

    let first = first.await.unwrap().unwrap();
    assert!(first < second);
    assert_eq!(orchestrator.generation(), second);

    let view = orchestrator.snapshot();
    assert_eq!(view.generation, second);
    assert_eq!(view.tabs.len(), 1);
    assert_eq!(view.tabs[0].query, "UPDATE b SET x = 1");
    assert_eq!(view.tabs[0].affected_rows, Some(7));
    assert_eq!(view.tabs[0].current_page_data, None);
    assert_eq!(completions.values(), vec![7]);
    assert!(stale_completions.values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_execute_waits_for_snapshot_rendezvous() {
    let slow = MockStatement::affected(3).with_snapshot_delay(Duration::from_secs(2));
    let (_backend, orchestrator) = setup(vec![slow]);

    let mut execution = tokio_test::task::spawn(orchestrator.execute_query("UPDATE t", "local", None));
    assert_pending!(execution.poll());

    // The tab is visible while its snapshot is outstanding
    let view = orchestrator.snapshot();
    assert_eq!(view.tabs.len(), 1);
    assert_eq!(view.tabs[0].status, QueryStatus::Running);
    assert_eq!(view.tabs[0].affected_rows, None);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(execution.is_woken());
    let generation = assert_ready!(execution.poll()).unwrap();
    drop(execution);

    assert_eq!(orchestrator.generation(), generation);
    assert_eq!(orchestrator.snapshot().tabs[0].affected_rows, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_timeout_marks_tab_failed() {
    let settings = OrchestratorSettings {
        snapshot_timeout_ms: Some(1_000),
        ..Default::default()
    };
    let slow = MockStatement::affected(1).with_snapshot_delay(Duration::from_secs(30));
    let (_backend, orchestrator) = setup_with(vec![slow], settings);
    let completions = Completions::default();

    orchestrator
        .execute_query("UPDATE t", "local", completions.callback())
        .await
        .unwrap();

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.status, QueryStatus::Error);
    assert_eq!(tab.error.as_deref(), Some(SNAPSHOT_TIMEOUT_MESSAGE));
    assert!(completions.values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_long_query_title_is_truncated() {
    let query = format!("SELECT * FROM {}", "x".repeat(46));
    assert_eq!(query.len(), 60);
    let (_backend, orchestrator) = setup(vec![MockStatement::affected(0)]);

    orchestrator.execute_query(&query, "local", None).await.unwrap();

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.query, query);
    assert_eq!(tab.name.chars().count(), 30);
    assert!(tab.name.ends_with("..."));
}

#[tokio::test(start_paused = true)]
async fn test_huge_page_count_saturates_row_total() {
    let statement = MockStatement::rows(&["n"], page("n", 1)).with_page_count(u64::MAX);
    let (_backend, orchestrator) = setup(vec![statement]);
    let completions = Completions::default();

    orchestrator
        .execute_query("SELECT n FROM endless", "local", completions.callback())
        .await
        .unwrap();

    assert_eq!(orchestrator.snapshot().tabs[0].total_pages, Some(u64::MAX));
    assert_eq!(completions.values(), vec![u64::MAX]);
}
