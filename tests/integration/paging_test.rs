//! Page loading tests.
//!
//! Pages are fetched on demand with bounded retries; only the latest
//! request per statement is applied.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use querydeck::{MockStatement, QueryId, QueryStatus};
use tokio::time::Instant;

use super::common::{page, setup};

const QUERY: QueryId = QueryId(0);

fn paged_statement() -> MockStatement {
    MockStatement::rows(&["n"], page("p0", 50))
        .with_page_count(3)
        .with_page(1, page("p1", 50))
        .with_page(2, page("p2", 20))
}

#[tokio::test(start_paused = true)]
async fn test_load_page_replaces_current_page() {
    let (backend, orchestrator) = setup(vec![paged_statement()]);
    orchestrator
        .execute_query("SELECT n FROM t", "local", None)
        .await
        .unwrap();

    orchestrator.load_page(QUERY, 2).await;

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.current_page_index, 2);
    assert_eq!(tab.current_page_data, Some(page("p2", 20)));
    assert_eq!(backend.fetch_page_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_load_page_retries_until_materialized() {
    let statement = paged_statement().page_ready_after(1, 5);
    let (backend, orchestrator) = setup(vec![statement]);
    orchestrator
        .execute_query("SELECT n FROM t", "local", None)
        .await
        .unwrap();

    let started = Instant::now();
    orchestrator.load_page(QUERY, 1).await;

    assert_eq!(backend.fetch_page_calls(), 6);
    assert!(started.elapsed() >= Duration::from_millis(500));
    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.current_page_index, 1);
    assert_eq!(tab.current_page_data, Some(page("p1", 50)));
}

#[tokio::test(start_paused = true)]
async fn test_page_that_never_materializes_leaves_view_unchanged() {
    let (backend, orchestrator) = setup(vec![paged_statement()]);
    orchestrator
        .execute_query("SELECT n FROM t", "local", None)
        .await
        .unwrap();
    let before = orchestrator.snapshot();

    let started = Instant::now();
    orchestrator.load_page(QUERY, 7).await;

    assert_eq!(backend.fetch_page_calls(), 100);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(9_900));
    assert!(elapsed < Duration::from_secs(10));
    assert_eq!(orchestrator.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn test_latest_page_request_wins() {
    let statement = paged_statement().with_page_delay(1, Duration::from_millis(500));
    let (backend, orchestrator) = setup(vec![statement]);
    orchestrator
        .execute_query("SELECT n FROM t", "local", None)
        .await
        .unwrap();

    let slow = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.load_page(QUERY, 1).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    orchestrator.load_page(QUERY, 2).await;
    slow.await.unwrap();

    // Page 1 arrived last but was requested first
    assert_eq!(backend.fetch_page_calls(), 2);
    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.current_page_index, 2);
    assert_eq!(tab.current_page_data, Some(page("p2", 20)));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_request_stops_retrying() {
    let (backend, orchestrator) = setup(vec![paged_statement()]);
    orchestrator
        .execute_query("SELECT n FROM t", "local", None)
        .await
        .unwrap();

    let started = Instant::now();
    let waiting = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.load_page(QUERY, 9).await })
    };
    tokio::time::sleep(Duration::from_millis(350)).await;

    orchestrator.load_page(QUERY, 1).await;
    waiting.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(backend.fetch_page_calls() < 10);
    assert_eq!(orchestrator.snapshot().tabs[0].current_page_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_page_loaded_before_new_execution_is_discarded() {
    let statement = paged_statement().with_page_delay(1, Duration::from_millis(500));
    let (backend, orchestrator) = setup(vec![statement]);
    orchestrator
        .execute_query("SELECT n FROM t", "local", None)
        .await
        .unwrap();

    let stale = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.load_page(QUERY, 1).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    backend.script(vec![MockStatement::rows(&["m"], page("fresh", 3))]);
    orchestrator
        .execute_query("SELECT m FROM u", "local", None)
        .await
        .unwrap();
    stale.await.unwrap();

    let tab = orchestrator.snapshot().tabs[0].clone();
    assert_eq!(tab.query, "SELECT m FROM u");
    assert_eq!(tab.current_page_index, 0);
    assert_eq!(tab.current_page_data, Some(page("fresh", 3)));
}

#[tokio::test(start_paused = true)]
async fn test_load_page_on_failed_tab_is_ignored() {
    let (backend, orchestrator) = setup(vec![MockStatement::failing("boom")]);
    orchestrator
        .execute_query("SELECT boom()", "local", None)
        .await
        .unwrap();

    orchestrator.load_page(QUERY, 0).await;

    assert_eq!(backend.fetch_page_calls(), 0);
    assert_eq!(orchestrator.snapshot().tabs[0].status, QueryStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_load_page_for_unknown_query_is_ignored() {
    let (backend, orchestrator) = setup(vec![paged_statement()]);
    orchestrator
        .execute_query("SELECT n FROM t", "local", None)
        .await
        .unwrap();
    let before = orchestrator.snapshot();

    orchestrator.load_page(QueryId(42), 1).await;

    assert_eq!(backend.fetch_page_calls(), 0);
    assert_eq!(orchestrator.snapshot(), before);
}
