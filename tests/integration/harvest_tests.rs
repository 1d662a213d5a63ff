//! End-to-end batches: bootstrap, fetch, parse, persist and resume

use crate::common::{
    calendar_body, requests_to, reviews_body, room_page, search_body, test_config, VariablesContain,
    API_KEY, CALENDAR_PATH, REVIEWS_PATH, SEARCH_PATH,
};
use serde_json::Value;
use stay_harvest::config::Config;
use stay_harvest::session::Credentials;
use stay_harvest::storage::{open_storage, RunStatus, Storage, TargetKind, TargetStatus};
use stay_harvest::{CityTarget, Dataset, HarvestError, Harvester};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Serves a room page for any `/rooms/<id>` path
async fn mount_room_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/rooms/\d+$"))
        .respond_with(|req: &Request| {
            let id = req
                .url
                .path()
                .trim_start_matches("/rooms/")
                .parse()
                .unwrap_or(0);
            ResponseTemplate::new(200).set_body_string(room_page(id))
        })
        .mount(server)
        .await;
}

fn harvester(config: Config, cancel: CancellationToken) -> Arc<Harvester> {
    let storage = open_storage(Path::new(&config.output.index_path)).unwrap();
    let harvester = Harvester::new(config, cancel)
        .unwrap()
        .with_index(storage, "test-config-hash")
        .unwrap();
    Arc::new(harvester)
}

fn index_of(dir: &TempDir) -> stay_harvest::storage::SqliteStorage {
    open_storage(&dir.path().join("index.db")).unwrap()
}

fn variables(req: &Request) -> Value {
    req.url
        .query_pairs()
        .find(|(name, _)| name == "variables")
        .and_then(|(_, value)| serde_json::from_str(&value).ok())
        .unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_room_pages(&server).await;

    // A: healthy
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .and(VariablesContain::listing(101))
        .and(header("X-Airbnb-Api-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(calendar_body()))
        .expect(1)
        .mount(&server)
        .await;
    // B: rate limited twice, then healthy
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .and(VariablesContain::listing(202))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .and(VariablesContain::listing(202))
        .respond_with(ResponseTemplate::new(200).set_body_json(calendar_body()))
        .mount(&server)
        .await;
    // C: always broken
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .and(VariablesContain::listing(303))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&server)
        .await;

    let h = harvester(test_config(&server.uri(), dir.path(), ""), CancellationToken::new());
    let report = h.run_rooms(&[101, 202, 303], &[Dataset::Calendar]).await;
    h.finish(RunStatus::Completed).await.unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);

    let a = report.get("room-101").unwrap();
    assert_eq!(a.attempts, Some(2));

    let b = report.get("room-202").unwrap();
    assert_eq!(b.attempts, Some(4));
    // Two backoffs: 40ms and 80ms, each plus under 10ms of jitter.
    assert!(b.elapsed >= Duration::from_millis(120), "{:?}", b.elapsed);
    assert!(b.elapsed < Duration::from_millis(140 + 360), "{:?}", b.elapsed);

    let c = report.get("room-303").unwrap();
    assert_eq!(c.attempts, Some(5));
    assert_eq!(c.last_status, Some(500));
    assert!(c.error.as_deref().unwrap().contains("calendar"));

    let output = h.output();
    assert!(output.artifact_path(TargetKind::Calendar, "101").is_file());
    assert!(output.artifact_path(TargetKind::Calendar, "202").is_file());
    assert!(!output.artifact_path(TargetKind::Calendar, "303").exists());

    let csv = std::fs::read_to_string(output.artifact_path(TargetKind::Calendar, "101")).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("date,available,min_nights"));
    assert!(lines.next().unwrap().starts_with("2027-01-01,true,2,30"));

    let index = index_of(&dir);
    let failed = index.get_target(TargetKind::Calendar, "303").unwrap().unwrap();
    assert_eq!(failed.status, TargetStatus::Failed);
    assert_eq!(failed.attempts, Some(5));
    assert_eq!(failed.last_status, Some(500));
    assert!(index.is_completed(TargetKind::Calendar, "202").unwrap());
    assert_eq!(index.get_latest_run().unwrap().unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn test_second_run_skips_completed_rooms() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_room_pages(&server).await;
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(calendar_body()))
        .mount(&server)
        .await;

    let datasets = [Dataset::Details, Dataset::Calendar];

    let first = harvester(test_config(&server.uri(), dir.path(), ""), CancellationToken::new());
    let report = first.run_rooms(&[11, 12], &datasets).await;
    assert_eq!(report.succeeded(), 2);
    first.finish(RunStatus::Completed).await.unwrap();

    // Details reuse the bootstrap page: one page load per room.
    assert_eq!(requests_to(&server, "/rooms/11").await, 1);
    let details: Value = serde_json::from_slice(
        &std::fs::read(first.output().artifact_path(TargetKind::Details, "11")).unwrap(),
    )
    .unwrap();
    assert_eq!(details["title"], "Room 11");
    drop(first);

    let seen = server.received_requests().await.unwrap().len();

    let second = harvester(test_config(&server.uri(), dir.path(), ""), CancellationToken::new());
    let report = second.run_rooms(&[11, 12, 11], &datasets).await;

    assert_eq!(report.total(), 2);
    assert_eq!(report.skipped(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), seen);
}

#[tokio::test]
async fn test_missing_artifact_is_fetched_again() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_room_pages(&server).await;
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(calendar_body()))
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), dir.path(), "");
    let first = harvester(config.clone(), CancellationToken::new());
    first.run_rooms(&[21, 22], &[Dataset::Calendar]).await;
    std::fs::remove_file(first.output().artifact_path(TargetKind::Calendar, "22")).unwrap();
    drop(first);

    let second = harvester(config, CancellationToken::new());
    let report = second.run_rooms(&[21, 22], &[Dataset::Calendar]).await;

    assert_eq!(report.skipped(), 1);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.get("room-22").unwrap().outcome, stay_harvest::JobOutcome::Succeeded);
    assert!(second.output().artifact_path(TargetKind::Calendar, "22").is_file());
}

#[tokio::test]
async fn test_fresh_run_ignores_index() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_room_pages(&server).await;
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(calendar_body()))
        .expect(2)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), dir.path(), "");
    harvester(config.clone(), CancellationToken::new())
        .run_rooms(&[31], &[Dataset::Calendar])
        .await;

    let storage = open_storage(Path::new(&config.output.index_path)).unwrap();
    let fresh = Harvester::new(config, CancellationToken::new())
        .unwrap()
        .with_index(storage, "test-config-hash")
        .unwrap()
        .fresh(true);
    let report = Arc::new(fresh).run_rooms(&[31], &[Dataset::Calendar]).await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.skipped(), 0);
}

#[tokio::test]
async fn test_reviews_stop_at_page_limit() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path(REVIEWS_PATH))
        .and(header("X-Airbnb-Api-Key", API_KEY))
        .respond_with(|req: &Request| {
            let offset = variables(req)["pdpReviewsRequest"]["offset"]
                .as_str()
                .and_then(|o| o.parse().ok())
                .unwrap_or(0);
            ResponseTemplate::new(200).set_body_json(reviews_body(offset, 2))
        })
        .mount(&server)
        .await;

    let h = Harvester::new(test_config(&server.uri(), dir.path(), ""), CancellationToken::new()).unwrap();
    let reviews = h.all_reviews(5, &Credentials::fallback(API_KEY)).await.unwrap();

    // Every page claims more; three pages is the configured ceiling.
    assert_eq!(requests_to(&server, REVIEWS_PATH).await, 3);
    assert_eq!(reviews.attempts, 3);
    let ids: Vec<_> = reviews.value.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5"]);
}

/// The second review page (offset 2) fails `times` times before recovering
async fn mount_reviews_failing_at_second_page(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path(REVIEWS_PATH))
        .and(VariablesContain("\"offset\":\"2\"".to_string()))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(times)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(REVIEWS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(reviews_body(0, 2)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_reviews_fail_when_later_page_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_reviews_failing_at_second_page(&server, u64::MAX).await;

    let h = Harvester::new(test_config(&server.uri(), dir.path(), ""), CancellationToken::new()).unwrap();
    let err = h.all_reviews(5, &Credentials::fallback(API_KEY)).await.unwrap_err();

    assert!(matches!(err, HarvestError::Incomplete { pages: 1, .. }), "{err}");
    assert!(!err.is_cancelled());
    // One attempt for the first page, five for the page that never recovered.
    assert_eq!(err.attempts(), Some(6));
    assert_eq!(err.last_status(), Some(500));
    assert_eq!(requests_to(&server, REVIEWS_PATH).await, 6);
}

#[tokio::test]
async fn test_incomplete_reviews_are_retried_on_next_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_room_pages(&server).await;
    mount_reviews_failing_at_second_page(&server, 5).await;

    let config = test_config(&server.uri(), dir.path(), "");
    let first = harvester(config.clone(), CancellationToken::new());
    let report = first.run_rooms(&[7], &[Dataset::Reviews]).await;
    first.finish(RunStatus::Completed).await.unwrap();

    assert_eq!(report.failed(), 1);
    assert!(!first.output().artifact_path(TargetKind::Reviews, "7").exists());
    drop(first);

    let row = index_of(&dir).get_target(TargetKind::Reviews, "7").unwrap().unwrap();
    assert_eq!(row.status, TargetStatus::Failed);
    assert_eq!(row.attempts, Some(6));
    assert_eq!(row.last_status, Some(500));
    assert!(row.artifact_path.is_none());

    let second = harvester(config, CancellationToken::new());
    let report = second.run_rooms(&[7], &[Dataset::Reviews]).await;

    assert_eq!(report.skipped(), 0);
    assert_eq!(report.succeeded(), 1);
    assert!(second.output().artifact_path(TargetKind::Reviews, "7").is_file());

    let row = index_of(&dir).get_target(TargetKind::Reviews, "7").unwrap().unwrap();
    assert_eq!(row.status, TargetStatus::Completed);
    assert_eq!(row.attempts, Some(3));
}

#[tokio::test]
async fn test_city_search_follows_cursor_and_dedupes() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(room_page(0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(VariablesContain::cursor("c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[2, 3], None)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(header("X-Airbnb-Api-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[1, 2], Some("c1"))))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri(), dir.path(), "");
    config.pagination.search_page_size = 10;

    let h = harvester(config.clone(), CancellationToken::new());
    let batch = h.run_cities(vec![CityTarget::named("Lisbon")]).await;

    assert_eq!(batch.report.succeeded(), 1);
    assert_eq!(batch.room_ids, vec![1, 2, 3]);

    let artifact = h.output().artifact_path(TargetKind::City, "Lisbon");
    let saved: Vec<Value> = serde_json::from_slice(&std::fs::read(&artifact).unwrap()).unwrap();
    let ids: Vec<_> = saved.iter().map(|l| l["room_id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    drop(h);

    // A resumed run skips the search but still reports what it found.
    let again = harvester(config, CancellationToken::new());
    let batch = again.run_cities(vec![CityTarget::named("Lisbon")]).await;
    assert_eq!(batch.report.skipped(), 1);
    assert_eq!(batch.room_ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_fallback_key_used_when_room_page_blocked() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path_regex(r"^/rooms/\d+$"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CALENDAR_PATH))
        .and(header("X-Airbnb-Api-Key", "static-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(calendar_body()))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), dir.path(), r#"fallback-api-key = "static-key""#);
    let h = harvester(config, CancellationToken::new());
    let report = h.run_rooms(&[41], &[Dataset::Calendar]).await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(requests_to(&server, "/rooms/41").await, 1);
}

#[tokio::test]
async fn test_blocked_room_page_without_fallback_fails_job() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path_regex(r"^/rooms/\d+$"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let h = harvester(test_config(&server.uri(), dir.path(), ""), CancellationToken::new());
    let report = h.run_rooms(&[51], &[Dataset::Calendar, Dataset::Reviews]).await;

    let job = report.get("room-51").unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(job.attempts, Some(1));
    assert_eq!(job.last_status, Some(403));
    assert_eq!(requests_to(&server, CALENDAR_PATH).await, 0);

    let index = index_of(&dir);
    let failed = index.get_targets_by_status(TargetStatus::Failed).unwrap();
    assert_eq!(failed.len(), 2);
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_room_pages(&server).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let h = harvester(test_config(&server.uri(), dir.path(), ""), cancel);
    let report = h.run_rooms(&[61, 62], &Dataset::ALL).await;
    let closed = h.finish(RunStatus::Interrupted).await.unwrap().unwrap();
    assert_eq!(closed.status, RunStatus::Interrupted);

    assert_eq!(report.cancelled(), 2);
    assert!(report.was_cancelled());
    assert!(server.received_requests().await.unwrap().is_empty());

    let run = index_of(&dir).get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
    assert!(run.finished_at.is_some());
}
