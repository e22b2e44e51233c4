//! End-to-end ingestion tests: real scheduler, in-memory SQLite, mocked HTTP.

use chrono::{Duration as ChronoDuration, Utc};
use gator::feed::{FeedFetcher, FetchError, DEFAULT_USER_AGENT};
use gator::ingest::{IngestError, Scheduler};
use gator::storage::Database;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TWO_ITEMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Boot.dev Blog</title>
    <link>https://blog.boot.dev/</link>
    <description>Recent content</description>
    <item>
      <title>Learn Go &amp;amp; Rust</title>
      <link>https://blog.boot.dev/learn-go</link>
      <pubDate>Sun, 15 Jan 2023 10:00:00 +0000</pubDate>
      <description>A &lt;b&gt;guide&lt;/b&gt;</description>
    </item>
    <item>
      <title>Second</title>
      <link>https://blog.boot.dev/second</link>
      <pubDate>2023-01-16T10:00:00Z</pubDate>
      <description></description>
    </item>
  </channel>
</rss>"#;

const NO_ITEMS: &str = r#"<rss version="2.0"><channel><title>Quiet</title></channel></rss>"#;

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn setup() -> (Database, i64, Scheduler<Database>) {
    let db = Database::open(":memory:").await.unwrap();
    let user = db.create_user("alice").await.unwrap();
    let fetcher = FeedFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap();
    let scheduler = Scheduler::new(db.clone(), fetcher);
    (db, user.id, scheduler)
}

#[tokio::test]
async fn test_never_fetched_feed_goes_first_then_stalest() {
    let server = MockServer::start().await;
    serve(&server, "/f1", TWO_ITEMS).await;
    serve(&server, "/f2", NO_ITEMS).await;

    let (db, user, scheduler) = setup().await;
    let (f2, _) = db
        .create_feed(user, "F2", &format!("{}/f2", server.uri()))
        .await
        .unwrap();
    let (f1, _) = db
        .create_feed(user, "F1", &format!("{}/f1", server.uri()))
        .await
        .unwrap();
    let an_hour_ago = Utc::now() - ChronoDuration::hours(1);
    db.mark_feed_fetched(f2.id, an_hour_ago).await.unwrap();

    let before = Utc::now().timestamp();
    let report = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.feed_id, f1.id);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.http_status, 200);
    assert_eq!(report.channel_title, "Boot.dev Blog");

    let f1_now = db.get_feed_by_url(&f1.url).await.unwrap().unwrap();
    assert!(f1_now.last_fetched_at.unwrap().timestamp() >= before);

    let posts = db.get_posts_for_feed(f1.id).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].title, "Learn Go & Rust");
    assert_eq!(posts[0].description.as_deref(), Some("A <b>guide</b>"));
    assert_eq!(posts[0].published_at.to_rfc3339(), "2023-01-15T10:00:00+00:00");
    assert_eq!(posts[1].description, None);

    let second = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(second.feed_id, f2.id);
    assert_eq!(second.inserted, 0);
}

#[tokio::test]
async fn test_malformed_body_still_marks_feed_fetched() {
    let server = MockServer::start().await;
    serve(&server, "/broken", "<rss><channel><title>oops</channel>").await;

    let (db, user, scheduler) = setup().await;
    let (feed, _) = db
        .create_feed(user, "Broken", &format!("{}/broken", server.uri()))
        .await
        .unwrap();

    let err = scheduler
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(
        matches!(err, IngestError::Fetch(FetchError::Malformed(_))),
        "got {:?}",
        err
    );

    let stored = db.get_feed_by_url(&feed.url).await.unwrap().unwrap();
    assert!(stored.last_fetched_at.is_some());
    assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_items_is_not_an_error() {
    let server = MockServer::start().await;
    serve(&server, "/quiet", NO_ITEMS).await;

    let (db, user, scheduler) = setup().await;
    let (feed, _) = db
        .create_feed(user, "Quiet", &format!("{}/quiet", server.uri()))
        .await
        .unwrap();

    let report = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!((report.inserted, report.duplicates), (0, 0));
    assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reingesting_same_document_inserts_nothing() {
    let server = MockServer::start().await;
    serve(&server, "/feed", TWO_ITEMS).await;

    let (db, user, scheduler) = setup().await;
    let url = format!("{}/feed", server.uri());
    let (feed, _) = db.create_feed(user, "Feed", &url).await.unwrap();
    let cancel = CancellationToken::new();

    let first = scheduler.scrape_feed_by_url(&url, &cancel).await.unwrap();
    let second = scheduler.scrape_feed_by_url(&url, &cancel).await.unwrap();

    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_marking_one_feed_leaves_others_untouched() {
    let server = MockServer::start().await;
    serve(&server, "/a", TWO_ITEMS).await;

    let (db, user, scheduler) = setup().await;
    let (a, _) = db
        .create_feed(user, "A", &format!("{}/a", server.uri()))
        .await
        .unwrap();
    let (b, _) = db
        .create_feed(user, "B", &format!("{}/b", server.uri()))
        .await
        .unwrap();

    scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    let a_now = db.get_feed_by_url(&a.url).await.unwrap().unwrap();
    let b_now = db.get_feed_by_url(&b.url).await.unwrap().unwrap();
    assert!(a_now.last_fetched_at.is_some());
    assert_eq!(b_now, b);
    assert!(db.get_posts_for_feed(b.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_selection_order_is_non_decreasing() {
    let server = MockServer::start().await;
    for route in ["/1", "/2", "/3"] {
        serve(&server, route, NO_ITEMS).await;
    }

    let (db, user, scheduler) = setup().await;
    let now = Utc::now();
    let mut ids = Vec::new();
    for (i, route) in ["/1", "/2", "/3"].iter().enumerate() {
        let (feed, _) = db
            .create_feed(user, route, &format!("{}{}", server.uri(), route))
            .await
            .unwrap();
        if i > 0 {
            db.mark_feed_fetched(feed.id, now - ChronoDuration::minutes(i as i64))
                .await
                .unwrap();
        }
        ids.push(feed.id);
    }

    let mut served = Vec::new();
    for _ in 0..3 {
        served.push(scheduler.run_cycle(&CancellationToken::new()).await.unwrap().feed_id);
    }
    // Never fetched, then 2 minutes ago, then 1 minute ago
    assert_eq!(served, vec![ids[0], ids[2], ids[1]]);
}

#[tokio::test]
async fn test_loop_retries_malformed_feed_on_later_ticks() {
    let server = MockServer::start().await;
    serve(&server, "/broken", "<rss><channel><title>oops</channel>").await;

    let (db, user, scheduler) = setup().await;
    let (feed, _) = db
        .create_feed(user, "Broken", &format!("{}/broken", server.uri()))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        scheduler.run(Duration::from_millis(30), &cancel),
    )
    .await
    .expect("cancellation should end the loop");
    assert!(result.is_ok());

    // Each request follows a select + mark of the same feed
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.len() >= 2, "fetched {} time(s)", requests.len());

    let stored = db.get_feed_by_url(&feed.url).await.unwrap().unwrap();
    assert!(stored.last_fetched_at.is_some());
    assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_loop_during_slow_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(TWO_ITEMS)
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let (db, user, scheduler) = setup().await;
    let (feed, _) = db.create_feed(user, "Slow", &server.uri()).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        scheduler.run(Duration::from_secs(60), &cancel),
    )
    .await
    .expect("cancellation should end the loop promptly");

    assert!(result.is_ok());
    assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
}
