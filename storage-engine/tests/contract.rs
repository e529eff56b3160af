//! Behaviour every local backend shares.

use cachify::{
    CacheBackend, CacheKey, FixedMetrics, MetricsProbe, PageMetrics, PrintOutcome,
    RequestIdentity, StoreOutcome,
};
use shared::TtlSecs;
use std::sync::Arc;
use storage_engine::{DbBackend, HddBackend, MemoryBackend};

fn probe() -> Arc<dyn MetricsProbe> {
    Arc::new(FixedMetrics(PageMetrics {
        queries: 5,
        timer: 0.02,
        memory: "1MB".into(),
    }))
}

fn backends(dir: &tempfile::TempDir) -> Vec<Box<dyn CacheBackend>> {
    vec![
        Box::new(MemoryBackend::new(1024 * 1024, probe())),
        Box::new(DbBackend::open(dir.path().join("db.sled"), probe()).unwrap()),
        Box::new(HddBackend::new(dir.path().join("pages"), probe())),
    ]
}

fn key(uri: &str) -> CacheKey {
    CacheKey::for_request(RequestIdentity::new("example.com", uri))
}

#[tokio::test]
async fn stored_payload_is_returned_intact() {
    let dir = tempfile::tempdir().unwrap();
    let payload = "<!doctype html>\n<html><body>Grüße ✓</body></html>";

    for backend in backends(&dir) {
        let key = key("/payload/");
        let outcome = backend.store_item(&key, payload, TtlSecs(600), false).await;
        assert_eq!(outcome, StoreOutcome::Stored, "{}", backend.stringify_method());

        let page = backend.get_item(&key).await.unwrap();
        assert!(
            page.data().starts_with(payload),
            "{} lost the payload",
            backend.stringify_method()
        );
        if page.meta().is_some() {
            assert_eq!(page.data(), payload);
        }
    }
}

#[tokio::test]
async fn empty_store_leaves_entry_unchanged() {
    let dir = tempfile::tempdir().unwrap();

    for backend in backends(&dir) {
        let key = key("/keep/");
        assert_eq!(
            backend.store_item(&key, "", TtlSecs(600), false).await,
            StoreOutcome::SkippedEmpty
        );
        assert!(backend.get_item(&key).await.is_none());

        backend.store_item(&key, "<p>v1</p>", TtlSecs(600), false).await;
        let before = backend.get_item(&key).await;
        backend.store_item(&key, "", TtlSecs(600), false).await;
        assert_eq!(backend.get_item(&key).await, before);
    }
}

#[tokio::test]
async fn absent_entries_do_not_terminate_the_request() {
    let dir = tempfile::tempdir().unwrap();

    for backend in backends(&dir) {
        let key = key("/never/");
        let entry = backend.get_item(&key).await;
        assert!(entry.is_none());

        let mut out = Vec::new();
        let outcome = backend
            .print_cache(true, entry.as_ref(), &mut out)
            .await
            .unwrap();
        assert_eq!(outcome, PrintOutcome::PassThrough);
        assert!(out.is_empty());

        backend.store_item(&key, "<p>x</p>", TtlSecs(600), false).await;
        backend.delete_item(&key, None).await;
        assert!(backend.get_item(&key).await.is_none());
    }
}

#[tokio::test]
async fn clear_removes_every_entry() {
    let dir = tempfile::tempdir().unwrap();

    for backend in backends(&dir) {
        let keys = [key("/one/"), key("/two/"), key("/three/")];
        for key in &keys {
            backend.store_item(key, "<p>page</p>", TtlSecs(600), false).await;
        }
        assert!(backend.get_stats().await.is_some());

        backend.clear_cache().await;

        for key in &keys {
            assert!(backend.get_item(key).await.is_none());
        }
        assert_eq!(
            backend.get_stats().await,
            None,
            "{} reports size for an empty cache",
            backend.stringify_method()
        );
    }
}

#[tokio::test]
async fn hits_are_served_in_full() {
    let dir = tempfile::tempdir().unwrap();

    for backend in backends(&dir) {
        let key = key("/served/");
        backend.store_item(&key, "<p>served</p>", TtlSecs(600), false).await;

        let entry = backend.get_item(&key).await;
        let mut out = Vec::new();
        let outcome = backend
            .print_cache(false, entry.as_ref(), &mut out)
            .await
            .unwrap();

        assert!(outcome.is_served());
        let body = String::from_utf8(out).unwrap();
        assert!(body.starts_with("<p>served</p>\n\n<!-- Cachify | http://cachify.de\n"));
    }
}
